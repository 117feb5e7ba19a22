//! Job source management.
//!
//! Sources are created by configuration/admin action, read by the
//! orchestrator each run, and soft-disabled rather than deleted. Removing a
//! source is the one destructive operation here: it cascades to the source's
//! jobs and run history.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::models::{AdapterFamily, JobSource};

pub fn source_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<JobSource> {
    let family_raw: String = row.get("family");
    let family = AdapterFamily::parse(&family_raw)
        .with_context(|| format!("unknown adapter family in database: {family_raw}"))?;

    let target_departments: Option<Vec<String>> = row
        .get::<Option<String>, _>("target_departments")
        .and_then(|raw| serde_json::from_str(&raw).ok());
    let selectors: Option<serde_json::Value> = row
        .get::<Option<String>, _>("selectors")
        .and_then(|raw| serde_json::from_str(&raw).ok());

    Ok(JobSource {
        id: row.get("id"),
        name: row.get("name"),
        url: row.get("url"),
        family,
        enabled: row.get::<i64, _>("enabled") != 0,
        target_departments,
        selectors,
    })
}

const SOURCE_COLUMNS: &str = "id, name, url, family, enabled, target_departments, selectors";

pub async fn get_source(pool: &SqlitePool, id: i64) -> Result<Option<JobSource>> {
    let row = sqlx::query(&format!(
        "SELECT {SOURCE_COLUMNS} FROM job_sources WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| source_from_row(&r)).transpose()
}

pub async fn enabled_sources(pool: &SqlitePool) -> Result<Vec<JobSource>> {
    let rows = sqlx::query(&format!(
        "SELECT {SOURCE_COLUMNS} FROM job_sources WHERE enabled = 1 ORDER BY id ASC"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(source_from_row).collect()
}

pub async fn all_sources(pool: &SqlitePool) -> Result<Vec<JobSource>> {
    let rows = sqlx::query(&format!(
        "SELECT {SOURCE_COLUMNS} FROM job_sources ORDER BY enabled DESC, id ASC"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(source_from_row).collect()
}

/// Insert or update a source by name. Name collisions update the existing
/// row, matching the admin flow where re-adding a source reconfigures it.
pub async fn upsert_source(
    pool: &SqlitePool,
    name: &str,
    url: &str,
    family: AdapterFamily,
    enabled: bool,
    target_departments: Option<&[String]>,
) -> Result<i64> {
    let now = Utc::now().timestamp();
    let departments_json = target_departments
        .filter(|d| !d.is_empty())
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO job_sources (name, url, family, enabled, target_departments, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            url = excluded.url,
            family = excluded.family,
            enabled = excluded.enabled,
            target_departments = excluded.target_departments,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(name)
    .bind(url)
    .bind(family.as_str())
    .bind(enabled as i64)
    .bind(departments_json)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM job_sources WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

/// Find a source by family and URL, creating an enabled one when absent.
/// Used by the capture path, which may see a board before any admin has
/// configured it.
pub async fn get_or_create_source(
    pool: &SqlitePool,
    family: AdapterFamily,
    name: &str,
    url: &str,
) -> Result<i64> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM job_sources WHERE family = ? AND url = ? LIMIT 1")
            .bind(family.as_str())
            .bind(url)
            .fetch_optional(pool)
            .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    upsert_source(pool, name, url, family, true, None).await
}

/// Delete a source. Cascades to its jobs, flags, and run history.
pub async fn remove_source(pool: &SqlitePool, id: i64) -> Result<()> {
    let affected = sqlx::query("DELETE FROM job_sources WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    if affected == 0 {
        bail!("no source with id {id}");
    }
    Ok(())
}

/// Print the configured sources, enabled first.
pub async fn list_sources(pool: &SqlitePool) -> Result<()> {
    let sources = all_sources(pool).await?;

    println!(
        "{:<6} {:<24} {:<12} {:<9} URL",
        "ID", "NAME", "FAMILY", "ENABLED"
    );
    for s in &sources {
        println!(
            "{:<6} {:<24} {:<12} {:<9} {}",
            s.id,
            s.name,
            s.family.as_str(),
            if s.enabled { "yes" } else { "no" },
            s.url
        );
    }
    if sources.is_empty() {
        println!("(no sources configured — add one with `jobscout sources add`)");
    }

    Ok(())
}
