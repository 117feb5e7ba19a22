//! Job listing and per-user flags.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::FlagKind;

/// Filters for the job listing surfaces (CLI and HTTP share these).
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub source_id: Option<i64>,
    pub active_only: bool,
    pub search: Option<String>,
    pub flagged: Option<bool>,
    pub limit: Option<i64>,
}

/// A listed job with its flag tags joined in.
#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    pub id: i64,
    pub source_id: i64,
    pub source_name: String,
    pub title: String,
    pub company: String,
    pub url: String,
    pub location: Option<String>,
    pub department: Option<String>,
    pub job_type: String,
    pub provenance: String,
    pub is_active: bool,
    pub posting_date: Option<i64>,
    pub crawled_at: i64,
    pub flags: Vec<String>,
    pub applications: i64,
}

/// List jobs for a user, newest first, with that user's flags attached.
pub async fn list_jobs(
    pool: &SqlitePool,
    user_id: &str,
    filter: &JobFilter,
) -> Result<Vec<JobListing>> {
    let mut sql = String::from(
        r#"
        SELECT j.id, j.source_id, s.name AS source_name, j.title, j.company,
               j.url, j.location, j.department, j.job_type, j.provenance,
               j.is_active, j.posting_date, j.crawled_at,
               (SELECT COUNT(*) FROM applications a WHERE a.job_id = j.id) AS applications
        FROM jobs j
        JOIN job_sources s ON s.id = j.source_id
        WHERE 1 = 1
        "#,
    );
    if filter.source_id.is_some() {
        sql.push_str(" AND j.source_id = ?");
    }
    if filter.active_only {
        sql.push_str(" AND j.is_active = 1");
    }
    if filter.search.is_some() {
        sql.push_str(" AND (j.title LIKE ? OR j.company LIKE ? OR j.location LIKE ?)");
    }
    match filter.flagged {
        Some(true) => sql.push_str(
            " AND EXISTS (SELECT 1 FROM job_flags f WHERE f.job_id = j.id AND f.user_id = ?)",
        ),
        Some(false) => sql.push_str(
            " AND NOT EXISTS (SELECT 1 FROM job_flags f WHERE f.job_id = j.id AND f.user_id = ?)",
        ),
        None => {}
    }
    sql.push_str(" ORDER BY COALESCE(j.posting_date, j.crawled_at) DESC, j.id DESC");
    sql.push_str(" LIMIT ?");

    let mut query = sqlx::query(&sql);
    if let Some(source_id) = filter.source_id {
        query = query.bind(source_id);
    }
    if let Some(search) = &filter.search {
        let like = format!("%{search}%");
        query = query.bind(like.clone()).bind(like.clone()).bind(like);
    }
    if filter.flagged.is_some() {
        query = query.bind(user_id);
    }
    query = query.bind(filter.limit.unwrap_or(100));

    let rows = query.fetch_all(pool).await?;
    let mut listings = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get("id");
        listings.push(JobListing {
            id,
            source_id: row.get("source_id"),
            source_name: row.get("source_name"),
            title: row.get("title"),
            company: row.get("company"),
            url: row.get("url"),
            location: row.get("location"),
            department: row.get("department"),
            job_type: row.get("job_type"),
            provenance: row.get("provenance"),
            is_active: row.get::<i64, _>("is_active") != 0,
            posting_date: row.get("posting_date"),
            crawled_at: row.get("crawled_at"),
            flags: job_flags(pool, user_id, id).await?,
            applications: row.get("applications"),
        });
    }
    Ok(listings)
}

async fn job_flags(pool: &SqlitePool, user_id: &str, job_id: i64) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT kind FROM job_flags WHERE user_id = ? AND job_id = ?")
        .bind(user_id)
        .bind(job_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|r| r.get("kind")).collect())
}

/// Set a user's flag on a job, with an optional free-text reason.
/// Re-flagging replaces the previous kind and reason.
pub async fn flag_job(
    pool: &SqlitePool,
    user_id: &str,
    job_id: i64,
    kind: FlagKind,
    reason: Option<&str>,
) -> Result<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        bail!("no job with id {job_id}");
    }

    let now = Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO job_flags (user_id, job_id, kind, reason, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, job_id) DO UPDATE SET
            kind = excluded.kind,
            reason = excluded.reason,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(job_id)
    .bind(kind.as_str())
    .bind(reason)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove a user's flag. Returns whether a flag existed.
pub async fn unflag_job(pool: &SqlitePool, user_id: &str, job_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM job_flags WHERE user_id = ? AND job_id = ?")
        .bind(user_id)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Shorten a title to at most `max` characters, ellipsized. Counts chars,
/// not bytes, so multi-byte titles never split mid-character.
fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push('…');
    out
}

fn format_day(ts: Option<i64>) -> String {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// CLI entry point: print the job listing table.
pub async fn run_list(config: &Config, user_id: &str, filter: &JobFilter) -> Result<()> {
    let pool = db::connect(config).await?;
    let jobs = list_jobs(&pool, user_id, filter).await?;

    println!(
        "{:<6} {:<40} {:<20} {:<18} {:<10}  FLAGS",
        "ID", "TITLE", "COMPANY", "LOCATION", "POSTED"
    );
    for job in &jobs {
        let title = shorten(&job.title, 38);
        let active = if job.is_active { "" } else { " [inactive]" };
        println!(
            "{:<6} {:<40} {:<20} {:<18} {:<10}  {}{}",
            job.id,
            title,
            job.company,
            job.location.as_deref().unwrap_or("-"),
            format_day(job.posting_date),
            job.flags.join(","),
            active
        );
    }
    println!("{} job(s)", jobs.len());

    pool.close().await;
    Ok(())
}

pub async fn run_flag(
    config: &Config,
    user_id: &str,
    job_id: i64,
    kind: FlagKind,
    reason: Option<&str>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    flag_job(&pool, user_id, job_id, kind, reason).await?;
    println!("flagged job {job_id} as {}", kind.as_str());
    pool.close().await;
    Ok(())
}

pub async fn run_unflag(config: &Config, user_id: &str, job_id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    if unflag_job(&pool, user_id, job_id).await? {
        println!("removed flag from job {job_id}");
    } else {
        println!("job {job_id} had no flag for this user");
    }
    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::shorten;

    #[test]
    fn shorten_counts_chars_not_bytes() {
        let title = format!("{}é Engineer", "A".repeat(36));
        let short = shorten(&title, 38);
        assert_eq!(short.chars().count(), 38);
        assert!(short.ends_with('…'));
        assert!(short.contains('é'));

        assert_eq!(shorten("Backend Engineer", 38), "Backend Engineer");
    }
}
