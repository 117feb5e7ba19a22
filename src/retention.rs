//! Retention: move old jobs into the archive table.
//!
//! A job is eligible when its freshness timestamp is older than the cutoff.
//! Jobs with an application on file are never archived; that check is
//! repeated inside each job's transaction so an application recorded after
//! the candidate scan still blocks the move.

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArchiveSummary {
    pub eligible: u64,
    pub archived: u64,
    pub skipped: u64,
}

/// Archive jobs not refreshed within `days`. With `dry_run` the summary
/// reports what would happen without moving anything.
pub async fn archive_old_jobs(
    pool: &SqlitePool,
    days: u32,
    dry_run: bool,
) -> Result<ArchiveSummary> {
    let cutoff = (Utc::now() - Duration::days(i64::from(days))).timestamp();

    let candidates = sqlx::query(
        r#"
        SELECT j.id FROM jobs j
        WHERE COALESCE(j.last_updated, j.crawled_at) < ?
          AND NOT EXISTS (SELECT 1 FROM applications a WHERE a.job_id = j.id)
        ORDER BY j.id
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let eligible = candidates.len() as u64;
    if dry_run {
        return Ok(ArchiveSummary {
            eligible,
            archived: 0,
            skipped: 0,
        });
    }

    let mut archived = 0u64;
    let mut skipped = 0u64;
    for row in candidates {
        let job_id: i64 = row.get("id");
        if archive_one(pool, job_id).await? {
            archived += 1;
        } else {
            skipped += 1;
        }
    }

    info!(eligible, archived, skipped, "archival pass finished");
    Ok(ArchiveSummary {
        eligible,
        archived,
        skipped,
    })
}

/// Copy one job into `jobs_archived` and delete the original, atomically.
/// Returns false when the job gained an application (or vanished) between
/// the candidate scan and this transaction.
async fn archive_one(pool: &SqlitePool, job_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let has_application: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM applications WHERE job_id = ? LIMIT 1")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;
    if has_application.is_some() {
        tx.rollback().await?;
        warn!(job_id, "skipping archive: application recorded");
        return Ok(false);
    }

    let now = Utc::now().timestamp();
    let copied = sqlx::query(
        r#"
        INSERT INTO jobs_archived
            (original_job_id, archived_at, source_id, external_id, title,
             company, location, department, description, requirements,
             salary_min, salary_max, job_type, url, posting_date, is_active,
             provenance, crawled_at, last_updated)
        SELECT id, ?, source_id, external_id, title,
               company, location, department, description, requirements,
               salary_min, salary_max, job_type, url, posting_date, is_active,
               provenance, crawled_at, last_updated
        FROM jobs WHERE id = ?
        "#,
    )
    .bind(now)
    .bind(job_id)
    .execute(&mut *tx)
    .await?;
    if copied.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    // Flags go with the job; the archive copy keeps no per-user state.
    sqlx::query("DELETE FROM job_flags WHERE job_id = ?")
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// CLI entry point.
pub async fn run_archive(config: &Config, days: Option<u32>, dry_run: bool) -> Result<()> {
    let days = days.unwrap_or(config.retention.days);
    let pool = db::connect(config).await?;
    let summary = archive_old_jobs(&pool, days, dry_run).await?;

    if dry_run {
        println!(
            "dry run: {} job(s) older than {} day(s) would be archived",
            summary.eligible, days
        );
    } else {
        println!(
            "archived {} of {} eligible job(s) ({} skipped)",
            summary.archived, summary.eligible, summary.skipped
        );
    }

    pool.close().await;
    Ok(())
}
