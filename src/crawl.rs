//! Crawl orchestration.
//!
//! For each source in scope the orchestrator opens a crawler run, invokes
//! the family's adapter under a timeout, feeds extracted postings through
//! the ingestion engine, and closes the run exactly once — completed with
//! counts, or failed with an error message and whatever partial counts were
//! accumulated. One source's failure never aborts a sibling's crawl; that
//! isolation is the central property here. A cancelled or timed-out fetch
//! still closes its run as failed rather than leaving it `started` forever.

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use regex::Regex;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::adapters::AdapterRegistry;
use crate::canonical::canonicalize_url;
use crate::config::{Config, CrawlerConfig};
use crate::db;
use crate::error::IngestError;
use crate::ingest::{upsert_job, IngestOutcome};
use crate::models::{JobPosting, JobSource, Provenance, RunStatus};
use crate::sources;

/// Which sources a crawl invocation covers.
#[derive(Debug, Clone, Copy)]
pub enum CrawlScope {
    AllEnabled,
    Source(i64),
}

/// Per-source result of a crawl, mirrored into `crawler_runs`.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    pub source_id: i64,
    pub source_name: String,
    pub status: RunStatus,
    pub found: i64,
    pub new: i64,
    pub updated: i64,
    pub error: Option<String>,
}

/// CLI entry point: connect, crawl, print a summary table.
pub async fn run_crawl(
    config: &Config,
    source_id: Option<i64>,
    max_age_days: Option<u32>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let registry = AdapterRegistry::with_builtins(&config.crawler)?;

    let scope = match source_id {
        Some(id) => CrawlScope::Source(id),
        None => CrawlScope::AllEnabled,
    };
    let max_age_days = max_age_days.or(config.crawler.max_age_days);

    let outcomes = crawl(&pool, &registry, &config.crawler, scope, max_age_days).await?;

    println!(
        "{:<6} {:<24} {:<10} {:>6} {:>5} {:>8}  ERROR",
        "ID", "SOURCE", "STATUS", "FOUND", "NEW", "UPDATED"
    );
    for o in &outcomes {
        println!(
            "{:<6} {:<24} {:<10} {:>6} {:>5} {:>8}  {}",
            o.source_id,
            o.source_name,
            o.status.as_str(),
            o.found,
            o.new,
            o.updated,
            o.error.as_deref().unwrap_or("-")
        );
    }
    println!("crawled {} source(s)", outcomes.len());

    pool.close().await;
    Ok(())
}

/// Crawl every source in scope, each under its own run record.
pub async fn crawl(
    pool: &SqlitePool,
    registry: &AdapterRegistry,
    config: &CrawlerConfig,
    scope: CrawlScope,
    max_age_days: Option<u32>,
) -> Result<Vec<CrawlOutcome>> {
    let targets = match scope {
        CrawlScope::AllEnabled => sources::enabled_sources(pool).await?,
        CrawlScope::Source(id) => match sources::get_source(pool, id).await? {
            Some(source) => vec![source],
            None => bail!("no source with id {id}"),
        },
    };

    let mut outcomes = Vec::with_capacity(targets.len());
    for source in targets {
        outcomes.push(crawl_source(pool, registry, config, &source, max_age_days).await?);
    }
    Ok(outcomes)
}

/// Counts accumulated over one run. On failure whatever was ingested before
/// the error is still recorded on the run row.
#[derive(Debug, Default, Clone, Copy)]
struct RunCounts {
    found: i64,
    new: i64,
    updated: i64,
}

/// Crawl one source. Only run-bookkeeping failures escape as `Err`; adapter
/// and ingestion failures are captured in the returned outcome.
async fn crawl_source(
    pool: &SqlitePool,
    registry: &AdapterRegistry,
    config: &CrawlerConfig,
    source: &JobSource,
    max_age_days: Option<u32>,
) -> Result<CrawlOutcome> {
    let run_id = open_run(pool, source.id)
        .await
        .context("failed to open crawler run")?;

    info!(source_id = source.id, source = %source.name, "crawl started");

    let mut counts = RunCounts::default();
    match crawl_postings(pool, registry, config, source, max_age_days, &mut counts).await {
        Ok(()) => {
            close_run(pool, run_id, RunStatus::Completed, counts, None).await?;
            info!(
                source_id = source.id,
                found = counts.found,
                new = counts.new,
                updated = counts.updated,
                "crawl completed"
            );
            Ok(CrawlOutcome {
                source_id: source.id,
                source_name: source.name.clone(),
                status: RunStatus::Completed,
                found: counts.found,
                new: counts.new,
                updated: counts.updated,
                error: None,
            })
        }
        Err(err) => {
            let message = err.to_string();
            warn!(source_id = source.id, error = %message, "crawl failed");
            close_run(pool, run_id, RunStatus::Failed, counts, Some(&message)).await?;
            Ok(CrawlOutcome {
                source_id: source.id,
                source_name: source.name.clone(),
                status: RunStatus::Failed,
                found: counts.found,
                new: counts.new,
                updated: counts.updated,
                error: Some(message),
            })
        }
    }
}

async fn crawl_postings(
    pool: &SqlitePool,
    registry: &AdapterRegistry,
    config: &CrawlerConfig,
    source: &JobSource,
    max_age_days: Option<u32>,
    counts: &mut RunCounts,
) -> Result<(), IngestError> {
    let adapter = registry.find(source.family).ok_or_else(|| {
        IngestError::Extraction(format!(
            "no adapter registered for family {}",
            source.family
        ))
    })?;

    // The timeout is the cancellation point: a hung fetch fails this source
    // without stalling its siblings.
    let fetch = tokio::time::timeout(
        std::time::Duration::from_secs(config.timeout_secs),
        adapter.fetch(source),
    );
    let mut postings = match fetch.await {
        Ok(result) => result?,
        Err(_) => {
            return Err(IngestError::SourceUnreachable(format!(
                "fetch timed out after {}s",
                config.timeout_secs
            )))
        }
    };

    // Age filter: drop stale postings before ingestion. Postings without a
    // date are kept — we cannot safely filter them by age.
    if let Some(days) = max_age_days {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        postings.retain(|p| p.posting_date.map(|d| d >= cutoff).unwrap_or(true));
    }

    if let Some(departments) = source.target_departments.as_deref() {
        postings = filter_by_departments(postings, departments);
        info!(
            source_id = source.id,
            kept = postings.len(),
            "department filter applied"
        );
    }

    counts.found = postings.len() as i64;
    let mut seen_urls: Vec<String> = Vec::new();

    for mut posting in postings {
        // The source's configured name is authoritative for company.
        posting.company = Some(source.name.clone());

        match upsert_job(pool, source.id, &posting, Provenance::Crawler).await {
            Ok(outcome) => {
                if let Some(url) = posting.url.as_deref() {
                    seen_urls.push(canonicalize_url(url));
                }
                match outcome {
                    IngestOutcome::Created => counts.new += 1,
                    IngestOutcome::Updated => counts.updated += 1,
                    IngestOutcome::Unchanged => {}
                }
            }
            Err(IngestError::MissingField {
                source_id,
                field,
                raw_id,
            }) => {
                warn!(source_id, field, raw_id = %raw_id, "dropped malformed posting");
            }
            Err(err) => {
                warn!(source_id = source.id, error = %err, "failed to store posting");
            }
        }
    }

    deactivate_unseen(pool, source.id, &seen_urls).await?;

    Ok(())
}

/// Mark crawler-provenance jobs from this source that were not seen in this
/// crawl as inactive: closed or expired roles stop showing in the active
/// list while their history stays available. Capture-path jobs are exempt —
/// boards don't always list what a user captured from a detail page.
async fn deactivate_unseen(
    pool: &SqlitePool,
    source_id: i64,
    seen_urls: &[String],
) -> Result<(), IngestError> {
    let rows = sqlx::query(
        "SELECT id, url FROM jobs WHERE source_id = ? AND is_active = 1 AND provenance = 'crawler'",
    )
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    let now = Utc::now().timestamp();
    for row in rows {
        let url: String = row.get("url");
        if seen_urls.iter().any(|seen| seen == &url) {
            continue;
        }
        let id: i64 = row.get("id");
        sqlx::query("UPDATE jobs SET is_active = 0, last_updated = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Keep postings whose title or description matches one of the source's
/// target departments (word-boundary, case-insensitive); engineering
/// targets additionally match the common specialization titles. Matching
/// postings get the first target recorded as their department.
fn filter_by_departments(postings: Vec<JobPosting>, departments: &[String]) -> Vec<JobPosting> {
    if departments.is_empty() {
        return postings;
    }

    let mut patterns: Vec<Regex> = Vec::new();
    for dept in departments {
        let escaped = regex::escape(&dept.to_lowercase()).replace(r"\ ", r"\s+");
        if let Ok(re) = Regex::new(&format!(r"(?i)\b{escaped}\b")) {
            patterns.push(re);
        }
        if dept.to_lowercase().contains("engineering") {
            if let Ok(re) = Regex::new(
                r"(?i)\b(software|backend|frontend|full.?stack|devops|infrastructure|sre)\s+engineer",
            ) {
                patterns.push(re);
            }
        }
    }

    let primary = departments[0].clone();
    postings
        .into_iter()
        .filter_map(|mut p| {
            let title = p.title.as_deref().unwrap_or_default();
            let description = p.description.as_deref().unwrap_or_default();
            let matches = patterns
                .iter()
                .any(|re| re.is_match(title) || re.is_match(description));
            matches.then(|| {
                p.department = Some(primary.clone());
                p
            })
        })
        .collect()
}

async fn open_run(pool: &SqlitePool, source_id: i64) -> Result<i64> {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        "INSERT INTO crawler_runs (source_id, status, started_at) VALUES (?, 'started', ?)",
    )
    .bind(source_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Terminal update of a run, called exactly once per run.
async fn close_run(
    pool: &SqlitePool,
    run_id: i64,
    status: RunStatus,
    counts: RunCounts,
    error: Option<&str>,
) -> Result<()> {
    let now = Utc::now().timestamp();
    sqlx::query(
        r#"
        UPDATE crawler_runs
        SET status = ?, jobs_found = ?, jobs_new = ?, jobs_updated = ?,
            error = ?, completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(counts.found)
    .bind(counts.new)
    .bind(counts.updated)
    .bind(error)
    .bind(now)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// A recent crawler run, for the history/status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct RunRow {
    pub id: i64,
    pub source_id: i64,
    pub source_name: String,
    pub status: String,
    pub jobs_found: i64,
    pub jobs_new: i64,
    pub jobs_updated: i64,
    pub error: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

pub async fn recent_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<RunRow>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.source_id, s.name AS source_name, r.status,
               r.jobs_found, r.jobs_new, r.jobs_updated, r.error,
               r.started_at, r.completed_at
        FROM crawler_runs r
        JOIN job_sources s ON s.id = r.source_id
        ORDER BY r.started_at DESC, r.id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| RunRow {
            id: r.get("id"),
            source_id: r.get("source_id"),
            source_name: r.get("source_name"),
            status: r.get("status"),
            jobs_found: r.get("jobs_found"),
            jobs_new: r.get("jobs_new"),
            jobs_updated: r.get("jobs_updated"),
            error: r.get("error"),
            started_at: r.get("started_at"),
            completed_at: r.get("completed_at"),
        })
        .collect())
}

/// CLI entry point: print recent run history.
pub async fn run_history(config: &Config, limit: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let runs = recent_runs(&pool, limit).await?;

    println!(
        "{:<6} {:<24} {:<10} {:>6} {:>5} {:>8}  STARTED",
        "RUN", "SOURCE", "STATUS", "FOUND", "NEW", "UPDATED"
    );
    for r in &runs {
        let started = chrono::DateTime::from_timestamp(r.started_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| r.started_at.to_string());
        println!(
            "{:<6} {:<24} {:<10} {:>6} {:>5} {:>8}  {}",
            r.id, r.source_name, r.status, r.jobs_found, r.jobs_new, r.jobs_updated, started
        );
        if let Some(err) = &r.error {
            println!("       error: {err}");
        }
    }
    if runs.is_empty() {
        println!("(no crawler runs recorded)");
    }

    pool.close().await;
    Ok(())
}
