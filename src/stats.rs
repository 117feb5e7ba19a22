//! Aggregate counts over the job store.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub source_id: i64,
    pub source_name: String,
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub sources: i64,
    pub jobs: i64,
    pub active_jobs: i64,
    pub archived_jobs: i64,
    pub flags: i64,
    pub runs: i64,
    pub per_source: Vec<SourceStats>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<Stats> {
    let sources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_sources")
        .fetch_one(pool)
        .await?;
    let jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(pool)
        .await?;
    let active_jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE is_active = 1")
        .fetch_one(pool)
        .await?;
    let archived_jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs_archived")
        .fetch_one(pool)
        .await?;
    let flags: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_flags")
        .fetch_one(pool)
        .await?;
    let runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crawler_runs")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name,
               COUNT(j.id) AS total,
               COALESCE(SUM(j.is_active), 0) AS active
        FROM job_sources s
        LEFT JOIN jobs j ON j.source_id = s.id
        GROUP BY s.id, s.name
        ORDER BY s.name
        "#,
    )
    .fetch_all(pool)
    .await?;
    let per_source = rows
        .iter()
        .map(|r| SourceStats {
            source_id: r.get("id"),
            source_name: r.get("name"),
            total: r.get("total"),
            active: r.get("active"),
        })
        .collect();

    Ok(Stats {
        sources,
        jobs,
        active_jobs,
        archived_jobs,
        flags,
        runs,
        per_source,
    })
}

/// CLI entry point.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;

    println!("sources:       {}", stats.sources);
    println!("jobs:          {} ({} active)", stats.jobs, stats.active_jobs);
    println!("archived:      {}", stats.archived_jobs);
    println!("flags:         {}", stats.flags);
    println!("crawler runs:  {}", stats.runs);
    if !stats.per_source.is_empty() {
        println!();
        println!("{:<6} {:<24} {:>6} {:>7}", "ID", "SOURCE", "JOBS", "ACTIVE");
        for s in &stats.per_source {
            println!(
                "{:<6} {:<24} {:>6} {:>7}",
                s.source_id, s.source_name, s.total, s.active
            );
        }
    }

    pool.close().await;
    Ok(())
}
