use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Every statement is idempotent so `init`
/// can be re-run safely.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Crawlable origins
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            url TEXT NOT NULL,
            family TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            target_departments TEXT,
            selectors TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Canonical postings. Identity is (source_id, external_id) when the ATS
    // provides a stable id, the canonicalized URL scoped to the source
    // otherwise; both are enforced as uniqueness constraints below.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL REFERENCES job_sources(id) ON DELETE CASCADE,
            external_id TEXT,
            title TEXT NOT NULL,
            company TEXT NOT NULL,
            location TEXT,
            department TEXT,
            description TEXT,
            requirements TEXT,
            salary_min INTEGER,
            salary_max INTEGER,
            job_type TEXT NOT NULL DEFAULT 'unknown',
            url TEXT NOT NULL,
            posting_date INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            provenance TEXT NOT NULL DEFAULT 'crawler',
            crawled_at INTEGER NOT NULL,
            last_updated INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_jobs_source_url ON jobs(source_id, url)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_jobs_source_external
        ON jobs(source_id, external_id)
        WHERE external_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    // Per-user annotations; at most one per (user, job)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_flags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            reason TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(user_id, job_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per crawl attempt against one source
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crawler_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL REFERENCES job_sources(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            jobs_found INTEGER NOT NULL DEFAULT 0,
            jobs_new INTEGER NOT NULL DEFAULT 0,
            jobs_updated INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            started_at INTEGER NOT NULL,
            completed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Owned by the application-tracking collaborator; the archiver only
    // reads this relationship. RESTRICT keeps a job alive while an
    // application references it.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS applications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE RESTRICT,
            status TEXT NOT NULL DEFAULT 'draft',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Retention store: a copy of the job plus its original id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs_archived (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            original_job_id INTEGER NOT NULL UNIQUE,
            archived_at INTEGER NOT NULL,
            source_id INTEGER,
            external_id TEXT,
            title TEXT NOT NULL,
            company TEXT NOT NULL,
            location TEXT,
            department TEXT,
            description TEXT,
            requirements TEXT,
            salary_min INTEGER,
            salary_max INTEGER,
            job_type TEXT NOT NULL,
            url TEXT NOT NULL,
            posting_date INTEGER,
            is_active INTEGER NOT NULL,
            provenance TEXT NOT NULL,
            crawled_at INTEGER NOT NULL,
            last_updated INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_source_id ON jobs(source_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_is_active ON jobs(is_active)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_crawled_at ON jobs(crawled_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_crawler_runs_started_at ON crawler_runs(started_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_applications_job_id ON applications(job_id)")
        .execute(pool)
        .await?;

    Ok(())
}
