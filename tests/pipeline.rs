//! End-to-end pipeline tests against a temporary SQLite database.
//!
//! Stub adapters stand in for the network so the dedup, run accounting,
//! failure isolation, and retention behavior can be exercised directly.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

use jobscout::adapters::{AdapterRegistry, SourceAdapter};
use jobscout::capture::{capture_job, CaptureRequest};
use jobscout::config::CrawlerConfig;
use jobscout::crawl::{crawl, CrawlScope};
use jobscout::db;
use jobscout::error::IngestError;
use jobscout::ingest::{upsert_job, IngestOutcome};
use jobscout::jobs::flag_job;
use jobscout::migrate;
use jobscout::models::{AdapterFamily, FlagKind, JobPosting, JobSource, Provenance, RunStatus};
use jobscout::retention::archive_old_jobs;
use jobscout::sources::upsert_source;

async fn setup_pool() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("jobscout.sqlite"))
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    (tmp, pool)
}

async fn add_source(pool: &SqlitePool, name: &str, family: AdapterFamily) -> i64 {
    upsert_source(
        pool,
        name,
        &format!("https://example.com/{name}"),
        family,
        true,
        None,
    )
    .await
    .unwrap()
}

fn posting(external_id: Option<&str>, title: &str, url: &str) -> JobPosting {
    JobPosting {
        external_id: external_id.map(str::to_string),
        title: Some(title.to_string()),
        company: Some("Acme".to_string()),
        url: Some(url.to_string()),
        ..Default::default()
    }
}

async fn job_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(pool)
        .await
        .unwrap()
}

// ============ Ingestion ============

#[tokio::test]
async fn upsert_is_idempotent() {
    let (_tmp, pool) = setup_pool().await;
    let source_id = add_source(&pool, "acme", AdapterFamily::Ashby).await;

    let p = posting(Some("42"), "Backend Engineer", "https://example.com/jobs/42");
    let first = upsert_job(&pool, source_id, &p, Provenance::Crawler)
        .await
        .unwrap();
    assert_eq!(first, IngestOutcome::Created);

    let second = upsert_job(&pool, source_id, &p, Provenance::Crawler)
        .await
        .unwrap();
    assert_eq!(second, IngestOutcome::Unchanged);

    assert_eq!(job_count(&pool).await, 1);
}

#[tokio::test]
async fn changed_posting_updates_in_place() {
    let (_tmp, pool) = setup_pool().await;
    let source_id = add_source(&pool, "acme", AdapterFamily::Ashby).await;

    let p = posting(Some("42"), "Backend Engineer", "https://example.com/jobs/42");
    upsert_job(&pool, source_id, &p, Provenance::Crawler)
        .await
        .unwrap();

    let mut changed = p.clone();
    changed.title = Some("Senior Backend Engineer".to_string());
    let outcome = upsert_job(&pool, source_id, &changed, Provenance::Crawler)
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Updated);
    assert_eq!(job_count(&pool).await, 1);

    let title: String = sqlx::query_scalar("SELECT title FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title, "Senior Backend Engineer");
}

#[tokio::test]
async fn missing_title_is_rejected() {
    let (_tmp, pool) = setup_pool().await;
    let source_id = add_source(&pool, "acme", AdapterFamily::Ashby).await;

    let p = posting(Some("42"), "  ", "https://example.com/jobs/42");
    let err = upsert_job(&pool, source_id, &p, Provenance::Crawler)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::MissingField { field: "title", .. }));
    assert_eq!(job_count(&pool).await, 0);
}

#[tokio::test]
async fn same_job_different_url_forms_converges() {
    let (_tmp, pool) = setup_pool().await;
    let source_id = add_source(&pool, "acme", AdapterFamily::Ashby).await;

    let p1 = posting(None, "Engineer", "https://example.com/jobs/42?utm=x");
    let p2 = posting(None, "Engineer", "https://example.com/jobs/42/application");
    upsert_job(&pool, source_id, &p1, Provenance::Crawler)
        .await
        .unwrap();
    upsert_job(&pool, source_id, &p2, Provenance::Crawler)
        .await
        .unwrap();

    assert_eq!(job_count(&pool).await, 1);
    let url: String = sqlx::query_scalar("SELECT url FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(url, "https://example.com/jobs/42");
}

// ============ Capture path and provenance ============

#[tokio::test]
async fn capture_then_crawl_converges_and_keeps_provenance() {
    let (_tmp, pool) = setup_pool().await;

    // Capture creates the source and the job with extension provenance.
    let request = CaptureRequest {
        url: "https://jobs.ashbyhq.com/acme/0f0e9f6a-1111-2222-3333-444455556666/application"
            .to_string(),
        source: Some("ashby".to_string()),
        title: Some("Platform Engineer".to_string()),
        company: Some("Acme".to_string()),
        location: None,
        description: None,
        external_id: None,
    };
    let result = capture_job(&pool, &request).await.unwrap();
    assert_eq!(result.outcome, "created");
    assert_eq!(
        result.job_url,
        "https://jobs.ashbyhq.com/acme/0f0e9f6a-1111-2222-3333-444455556666"
    );

    // A later crawler sighting of the same URL (now with external id) must
    // update that row, backfill the id, and leave provenance alone.
    let p = posting(
        Some("0f0e9f6a-1111-2222-3333-444455556666"),
        "Platform Engineer (Remote)",
        "https://jobs.ashbyhq.com/acme/0f0e9f6a-1111-2222-3333-444455556666",
    );
    let outcome = upsert_job(&pool, result.source_id, &p, Provenance::Crawler)
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Updated);

    let row = sqlx::query("SELECT external_id, provenance, title FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(
        row.get::<Option<String>, _>("external_id").as_deref(),
        Some("0f0e9f6a-1111-2222-3333-444455556666")
    );
    assert_eq!(row.get::<String, _>("provenance"), "extension");
    assert_eq!(row.get::<String, _>("title"), "Platform Engineer (Remote)");
    assert_eq!(job_count(&pool).await, 1);
}

#[tokio::test]
async fn capture_without_title_uses_placeholders() {
    let (_tmp, pool) = setup_pool().await;

    let request = CaptureRequest {
        url: "https://careers.example.com/roles/77".to_string(),
        source: None,
        title: None,
        company: None,
        location: None,
        description: None,
        external_id: None,
    };
    capture_job(&pool, &request).await.unwrap();

    let row = sqlx::query("SELECT title, company FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("title"), "Unknown Role");
    assert_eq!(row.get::<String, _>("company"), "Unknown Company");
}

// ============ Crawl orchestration ============

struct StubAdapter {
    family: AdapterFamily,
    postings: Vec<JobPosting>,
    fail: bool,
}

#[async_trait]
impl SourceAdapter for StubAdapter {
    fn family(&self) -> AdapterFamily {
        self.family
    }

    fn description(&self) -> &str {
        "stub"
    }

    async fn fetch(&self, _source: &JobSource) -> Result<Vec<JobPosting>, IngestError> {
        if self.fail {
            return Err(IngestError::SourceUnreachable("board is down".to_string()));
        }
        Ok(self.postings.clone())
    }
}

fn stub_registry(family: AdapterFamily, postings: Vec<JobPosting>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(Box::new(StubAdapter {
        family,
        postings,
        fail: false,
    }));
    registry
}

#[tokio::test]
async fn crawl_counts_new_and_updated() {
    let (_tmp, pool) = setup_pool().await;
    add_source(&pool, "acme", AdapterFamily::Ashby).await;
    let config = CrawlerConfig::default();

    let first_batch = vec![
        posting(Some("101"), "Engineer", "https://example.com/jobs/101"),
        posting(Some("102"), "Designer", "https://example.com/jobs/102"),
    ];
    let registry = stub_registry(AdapterFamily::Ashby, first_batch);
    let outcomes = crawl(&pool, &registry, &config, CrawlScope::AllEnabled, None)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, RunStatus::Completed);
    assert_eq!(outcomes[0].found, 2);
    assert_eq!(outcomes[0].new, 2);
    assert_eq!(outcomes[0].updated, 0);

    // Second crawl: same two jobs, one retitled.
    let second_batch = vec![
        posting(Some("101"), "Staff Engineer", "https://example.com/jobs/101"),
        posting(Some("102"), "Designer", "https://example.com/jobs/102"),
    ];
    let registry = stub_registry(AdapterFamily::Ashby, second_batch);
    let outcomes = crawl(&pool, &registry, &config, CrawlScope::AllEnabled, None)
        .await
        .unwrap();
    assert_eq!(outcomes[0].found, 2);
    assert_eq!(outcomes[0].new, 0);
    assert_eq!(outcomes[0].updated, 1);
    assert_eq!(job_count(&pool).await, 2);
}

#[tokio::test]
async fn one_failing_source_does_not_abort_the_others() {
    let (_tmp, pool) = setup_pool().await;
    add_source(&pool, "alpha", AdapterFamily::Ashby).await;
    add_source(&pool, "bravo", AdapterFamily::Greenhouse).await;
    add_source(&pool, "charlie", AdapterFamily::Lever).await;
    let config = CrawlerConfig::default();

    let mut registry = AdapterRegistry::new();
    registry.register(Box::new(StubAdapter {
        family: AdapterFamily::Ashby,
        postings: vec![posting(Some("1"), "A", "https://example.com/a/1")],
        fail: false,
    }));
    registry.register(Box::new(StubAdapter {
        family: AdapterFamily::Greenhouse,
        postings: vec![],
        fail: true,
    }));
    registry.register(Box::new(StubAdapter {
        family: AdapterFamily::Lever,
        postings: vec![posting(Some("2"), "C", "https://example.com/c/2")],
        fail: false,
    }));

    let outcomes = crawl(&pool, &registry, &config, CrawlScope::AllEnabled, None)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    let completed = outcomes
        .iter()
        .filter(|o| o.status == RunStatus::Completed)
        .count();
    assert_eq!(completed, 2);
    let failed: Vec<_> = outcomes
        .iter()
        .filter(|o| o.status == RunStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source_name, "bravo");
    assert!(failed[0].error.as_deref().unwrap().contains("board is down"));

    // Every run is closed; none is left in `started`.
    let open: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM crawler_runs WHERE status = 'started'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(open, 0);
    let errors: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM crawler_runs WHERE status = 'failed' AND error IS NOT NULL",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(errors, 1);
}

struct SlowAdapter {
    family: AdapterFamily,
}

#[async_trait]
impl SourceAdapter for SlowAdapter {
    fn family(&self) -> AdapterFamily {
        self.family
    }

    fn description(&self) -> &str {
        "slow stub"
    }

    async fn fetch(&self, _source: &JobSource) -> Result<Vec<JobPosting>, IngestError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(vec![])
    }
}

#[tokio::test]
async fn timed_out_fetch_closes_its_run_as_failed() {
    let (_tmp, pool) = setup_pool().await;
    add_source(&pool, "acme", AdapterFamily::Ashby).await;
    let config = CrawlerConfig {
        timeout_secs: 1,
        ..CrawlerConfig::default()
    };

    let mut registry = AdapterRegistry::new();
    registry.register(Box::new(SlowAdapter {
        family: AdapterFamily::Ashby,
    }));

    let outcomes = crawl(&pool, &registry, &config, CrawlScope::AllEnabled, None)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, RunStatus::Failed);
    assert!(outcomes[0].error.as_deref().unwrap().contains("timed out"));

    // The run record reached a terminal state, never stuck in `started`.
    let row = sqlx::query("SELECT status, error, completed_at FROM crawler_runs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("status"), "failed");
    assert!(row.get::<Option<String>, _>("error").is_some());
    assert!(row.get::<Option<i64>, _>("completed_at").is_some());
}

#[tokio::test]
async fn failed_run_keeps_partial_counts() {
    let (_tmp, pool) = setup_pool().await;
    add_source(&pool, "acme", AdapterFamily::Ashby).await;
    let config = CrawlerConfig::default();

    let registry = stub_registry(
        AdapterFamily::Ashby,
        vec![
            posting(Some("1"), "First", "https://example.com/jobs/1"),
            posting(Some("2"), "Second", "https://example.com/jobs/2"),
        ],
    );
    crawl(&pool, &registry, &config, CrawlScope::AllEnabled, None)
        .await
        .unwrap();

    // Make the post-ingestion deactivation step error out, so the next run
    // fails after its upserts have already landed.
    sqlx::query(
        r#"
        CREATE TRIGGER freeze_active BEFORE UPDATE OF is_active ON jobs
        WHEN NEW.is_active = 0
        BEGIN SELECT RAISE(ABORT, 'deactivation blocked'); END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let registry = stub_registry(
        AdapterFamily::Ashby,
        vec![
            posting(Some("3"), "Third", "https://example.com/jobs/3"),
            posting(Some("4"), "Fourth", "https://example.com/jobs/4"),
        ],
    );
    let outcomes = crawl(&pool, &registry, &config, CrawlScope::AllEnabled, None)
        .await
        .unwrap();
    assert_eq!(outcomes[0].status, RunStatus::Failed);
    assert_eq!(outcomes[0].found, 2);
    assert_eq!(outcomes[0].new, 2);

    let row = sqlx::query(
        "SELECT jobs_found, jobs_new FROM crawler_runs WHERE status = 'failed'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.get::<i64, _>("jobs_found"), 2);
    assert_eq!(row.get::<i64, _>("jobs_new"), 2);
}

#[tokio::test]
async fn unseen_crawler_jobs_are_deactivated() {
    let (_tmp, pool) = setup_pool().await;
    add_source(&pool, "acme", AdapterFamily::Ashby).await;
    let config = CrawlerConfig::default();

    let registry = stub_registry(
        AdapterFamily::Ashby,
        vec![
            posting(Some("1"), "Keeps", "https://example.com/jobs/1"),
            posting(Some("2"), "Goes away", "https://example.com/jobs/2"),
        ],
    );
    crawl(&pool, &registry, &config, CrawlScope::AllEnabled, None)
        .await
        .unwrap();

    let registry = stub_registry(
        AdapterFamily::Ashby,
        vec![posting(Some("1"), "Keeps", "https://example.com/jobs/1")],
    );
    crawl(&pool, &registry, &config, CrawlScope::AllEnabled, None)
        .await
        .unwrap();

    let active: Vec<String> =
        sqlx::query_scalar("SELECT title FROM jobs WHERE is_active = 1 ORDER BY title")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(active, vec!["Keeps".to_string()]);
    // The delisted job is deactivated, not deleted.
    assert_eq!(job_count(&pool).await, 2);
}

#[tokio::test]
async fn crawl_of_unknown_source_id_errors() {
    let (_tmp, pool) = setup_pool().await;
    let config = CrawlerConfig::default();
    let registry = AdapterRegistry::new();

    let err = crawl(&pool, &registry, &config, CrawlScope::Source(999), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no source with id 999"));
}

// ============ Retention ============

async fn backdate_job(pool: &SqlitePool, job_id: i64, days: i64) {
    let old = (Utc::now() - chrono::Duration::days(days)).timestamp();
    sqlx::query("UPDATE jobs SET crawled_at = ?, last_updated = ? WHERE id = ?")
        .bind(old)
        .bind(old)
        .bind(job_id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn old_jobs_are_archived_with_their_identity() {
    let (_tmp, pool) = setup_pool().await;
    let source_id = add_source(&pool, "acme", AdapterFamily::Ashby).await;

    let p = posting(Some("42"), "Old Role", "https://example.com/jobs/42");
    upsert_job(&pool, source_id, &p, Provenance::Crawler)
        .await
        .unwrap();
    let job_id: i64 = sqlx::query_scalar("SELECT id FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    backdate_job(&pool, job_id, 60).await;

    let summary = archive_old_jobs(&pool, 30, false).await.unwrap();
    assert_eq!(summary.eligible, 1);
    assert_eq!(summary.archived, 1);
    assert_eq!(summary.skipped, 0);

    assert_eq!(job_count(&pool).await, 0);
    let row = sqlx::query("SELECT original_job_id, title FROM jobs_archived")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("original_job_id"), job_id);
    assert_eq!(row.get::<String, _>("title"), "Old Role");
}

#[tokio::test]
async fn applied_jobs_are_never_archived() {
    let (_tmp, pool) = setup_pool().await;
    let source_id = add_source(&pool, "acme", AdapterFamily::Ashby).await;

    let p = posting(Some("42"), "Applied Role", "https://example.com/jobs/42");
    upsert_job(&pool, source_id, &p, Provenance::Crawler)
        .await
        .unwrap();
    let job_id: i64 = sqlx::query_scalar("SELECT id FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    backdate_job(&pool, job_id, 60).await;

    sqlx::query(
        "INSERT INTO applications (user_id, job_id, status, created_at) VALUES ('u1', ?, 'applied', ?)",
    )
    .bind(job_id)
    .bind(Utc::now().timestamp())
    .execute(&pool)
    .await
    .unwrap();

    let summary = archive_old_jobs(&pool, 30, false).await.unwrap();
    assert_eq!(summary.eligible, 0);
    assert_eq!(summary.archived, 0);
    assert_eq!(job_count(&pool).await, 1);
}

#[tokio::test]
async fn dry_run_moves_nothing() {
    let (_tmp, pool) = setup_pool().await;
    let source_id = add_source(&pool, "acme", AdapterFamily::Ashby).await;

    let p = posting(Some("42"), "Old Role", "https://example.com/jobs/42");
    upsert_job(&pool, source_id, &p, Provenance::Crawler)
        .await
        .unwrap();
    let job_id: i64 = sqlx::query_scalar("SELECT id FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    backdate_job(&pool, job_id, 60).await;

    let summary = archive_old_jobs(&pool, 30, true).await.unwrap();
    assert_eq!(summary.eligible, 1);
    assert_eq!(summary.archived, 0);
    assert_eq!(job_count(&pool).await, 1);
}

// ============ Flags ============

#[tokio::test]
async fn reflagging_replaces_kind_and_reason_and_bumps_updated_at() {
    let (_tmp, pool) = setup_pool().await;
    let source_id = add_source(&pool, "acme", AdapterFamily::Ashby).await;

    let p = posting(Some("1"), "Engineer", "https://example.com/jobs/1");
    upsert_job(&pool, source_id, &p, Provenance::Crawler)
        .await
        .unwrap();
    let job_id: i64 = sqlx::query_scalar("SELECT id FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();

    flag_job(&pool, "u1", job_id, FlagKind::Skipped, Some("too senior"))
        .await
        .unwrap();
    // Backdate so the second flag's timestamp is observably newer.
    sqlx::query("UPDATE job_flags SET created_at = created_at - 100, updated_at = updated_at - 100")
        .execute(&pool)
        .await
        .unwrap();

    flag_job(&pool, "u1", job_id, FlagKind::NotFit, None)
        .await
        .unwrap();

    let row = sqlx::query(
        "SELECT kind, reason, created_at, updated_at FROM job_flags WHERE user_id = 'u1' AND job_id = ?",
    )
    .bind(job_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.get::<String, _>("kind"), "not_fit");
    assert!(row.get::<Option<String>, _>("reason").is_none());
    assert!(row.get::<i64, _>("updated_at") > row.get::<i64, _>("created_at"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_flags")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
