//! Ingestion engine: identity-keyed upsert of extracted postings.
//!
//! Both writers — the scheduled crawler and the live capture path — go
//! through [`upsert_job`]. Matching order: the ATS-provided external id
//! scoped to the source when present, the canonicalized URL otherwise. The
//! match-then-write step runs in one transaction, backed by the uniqueness
//! constraints in the schema; a racing writer that trips a constraint gets a
//! retryable conflict and re-attempts as an update.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::canonical::canonicalize_url;
use crate::error::IngestError;
use crate::models::{JobPosting, JobType, Provenance};

/// What the upsert decided for one posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Mutable fields of an existing row, loaded for comparison.
struct ExistingJob {
    id: i64,
    title: String,
    company: String,
    location: Option<String>,
    department: Option<String>,
    description: Option<String>,
    requirements: Option<String>,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    job_type: String,
    url: String,
    posting_date: Option<i64>,
}

/// Upsert one extracted posting for a source.
///
/// Returns [`IngestError::MissingField`] when title, company, or URL is
/// absent — the caller drops the posting without counting it. A re-sighted
/// job is forced back to active; provenance is written only at creation.
pub async fn upsert_job(
    pool: &SqlitePool,
    source_id: i64,
    posting: &JobPosting,
    provenance: Provenance,
) -> Result<IngestOutcome, IngestError> {
    let raw_id = || {
        posting
            .external_id
            .clone()
            .or_else(|| posting.url.clone())
            .unwrap_or_else(|| "<no identifier>".to_string())
    };
    let missing = |field: &'static str| IngestError::MissingField {
        source_id,
        field,
        raw_id: raw_id(),
    };

    let title = posting
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| missing("title"))?;
    let company = posting
        .company
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| missing("company"))?;
    let raw_url = posting
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| missing("url"))?;

    let url = canonicalize_url(raw_url);

    match try_upsert(pool, source_id, posting, provenance, title, company, &url).await {
        Err(e) if e.is_retryable() => {
            debug!(source_id, url = %url, "upsert conflict, retrying as update");
            try_upsert(pool, source_id, posting, provenance, title, company, &url).await
        }
        other => other,
    }
}

async fn try_upsert(
    pool: &SqlitePool,
    source_id: i64,
    posting: &JobPosting,
    provenance: Provenance,
    title: &str,
    company: &str,
    url: &str,
) -> Result<IngestOutcome, IngestError> {
    let now = Utc::now().timestamp();
    let posting_ts = posting.posting_date.map(|d| d.timestamp());

    let mut tx = pool.begin().await?;

    // Match order: (source, external id) first, canonicalized URL second.
    // The URL fallback also catches the cross-path case where the capture
    // path created the row without an external id and the crawler later
    // re-sights it with one.
    let mut existing = match posting.external_id.as_deref() {
        Some(ext) => load_existing(&mut tx, source_id, "external_id", ext).await?,
        None => None,
    };
    if existing.is_none() {
        existing = load_existing(&mut tx, source_id, "url", url).await?;
    }

    let outcome = match existing {
        None => {
            // ON CONFLICT on the URL identity is the race net: a concurrent
            // writer that inserted first turns this into an update, never a
            // second row. Provenance is deliberately absent from the update
            // set — first writer wins.
            let insert = sqlx::query(
                r#"
                INSERT INTO jobs (
                    source_id, external_id, title, company, location, department,
                    description, requirements, salary_min, salary_max, job_type,
                    url, posting_date, is_active, provenance, crawled_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                ON CONFLICT(source_id, url) DO UPDATE SET
                    external_id = COALESCE(excluded.external_id, jobs.external_id),
                    title = excluded.title,
                    company = excluded.company,
                    location = excluded.location,
                    department = excluded.department,
                    description = excluded.description,
                    requirements = excluded.requirements,
                    salary_min = excluded.salary_min,
                    salary_max = excluded.salary_max,
                    job_type = excluded.job_type,
                    posting_date = excluded.posting_date,
                    is_active = 1,
                    crawled_at = excluded.crawled_at,
                    last_updated = excluded.crawled_at
                "#,
            )
            .bind(source_id)
            .bind(&posting.external_id)
            .bind(title)
            .bind(company)
            .bind(&posting.location)
            .bind(&posting.department)
            .bind(&posting.description)
            .bind(&posting.requirements)
            .bind(posting.salary_min)
            .bind(posting.salary_max)
            .bind(posting.job_type.as_str())
            .bind(url)
            .bind(posting_ts)
            .bind(provenance.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await;

            match insert {
                Ok(_) => IngestOutcome::Created,
                Err(e) => return Err(map_conflict(e, url)),
            }
        }
        Some(row) => {
            let changed = row.title != title
                || row.company != company
                || row.location.as_deref() != posting.location.as_deref()
                || row.department.as_deref() != posting.department.as_deref()
                || row.description.as_deref() != posting.description.as_deref()
                || row.requirements.as_deref() != posting.requirements.as_deref()
                || row.salary_min != posting.salary_min
                || row.salary_max != posting.salary_max
                || JobType::parse(&row.job_type) != posting.job_type
                || row.url != url
                || row.posting_date != posting_ts;

            if changed {
                let update = sqlx::query(
                    r#"
                    UPDATE jobs SET
                        external_id = COALESCE(?, external_id),
                        title = ?, company = ?, location = ?, department = ?,
                        description = ?, requirements = ?,
                        salary_min = ?, salary_max = ?, job_type = ?,
                        url = ?, posting_date = ?,
                        is_active = 1, crawled_at = ?, last_updated = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&posting.external_id)
                .bind(title)
                .bind(company)
                .bind(&posting.location)
                .bind(&posting.department)
                .bind(&posting.description)
                .bind(&posting.requirements)
                .bind(posting.salary_min)
                .bind(posting.salary_max)
                .bind(posting.job_type.as_str())
                .bind(url)
                .bind(posting_ts)
                .bind(now)
                .bind(now)
                .bind(row.id)
                .execute(&mut *tx)
                .await;

                match update {
                    Ok(_) => IngestOutcome::Updated,
                    Err(e) => return Err(map_conflict(e, url)),
                }
            } else {
                // Only a freshness touch; a re-sighted identical posting is
                // still live.
                sqlx::query("UPDATE jobs SET crawled_at = ?, is_active = 1 WHERE id = ?")
                    .bind(now)
                    .bind(row.id)
                    .execute(&mut *tx)
                    .await?;
                IngestOutcome::Unchanged
            }
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

async fn load_existing(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    source_id: i64,
    key_column: &str,
    key: &str,
) -> Result<Option<ExistingJob>, IngestError> {
    // key_column is one of two compile-time constants, never user input.
    let sql = format!(
        r#"
        SELECT id, title, company, location, department, description,
               requirements, salary_min, salary_max, job_type, url, posting_date
        FROM jobs
        WHERE source_id = ? AND {key_column} = ?
        LIMIT 1
        "#
    );

    let row = sqlx::query(&sql)
        .bind(source_id)
        .bind(key)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(row.map(|r| ExistingJob {
        id: r.get("id"),
        title: r.get("title"),
        company: r.get("company"),
        location: r.get("location"),
        department: r.get("department"),
        description: r.get("description"),
        requirements: r.get("requirements"),
        salary_min: r.get("salary_min"),
        salary_max: r.get("salary_max"),
        job_type: r.get("job_type"),
        url: r.get("url"),
        posting_date: r.get("posting_date"),
    }))
}

/// Map a uniqueness violation onto the retryable conflict variant; anything
/// else passes through as a database error.
fn map_conflict(err: sqlx::Error, url: &str) -> IngestError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return IngestError::Conflict {
                url: url.to_string(),
            };
        }
    }
    IngestError::Db(err)
}
