//! Manual capture: ingest a single posting from a browser page.
//!
//! The capture path shares the ingestion engine with the crawler, so a job
//! first captured by hand and later re-sighted by a crawl converges on one
//! row. The source for a captured job is resolved from the page URL and
//! created on the fly when the board has never been crawled.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use url::Url;

use crate::canonical::canonicalize_url;
use crate::error::IngestError;
use crate::ingest::{upsert_job, IngestOutcome};
use crate::models::{AdapterFamily, JobPosting, Provenance};
use crate::sources::get_or_create_source;

/// Payload sent by the capture client. Only `url` is mandatory.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureRequest {
    pub url: String,
    /// Optional family marker from the client (e.g. "ashby"). Unknown
    /// markers are ignored in favor of host inference.
    pub source: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub job_url: String,
    pub source_id: i64,
    pub outcome: &'static str,
}

/// Resolve the adapter family for a capture: the client's marker wins when it
/// names a known family, otherwise fall back to host inference.
fn resolve_family(marker: Option<&str>, url: &Url) -> AdapterFamily {
    marker
        .and_then(AdapterFamily::parse)
        .unwrap_or_else(|| family_from_url(url))
}

/// Infer the adapter family from a posting URL's host.
fn family_from_url(url: &Url) -> AdapterFamily {
    let host = url.host_str().unwrap_or_default();
    if host.contains("ashbyhq.com") {
        AdapterFamily::Ashby
    } else if host.contains("greenhouse.io") {
        AdapterFamily::Greenhouse
    } else if host.contains("lever.co") {
        AdapterFamily::Lever
    } else if host.contains("myworkdayjobs.com") || host.contains("workday") {
        AdapterFamily::Workday
    } else {
        AdapterFamily::Custom
    }
}

/// Derive a stable source name from the board URL: the company slug for
/// hosted boards, the bare host otherwise.
fn source_name_from_url(url: &Url, family: AdapterFamily) -> String {
    let slug = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .map(str::to_string);
    match (family, slug) {
        (AdapterFamily::Custom, _) | (_, None) => {
            url.host_str().unwrap_or("unknown").to_string()
        }
        (_, Some(slug)) => slug,
    }
}

/// The board landing URL a crawler would use for this posting's source.
fn source_url_from_posting(url: &Url, family: AdapterFamily) -> String {
    let origin = url.origin().ascii_serialization();
    match family {
        AdapterFamily::Custom => origin,
        _ => {
            let slug = url
                .path_segments()
                .and_then(|mut segments| segments.find(|s| !s.is_empty()))
                .unwrap_or_default();
            format!("{origin}/{slug}")
        }
    }
}

/// Ingest one captured posting with extension provenance.
pub async fn capture_job(
    pool: &SqlitePool,
    request: &CaptureRequest,
) -> Result<CaptureResult, IngestError> {
    let canonical = canonicalize_url(&request.url);
    let parsed = Url::parse(&canonical)
        .map_err(|err| IngestError::Extraction(format!("invalid capture url: {err}")))?;

    let family = resolve_family(request.source.as_deref(), &parsed);
    let name = source_name_from_url(&parsed, family);
    let board_url = source_url_from_posting(&parsed, family);

    let source_id = get_or_create_source(pool, family, &name, &board_url)
        .await
        .map_err(|err| match err.downcast::<sqlx::Error>() {
            Ok(db) => IngestError::Db(db),
            Err(other) => IngestError::Extraction(other.to_string()),
        })?;

    let posting = JobPosting {
        title: Some(
            request
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Unknown Role".to_string()),
        ),
        company: Some(
            request
                .company
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "Unknown Company".to_string()),
        ),
        url: Some(canonical.clone()),
        location: request.location.clone(),
        description: request.description.clone(),
        external_id: request.external_id.clone(),
        ..Default::default()
    };

    let outcome = upsert_job(pool, source_id, &posting, Provenance::Extension).await?;
    info!(source_id, url = %canonical, outcome = ?outcome, "captured job");

    Ok(CaptureResult {
        job_url: canonical,
        source_id,
        outcome: match outcome {
            IngestOutcome::Created => "created",
            IngestOutcome::Updated => "updated",
            IngestOutcome::Unchanged => "unchanged",
        },
    })
}
