//! Greenhouse adapter (JSON API).
//!
//! Greenhouse exposes every public board at
//! `https://boards-api.greenhouse.io/v1/boards/<slug>/jobs?content=true`,
//! which is far more stable than scraping the rendered board. The slug is
//! the first path segment of the source URL (`boards.greenhouse.io/<slug>`).

use async_trait::async_trait;
use serde::Deserialize;

use crate::adapters::{board_slug, fetch_text, parse_iso_datetime, SourceAdapter};
use crate::error::IngestError;
use crate::models::{AdapterFamily, JobPosting, JobSource, JobType};

pub struct GreenhouseAdapter {
    client: reqwest::Client,
}

impl GreenhouseAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for GreenhouseAdapter {
    fn family(&self) -> AdapterFamily {
        AdapterFamily::Greenhouse
    }

    fn description(&self) -> &str {
        "Greenhouse job board via the public boards API"
    }

    async fn fetch(&self, source: &JobSource) -> Result<Vec<JobPosting>, IngestError> {
        let slug = board_slug(&source.url)?;
        let api_url =
            format!("https://boards-api.greenhouse.io/v1/boards/{slug}/jobs?content=true");
        let body = fetch_text(&self.client, &api_url).await?;
        extract_postings(&body)
    }
}

#[derive(Deserialize)]
struct BoardResponse {
    #[serde(default)]
    jobs: Vec<BoardJob>,
}

#[derive(Deserialize)]
struct BoardJob {
    id: i64,
    title: String,
    absolute_url: String,
    #[serde(default)]
    location: Option<BoardLocation>,
    #[serde(default)]
    departments: Vec<BoardDepartment>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    first_published: Option<String>,
}

#[derive(Deserialize)]
struct BoardLocation {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct BoardDepartment {
    #[serde(default)]
    name: Option<String>,
}

/// Parse a boards-API response body into postings.
pub fn extract_postings(body: &str) -> Result<Vec<JobPosting>, IngestError> {
    let response: BoardResponse = serde_json::from_str(body)
        .map_err(|e| IngestError::Extraction(format!("greenhouse board response: {e}")))?;

    let postings = response
        .jobs
        .into_iter()
        .map(|job| JobPosting {
            external_id: Some(job.id.to_string()),
            title: Some(job.title),
            company: None,
            location: job.location.and_then(|l| l.name),
            department: job.departments.into_iter().find_map(|d| d.name),
            description: job.content.filter(|c| !c.trim().is_empty()),
            job_type: JobType::Unknown,
            url: Some(job.absolute_url),
            posting_date: job
                .first_published
                .as_deref()
                .and_then(parse_iso_datetime),
            ..Default::default()
        })
        .collect();

    Ok(postings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "jobs": [
            {
                "id": 4011001,
                "title": "Senior Backend Engineer",
                "absolute_url": "https://boards.greenhouse.io/acme/jobs/4011001",
                "location": { "name": "Remote - US" },
                "departments": [ { "name": "Engineering" } ],
                "content": "<p>Build services.</p>",
                "first_published": "2025-06-01T09:00:00-04:00"
            },
            {
                "id": 4011002,
                "title": "Recruiter",
                "absolute_url": "https://boards.greenhouse.io/acme/jobs/4011002",
                "location": null,
                "departments": []
            }
        ],
        "meta": { "total": 2 }
    }"#;

    #[test]
    fn extracts_jobs_with_external_ids() {
        let postings = extract_postings(FIXTURE).unwrap();
        assert_eq!(postings.len(), 2);

        let first = &postings[0];
        assert_eq!(first.external_id.as_deref(), Some("4011001"));
        assert_eq!(first.title.as_deref(), Some("Senior Backend Engineer"));
        assert_eq!(first.location.as_deref(), Some("Remote - US"));
        assert_eq!(first.department.as_deref(), Some("Engineering"));
        assert!(first.posting_date.is_some());
    }

    #[test]
    fn missing_optional_fields_are_none() {
        let postings = extract_postings(FIXTURE).unwrap();
        let second = &postings[1];
        assert_eq!(second.location, None);
        assert_eq!(second.department, None);
        assert_eq!(second.description, None);
        assert_eq!(second.posting_date, None);
    }

    #[test]
    fn malformed_body_is_an_extraction_error() {
        let err = extract_postings("<html>not json</html>").unwrap_err();
        assert!(matches!(err, IngestError::Extraction(_)));
    }

    #[test]
    fn empty_board_yields_no_postings() {
        let postings = extract_postings(r#"{"jobs": []}"#).unwrap();
        assert!(postings.is_empty());
    }
}
