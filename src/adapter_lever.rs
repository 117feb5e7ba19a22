//! Lever adapter (JSON API).
//!
//! Lever boards are served at `https://api.lever.co/v0/postings/<slug>?mode=json`.
//! The slug is the first path segment of the source URL (`jobs.lever.co/<slug>`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::adapters::{board_slug, fetch_text, SourceAdapter};
use crate::error::IngestError;
use crate::models::{AdapterFamily, JobPosting, JobSource, JobType};

pub struct LeverAdapter {
    client: reqwest::Client,
}

impl LeverAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for LeverAdapter {
    fn family(&self) -> AdapterFamily {
        AdapterFamily::Lever
    }

    fn description(&self) -> &str {
        "Lever job board via the public postings API"
    }

    async fn fetch(&self, source: &JobSource) -> Result<Vec<JobPosting>, IngestError> {
        let slug = board_slug(&source.url)?;
        let api_url = format!("https://api.lever.co/v0/postings/{slug}?mode=json");
        let body = fetch_text(&self.client, &api_url).await?;
        extract_postings(&body)
    }
}

#[derive(Deserialize)]
struct LeverPosting {
    id: String,
    /// Lever calls the posting title `text`.
    text: String,
    #[serde(rename = "hostedUrl")]
    hosted_url: String,
    #[serde(default)]
    categories: Option<LeverCategories>,
    #[serde(rename = "descriptionPlain", default)]
    description_plain: Option<String>,
    /// Millisecond epoch.
    #[serde(rename = "createdAt", default)]
    created_at: Option<i64>,
}

#[derive(Deserialize)]
struct LeverCategories {
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    commitment: Option<String>,
}

fn commitment_to_job_type(commitment: Option<&str>) -> JobType {
    let Some(c) = commitment else {
        return JobType::Unknown;
    };
    let c = c.to_lowercase();
    if c.contains("full") {
        JobType::FullTime
    } else if c.contains("part") {
        JobType::PartTime
    } else if c.contains("intern") {
        JobType::Internship
    } else if c.contains("contract") {
        JobType::Contract
    } else {
        JobType::Unknown
    }
}

/// Parse a postings-API response body (a JSON array) into postings.
pub fn extract_postings(body: &str) -> Result<Vec<JobPosting>, IngestError> {
    let raw: Vec<LeverPosting> = serde_json::from_str(body)
        .map_err(|e| IngestError::Extraction(format!("lever postings response: {e}")))?;

    let postings = raw
        .into_iter()
        .map(|p| {
            let categories = p.categories.unwrap_or(LeverCategories {
                location: None,
                team: None,
                commitment: None,
            });
            JobPosting {
                external_id: Some(p.id),
                title: Some(p.text),
                company: None,
                location: categories.location,
                department: categories.team,
                description: p.description_plain.filter(|d| !d.trim().is_empty()),
                job_type: commitment_to_job_type(categories.commitment.as_deref()),
                url: Some(p.hosted_url),
                posting_date: p
                    .created_at
                    .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms)),
                ..Default::default()
            }
        })
        .collect();

    Ok(postings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"[
        {
            "id": "a1b2c3d4-0000-1111-2222-333344445555",
            "text": "Staff Platform Engineer",
            "hostedUrl": "https://jobs.lever.co/acme/a1b2c3d4-0000-1111-2222-333344445555",
            "categories": {
                "location": "New York, NY",
                "team": "Platform",
                "commitment": "Full-time"
            },
            "descriptionPlain": "You will run the platform.",
            "createdAt": 1748736000000
        },
        {
            "id": "ffff0000-aaaa-bbbb-cccc-ddddeeee0001",
            "text": "Design Contractor",
            "hostedUrl": "https://jobs.lever.co/acme/ffff0000-aaaa-bbbb-cccc-ddddeeee0001",
            "categories": { "commitment": "Contract" }
        }
    ]"#;

    #[test]
    fn extracts_postings_with_commitment_mapping() {
        let postings = extract_postings(FIXTURE).unwrap();
        assert_eq!(postings.len(), 2);

        assert_eq!(postings[0].title.as_deref(), Some("Staff Platform Engineer"));
        assert_eq!(postings[0].job_type, JobType::FullTime);
        assert_eq!(postings[0].department.as_deref(), Some("Platform"));
        assert!(postings[0].posting_date.is_some());

        assert_eq!(postings[1].job_type, JobType::Contract);
        assert_eq!(postings[1].location, None);
    }

    #[test]
    fn commitment_mapping_defaults_to_unknown() {
        assert_eq!(commitment_to_job_type(None), JobType::Unknown);
        assert_eq!(commitment_to_job_type(Some("Seasonal")), JobType::Unknown);
        assert_eq!(commitment_to_job_type(Some("Internship")), JobType::Internship);
    }

    #[test]
    fn malformed_body_is_an_extraction_error() {
        assert!(matches!(
            extract_postings("{}").unwrap_err(),
            IngestError::Extraction(_)
        ));
    }
}
