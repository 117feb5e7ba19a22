//! Ashby adapter (HTML page with embedded board data).
//!
//! Ashby boards render client-side but ship the full posting list in a
//! `window.__appData` script blob. Extraction recovers that JSON when
//! present and cross-references it with the posting links in the markup;
//! apply sub-links are skipped so the listing URL is the one stored.
//!
//! Job URLs come in two shapes on Ashby boards:
//! `/<company>/<uuid>` and `/<company>/jobs/<uuid>`.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;

use crate::adapters::{fetch_text, parse_iso_datetime, SourceAdapter};
use crate::error::IngestError;
use crate::models::{AdapterFamily, JobPosting, JobSource, JobType};

pub struct AshbyAdapter {
    client: reqwest::Client,
}

impl AshbyAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for AshbyAdapter {
    fn family(&self) -> AdapterFamily {
        AdapterFamily::Ashby
    }

    fn description(&self) -> &str {
        "AshbyHQ company board via embedded app data"
    }

    async fn fetch(&self, source: &JobSource) -> Result<Vec<JobPosting>, IngestError> {
        let html = fetch_text(&self.client, &source.url).await?;
        extract_postings(&html, &source.url)
    }
}

/// Extract postings from a rendered Ashby board page.
pub fn extract_postings(html: &str, base_url: &str) -> Result<Vec<JobPosting>, IngestError> {
    let parsed = url::Url::parse(base_url)
        .map_err(|e| IngestError::Extraction(format!("invalid board URL {base_url}: {e}")))?;
    let origin = format!(
        "{}://{}",
        parsed.scheme(),
        parsed
            .host_str()
            .ok_or_else(|| IngestError::Extraction(format!("{base_url} has no host")))?
    );
    let company_slug = parsed.path().trim_matches('/').to_string();
    if company_slug.is_empty() {
        return Err(IngestError::Extraction(format!(
            "{base_url} has no company slug"
        )));
    }

    let board = read_app_data(html);
    let anchors = collect_anchors(html);

    let mut postings = Vec::new();
    let mut seen_ids: Vec<String> = Vec::new();

    for (href, anchor_text) in &anchors {
        // Application sub-links and off-board links never identify a posting.
        if href.contains("/apply") || !href.contains(company_slug.as_str()) {
            continue;
        }

        let parts: Vec<&str> = href.trim_matches('/').split('/').filter(|p| !p.is_empty()).collect();
        let Some(&last) = parts.last() else {
            continue;
        };
        // Ashby posting ids are UUIDs; short trailing segments are nav links.
        if last.len() < 20 {
            continue;
        }
        let external_id = last.to_string();
        if seen_ids.contains(&external_id) {
            continue;
        }

        let job_url = if parts.len() >= 3 && parts[1] == "jobs" {
            format!("{origin}/{company_slug}/jobs/{external_id}")
        } else {
            format!("{origin}/{company_slug}/{external_id}")
        };

        let meta = board.get(&external_id);
        let title = meta
            .and_then(|m| m.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                let t = anchor_text.trim();
                (!t.is_empty()).then(|| t.to_string())
            });
        let Some(title) = title else {
            continue;
        };

        seen_ids.push(external_id.clone());
        postings.push(posting_from_meta(external_id, title, job_url, meta));
    }

    // Some boards render postings purely from app data with no crawlable
    // anchors; fall back to the blob itself.
    if postings.is_empty() && !board.is_empty() {
        for (id, meta) in &board {
            let Some(title) = meta.get("title").and_then(Value::as_str) else {
                continue;
            };
            let job_url = format!("{origin}/{company_slug}/{id}");
            postings.push(posting_from_meta(
                id.clone(),
                title.to_string(),
                job_url,
                Some(meta),
            ));
        }
        postings.sort_by(|a, b| a.external_id.cmp(&b.external_id));
    }

    Ok(postings)
}

fn posting_from_meta(
    external_id: String,
    title: String,
    job_url: String,
    meta: Option<&Value>,
) -> JobPosting {
    let department = meta.and_then(|m| {
        m.get("departmentName")
            .or_else(|| m.get("teamName"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let mut location = meta
        .and_then(|m| m.get("locationName"))
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(sec) = meta
        .and_then(|m| m.get("secondaryLocations"))
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|s| s.get("locationName"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        location = Some(match location {
            Some(primary) => format!("{primary}, {sec}"),
            None => sec.to_string(),
        });
    }

    let job_type = meta
        .and_then(|m| m.get("employmentType"))
        .and_then(Value::as_str)
        .map(employment_type)
        .unwrap_or(JobType::Unknown);

    let posting_date = meta
        .and_then(|m| m.get("publishedDate"))
        .and_then(Value::as_str)
        .and_then(parse_iso_datetime);

    JobPosting {
        external_id: Some(external_id),
        title: Some(title),
        company: None,
        location,
        department,
        job_type,
        url: Some(job_url),
        posting_date,
        ..Default::default()
    }
}

fn employment_type(raw: &str) -> JobType {
    match raw {
        "FullTime" => JobType::FullTime,
        "PartTime" => JobType::PartTime,
        "Intern" | "Internship" => JobType::Internship,
        "Contract" | "Contractor" => JobType::Contract,
        _ => JobType::Unknown,
    }
}

/// Pull `window.__appData.jobBoard.jobPostings` out of the page scripts,
/// keyed by posting id. Returns an empty map when the blob is absent or
/// unparsable — the anchor scan still works without it.
fn read_app_data(html: &str) -> HashMap<String, Value> {
    let mut map = HashMap::new();

    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script") else {
        return map;
    };

    for script in document.select(&selector) {
        let text: String = script.text().collect();
        let Some(marker) = text.find("window.__appData") else {
            continue;
        };
        let Some(eq) = text[marker..].find('=') else {
            continue;
        };
        let after = &text[marker + eq + 1..];
        let Some(start) = after.find('{') else {
            continue;
        };
        let Some(end) = after.rfind('}') else {
            continue;
        };
        let Ok(data) = serde_json::from_str::<Value>(&after[start..=end]) else {
            continue;
        };

        if let Some(postings) = data
            .get("jobBoard")
            .and_then(|b| b.get("jobPostings"))
            .and_then(Value::as_array)
        {
            for posting in postings {
                if let Some(id) = posting.get("id").and_then(Value::as_str) {
                    map.insert(id.to_string(), posting.clone());
                }
            }
        }
        break;
    }

    map
}

fn collect_anchors(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            let text: String = a.text().collect();
            Some((href, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://jobs.ashbyhq.com/acme";

    fn fixture() -> String {
        let app_data = r#"{
            "jobBoard": {
                "jobPostings": [
                    {
                        "id": "0a1b2c3d-1111-2222-3333-444455556666",
                        "title": "Machine Learning Engineer",
                        "departmentName": "Engineering",
                        "locationName": "San Francisco",
                        "secondaryLocations": [ { "locationName": "Remote" } ],
                        "employmentType": "FullTime",
                        "publishedDate": "2025-07-15T00:00:00Z"
                    },
                    {
                        "id": "9f8e7d6c-aaaa-bbbb-cccc-ddddeeeeffff",
                        "title": "Office Manager",
                        "teamName": "Operations",
                        "locationName": "New York",
                        "employmentType": "PartTime"
                    }
                ]
            }
        }"#;
        format!(
            r#"<html><head>
            <script>window.__appData = {app_data};</script>
            </head><body>
            <a href="/acme/0a1b2c3d-1111-2222-3333-444455556666">Machine Learning Engineer</a>
            <a href="/acme/jobs/9f8e7d6c-aaaa-bbbb-cccc-ddddeeeeffff">Office Manager</a>
            <a href="/acme/0a1b2c3d-1111-2222-3333-444455556666/apply">Apply</a>
            <a href="/acme/about">About us</a>
            </body></html>"#
        )
    }

    #[test]
    fn extracts_postings_with_app_data_metadata() {
        let postings = extract_postings(&fixture(), BASE).unwrap();
        assert_eq!(postings.len(), 2);

        let ml = postings
            .iter()
            .find(|p| p.title.as_deref() == Some("Machine Learning Engineer"))
            .unwrap();
        assert_eq!(
            ml.external_id.as_deref(),
            Some("0a1b2c3d-1111-2222-3333-444455556666")
        );
        assert_eq!(ml.location.as_deref(), Some("San Francisco, Remote"));
        assert_eq!(ml.department.as_deref(), Some("Engineering"));
        assert_eq!(ml.job_type, JobType::FullTime);
        assert!(ml.posting_date.is_some());
        assert_eq!(
            ml.url.as_deref(),
            Some("https://jobs.ashbyhq.com/acme/0a1b2c3d-1111-2222-3333-444455556666")
        );
    }

    #[test]
    fn jobs_path_pattern_is_preserved() {
        let postings = extract_postings(&fixture(), BASE).unwrap();
        let ops = postings
            .iter()
            .find(|p| p.title.as_deref() == Some("Office Manager"))
            .unwrap();
        assert_eq!(
            ops.url.as_deref(),
            Some("https://jobs.ashbyhq.com/acme/jobs/9f8e7d6c-aaaa-bbbb-cccc-ddddeeeeffff")
        );
        assert_eq!(ops.department.as_deref(), Some("Operations"));
    }

    #[test]
    fn apply_links_and_nav_links_are_skipped() {
        let postings = extract_postings(&fixture(), BASE).unwrap();
        assert!(postings
            .iter()
            .all(|p| !p.url.as_deref().unwrap_or_default().contains("/apply")));
        assert!(postings
            .iter()
            .all(|p| p.title.as_deref() != Some("About us")));
    }

    #[test]
    fn falls_back_to_app_data_when_no_anchors_match() {
        let html = fixture().replace("<a href", "<span data-href");
        let postings = extract_postings(&html, BASE).unwrap();
        assert_eq!(postings.len(), 2);
    }

    #[test]
    fn anchor_titles_used_without_app_data() {
        let html = r#"<html><body>
            <a href="/acme/abcdefabcdefabcdefabcdef">Field Sales Lead</a>
        </body></html>"#;
        let postings = extract_postings(html, BASE).unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].title.as_deref(), Some("Field Sales Lead"));
        assert_eq!(postings[0].job_type, JobType::Unknown);
    }
}
