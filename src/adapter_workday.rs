//! Workday adapter (HTML-scraped).
//!
//! Workday tenants render job lists as repeated item blocks with a title
//! link and a location span. Markup varies per tenant; extraction is
//! best-effort over the common `job-item` structure, and a source that
//! needs different selectors should be configured as the `custom` family
//! instead.

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::adapters::{fetch_text, SourceAdapter};
use crate::error::IngestError;
use crate::models::{AdapterFamily, JobPosting, JobSource, JobType};

pub struct WorkdayAdapter {
    client: reqwest::Client,
}

impl WorkdayAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for WorkdayAdapter {
    fn family(&self) -> AdapterFamily {
        AdapterFamily::Workday
    }

    fn description(&self) -> &str {
        "Workday tenant board, scraped from rendered list markup"
    }

    async fn fetch(&self, source: &JobSource) -> Result<Vec<JobPosting>, IngestError> {
        let html = fetch_text(&self.client, &source.url).await?;
        extract_postings(&html, &source.url)
    }
}

/// Extract postings from a Workday job list page.
pub fn extract_postings(html: &str, base_url: &str) -> Result<Vec<JobPosting>, IngestError> {
    let base = url::Url::parse(base_url)
        .map_err(|e| IngestError::Extraction(format!("invalid board URL {base_url}: {e}")))?;

    let item_sel = selector("div.job-item, li.job-item")?;
    let title_sel = selector("a.job-title")?;
    let location_sel = selector("span.job-location")?;

    let document = Html::parse_document(html);
    let mut postings = Vec::new();

    for item in document.select(&item_sel) {
        let Some(title_el) = item.select(&title_sel).next() else {
            continue;
        };
        let title: String = title_el.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let url = title_el
            .value()
            .attr("href")
            .and_then(|href| base.join(href).ok())
            .map(|u| u.to_string());

        let location = item
            .select(&location_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|l| !l.is_empty());

        postings.push(JobPosting {
            external_id: item.value().attr("data-job-id").map(str::to_string),
            title: Some(title),
            company: None,
            location,
            job_type: JobType::Unknown,
            url,
            ..Default::default()
        });
    }

    Ok(postings)
}

fn selector(css: &str) -> Result<Selector, IngestError> {
    Selector::parse(css).map_err(|e| IngestError::Extraction(format!("bad selector {css}: {e}")))
}
