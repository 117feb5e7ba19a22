//! Custom adapter: selector-driven extraction with a heuristic fallback.
//!
//! Sources that don't match a known ATS family store selector directives in
//! their configuration; extraction follows those directives exactly. When a
//! source has no selectors stored, a deliberately last-resort heuristic scans
//! the page for job-looking links. The two paths are kept separate so
//! fixtures can target the selector path deterministically.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::adapters::{fetch_text, SourceAdapter};
use crate::error::IngestError;
use crate::models::{AdapterFamily, JobPosting, JobSource, JobType};

pub struct CustomAdapter {
    client: reqwest::Client,
}

impl CustomAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for CustomAdapter {
    fn family(&self) -> AdapterFamily {
        AdapterFamily::Custom
    }

    fn description(&self) -> &str {
        "Selector-driven extraction from per-source configuration"
    }

    async fn fetch(&self, source: &JobSource) -> Result<Vec<JobPosting>, IngestError> {
        let html = fetch_text(&self.client, &source.url).await?;

        match &source.selectors {
            Some(raw) => {
                let directives: SelectorDirectives = serde_json::from_value(raw.clone())
                    .map_err(|e| {
                        IngestError::Extraction(format!(
                            "source {} has invalid selector config: {e}",
                            source.id
                        ))
                    })?;
                extract_with_selectors(&html, &source.url, &directives)
            }
            None => extract_heuristic(&html, &source.url),
        }
    }
}

/// Selector directives stored with a custom source.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorDirectives {
    /// Repeated container, one per posting.
    pub item: String,
    /// Title element inside the container.
    pub title: String,
    /// Element carrying the posting link (`href`); defaults to the title
    /// selector.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    /// Container attribute holding the ATS id, e.g. `data-job-id`.
    #[serde(default)]
    pub external_id_attr: Option<String>,
}

/// Primary path: extract postings following stored selector directives.
pub fn extract_with_selectors(
    html: &str,
    base_url: &str,
    directives: &SelectorDirectives,
) -> Result<Vec<JobPosting>, IngestError> {
    let base = parse_base(base_url)?;
    let item_sel = selector(&directives.item)?;
    let title_sel = selector(&directives.title)?;
    let url_sel = match &directives.url {
        Some(css) => Some(selector(css)?),
        None => None,
    };
    let location_sel = match &directives.location {
        Some(css) => Some(selector(css)?),
        None => None,
    };
    let department_sel = match &directives.department {
        Some(css) => Some(selector(css)?),
        None => None,
    };

    let document = Html::parse_document(html);
    let mut postings = Vec::new();

    for item in document.select(&item_sel) {
        let Some(title_el) = item.select(&title_sel).next() else {
            continue;
        };
        let title = element_text(&title_el);
        if title.is_empty() {
            continue;
        }

        let link_el = url_sel
            .as_ref()
            .and_then(|sel| item.select(sel).next())
            .or(Some(title_el));
        let url = link_el
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| base.join(href).ok())
            .map(|u| u.to_string());

        let select_text = |sel: &Option<Selector>| {
            sel.as_ref()
                .and_then(|s| item.select(s).next())
                .map(|el| element_text(&el))
                .filter(|t| !t.is_empty())
        };

        postings.push(JobPosting {
            external_id: directives
                .external_id_attr
                .as_deref()
                .and_then(|attr| item.value().attr(attr))
                .map(str::to_string),
            title: Some(title),
            company: None,
            location: select_text(&location_sel),
            department: select_text(&department_sel),
            job_type: JobType::Unknown,
            url,
            ..Default::default()
        });
    }

    Ok(postings)
}

/// Href fragments that suggest a link points at a posting.
const JOB_LINK_HINTS: &[&str] = &["/job", "/jobs", "/careers", "/position", "/opening"];

/// Last-resort path for sources with no stored selectors: collect anchors
/// whose href looks like a posting link. Quality is explicitly best-effort.
pub fn extract_heuristic(html: &str, base_url: &str) -> Result<Vec<JobPosting>, IngestError> {
    let base = parse_base(base_url)?;
    let anchor_sel = selector("a[href]")?;

    let document = Html::parse_document(html);
    let mut postings = Vec::new();
    let mut seen_urls: Vec<String> = Vec::new();

    for anchor in document.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let lowered = href.to_lowercase();
        if !JOB_LINK_HINTS.iter().any(|hint| lowered.contains(hint)) {
            continue;
        }

        let title = element_text(&anchor);
        // A plausible posting title, not a bare "Apply" button or a slogan.
        if title.len() < 4 || title.len() > 120 || title.eq_ignore_ascii_case("apply") {
            continue;
        }

        let Some(url) = base.join(href).ok().map(|u| u.to_string()) else {
            continue;
        };
        if seen_urls.contains(&url) {
            continue;
        }
        seen_urls.push(url.clone());

        postings.push(JobPosting {
            title: Some(title),
            job_type: JobType::Unknown,
            url: Some(url),
            ..Default::default()
        });
    }

    Ok(postings)
}

fn parse_base(base_url: &str) -> Result<url::Url, IngestError> {
    url::Url::parse(base_url)
        .map_err(|e| IngestError::Extraction(format!("invalid board URL {base_url}: {e}")))
}

fn selector(css: &str) -> Result<Selector, IngestError> {
    Selector::parse(css).map_err(|e| IngestError::Extraction(format!("bad selector {css}: {e}")))
}

fn element_text(el: &scraper::ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://careers.example.com/openings";

    const FIXTURE: &str = r#"<html><body>
        <section class="opening" data-req-id="REQ-77">
            <h3 class="role"><a href="/openings/req-77">Embedded Firmware Engineer</a></h3>
            <span class="where">Berlin</span>
            <span class="team">Hardware</span>
        </section>
        <section class="opening">
            <h3 class="role"><a href="/openings/req-78">Technical Writer</a></h3>
        </section>
    </body></html>"#;

    fn directives() -> SelectorDirectives {
        SelectorDirectives {
            item: "section.opening".to_string(),
            title: "h3.role a".to_string(),
            url: None,
            location: Some("span.where".to_string()),
            department: Some("span.team".to_string()),
            external_id_attr: Some("data-req-id".to_string()),
        }
    }

    #[test]
    fn selector_path_extracts_configured_fields() {
        let postings = extract_with_selectors(FIXTURE, BASE, &directives()).unwrap();
        assert_eq!(postings.len(), 2);

        assert_eq!(
            postings[0].title.as_deref(),
            Some("Embedded Firmware Engineer")
        );
        assert_eq!(postings[0].external_id.as_deref(), Some("REQ-77"));
        assert_eq!(postings[0].location.as_deref(), Some("Berlin"));
        assert_eq!(postings[0].department.as_deref(), Some("Hardware"));
        assert_eq!(
            postings[0].url.as_deref(),
            Some("https://careers.example.com/openings/req-77")
        );

        assert_eq!(postings[1].external_id, None);
        assert_eq!(postings[1].location, None);
    }

    #[test]
    fn invalid_selector_is_an_extraction_error() {
        let mut d = directives();
        d.item = ":::".to_string();
        assert!(matches!(
            extract_with_selectors(FIXTURE, BASE, &d).unwrap_err(),
            IngestError::Extraction(_)
        ));
    }

    #[test]
    fn heuristic_collects_job_looking_links_only() {
        let html = r#"<html><body>
            <a href="/jobs/123">Site Reliability Engineer</a>
            <a href="/jobs/123">Site Reliability Engineer</a>
            <a href="/about">About</a>
            <a href="/jobs/124">Apply</a>
            <a href="/blog/why-we-love-jobs-to-be-done">Why we love jobs-to-be-done thinking at our company and what it taught us about building product for the long haul</a>
        </body></html>"#;
        let postings = extract_heuristic(html, BASE).unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(
            postings[0].title.as_deref(),
            Some("Site Reliability Engineer")
        );
    }
}
