//! Source adapter contract and registry.
//!
//! One adapter exists per ATS family. The orchestrator dispatches on the
//! family tag stored with each source — no inheritance, just a registry of
//! trait objects. Tests register stub adapters the same way the built-ins
//! are registered, so failure isolation and count accounting can be
//! exercised without the network.
//!
//! Adapters are not uniform internally: Greenhouse and Lever are JSON-API
//! backed, Ashby recovers the board's embedded app data from HTML, Workday
//! and the custom family scrape markup with CSS selectors. Only the output
//! contract — a `Vec<JobPosting>` with `None` for missing optional fields —
//! is fixed.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::CrawlerConfig;
use crate::error::IngestError;
use crate::models::{AdapterFamily, JobPosting, JobSource};

/// A fetch-and-extract implementation for one ATS family.
///
/// # Lifecycle
///
/// 1. Registered in an [`AdapterRegistry`] (built-ins via
///    [`AdapterRegistry::with_builtins`]).
/// 2. [`fetch`](SourceAdapter::fetch) is called once per source per crawl,
///    under the orchestrator's timeout.
/// 3. Returned postings flow through the ingestion engine's upsert.
///
/// A fetch failure is a source-level failure: the orchestrator records a
/// failed run for that source and moves on to the next one.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The family tag this adapter serves.
    fn family(&self) -> AdapterFamily;

    /// One-line description of the family's extraction strategy.
    fn description(&self) -> &str;

    /// Fetch the source's listing and return extracted postings.
    async fn fetch(&self, source: &JobSource) -> Result<Vec<JobPosting>, IngestError>;
}

/// Registry of adapters, keyed by family.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registry pre-loaded with the built-in family adapters, sharing one
    /// HTTP client configured from `[crawler]`.
    pub fn with_builtins(config: &CrawlerConfig) -> Result<Self, IngestError> {
        use crate::adapter_ashby::AshbyAdapter;
        use crate::adapter_custom::CustomAdapter;
        use crate::adapter_greenhouse::GreenhouseAdapter;
        use crate::adapter_lever::LeverAdapter;
        use crate::adapter_workday::WorkdayAdapter;

        let client = http_client(config)?;

        let mut registry = Self::new();
        registry.register(Box::new(AshbyAdapter::new(client.clone())));
        registry.register(Box::new(GreenhouseAdapter::new(client.clone())));
        registry.register(Box::new(LeverAdapter::new(client.clone())));
        registry.register(Box::new(WorkdayAdapter::new(client.clone())));
        registry.register(Box::new(CustomAdapter::new(client)));
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn find(&self, family: AdapterFamily) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.family() == family)
            .map(|a| a.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the shared HTTP client with browser-like headers. Some boards
/// reject requests without them.
pub fn http_client(config: &CrawlerConfig) -> Result<reqwest::Client, IngestError> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Ok(accept) =
        "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8".parse()
    {
        headers.insert(reqwest::header::ACCEPT, accept);
    }
    if let Ok(lang) = "en-US,en;q=0.5".parse() {
        headers.insert(reqwest::header::ACCEPT_LANGUAGE, lang);
    }

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| IngestError::SourceUnreachable(format!("failed to build HTTP client: {e}")))
}

/// GET a URL and return the response body, mapping transport and HTTP
/// status failures to a source-level error.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
) -> Result<String, IngestError> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::SourceUnreachable(format!(
            "{url} returned HTTP {status}"
        )));
    }

    Ok(response.text().await?)
}

/// Last path segment of a board URL, used as the company slug by the
/// JSON-API families (`boards.greenhouse.io/<slug>`, `jobs.lever.co/<slug>`).
pub(crate) fn board_slug(source_url: &str) -> Result<String, IngestError> {
    let parsed = url::Url::parse(source_url)
        .map_err(|e| IngestError::Extraction(format!("invalid source URL {source_url}: {e}")))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()).map(str::to_string))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            IngestError::Extraction(format!("source URL {source_url} has no board slug"))
        })
}

/// Best-effort parse of ISO-ish datetime strings (`2025-12-01T10:11:12Z`,
/// offset forms, or a bare date). Returns `None` when unparsable — adapters
/// leave `posting_date` unset rather than failing the posting.
pub(crate) fn parse_iso_datetime(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let s = value.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&chrono::Utc));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
