//! Core data models for the ingestion pipeline.
//!
//! These types represent the job sources, extracted postings, canonical job
//! records, and crawl runs that flow through the crawler, the capture path,
//! and the retention pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which ATS family a source belongs to. The orchestrator dispatches on this
/// tag; one adapter implementation exists per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterFamily {
    Ashby,
    Greenhouse,
    Lever,
    Workday,
    Custom,
}

impl AdapterFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterFamily::Ashby => "ashby",
            AdapterFamily::Greenhouse => "greenhouse",
            AdapterFamily::Lever => "lever",
            AdapterFamily::Workday => "workday",
            AdapterFamily::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ashby" => Some(AdapterFamily::Ashby),
            "greenhouse" => Some(AdapterFamily::Greenhouse),
            "lever" => Some(AdapterFamily::Lever),
            "workday" => Some(AdapterFamily::Workday),
            "custom" => Some(AdapterFamily::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdapterFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which ingress path first created a job record. Set once at creation and
/// never overwritten by a later sighting from the other path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Crawler,
    Extension,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Crawler => "crawler",
            Provenance::Extension => "extension",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "crawler" => Some(Provenance::Crawler),
            "extension" => Some(Provenance::Extension),
            _ => None,
        }
    }
}

/// Employment type as reported by the ATS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    #[default]
    Unknown,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "full_time",
            JobType::PartTime => "part_time",
            JobType::Contract => "contract",
            JobType::Internship => "internship",
            JobType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "full_time" => JobType::FullTime,
            "part_time" => JobType::PartTime,
            "contract" => JobType::Contract,
            "internship" => JobType::Internship,
            _ => JobType::Unknown,
        }
    }
}

/// Per-user job annotation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Skipped,
    NotFit,
    NotUs,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::Skipped => "skipped",
            FlagKind::NotFit => "not_fit",
            FlagKind::NotUs => "not_us",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "skipped" => Some(FlagKind::Skipped),
            "not_fit" => Some(FlagKind::NotFit),
            "not_us" => Some(FlagKind::NotUs),
            _ => None,
        }
    }
}

/// State machine for a crawler run: started → completed | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// A crawlable origin, as stored in `job_sources`.
#[derive(Debug, Clone)]
pub struct JobSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub family: AdapterFamily,
    pub enabled: bool,
    /// Optional department filter applied by the orchestrator before upsert.
    pub target_departments: Option<Vec<String>>,
    /// Selector directives for the `custom` family, stored as JSON.
    pub selectors: Option<serde_json::Value>,
}

/// Raw posting produced by an adapter before ingestion.
///
/// Missing optional fields are `None`, never silently defaulted; the
/// ingestion engine rejects postings that lack title, company, or URL.
#[derive(Debug, Clone, Default)]
pub struct JobPosting {
    /// Stable id assigned by the ATS, when one exists.
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub department: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub job_type: JobType,
    pub url: Option<String>,
    pub posting_date: Option<DateTime<Utc>>,
}

/// Canonical job record as persisted in the `jobs` table.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: i64,
    pub source_id: i64,
    pub external_id: Option<String>,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub department: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub job_type: JobType,
    pub url: String,
    pub posting_date: Option<i64>,
    pub is_active: bool,
    pub provenance: Provenance,
    pub crawled_at: i64,
    pub last_updated: Option<i64>,
}
