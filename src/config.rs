use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    /// Per-source fetch timeout. A hung adapter call must not stall sibling
    /// sources, so the orchestrator cancels the fetch at this bound.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Default crawl-time age filter in days; postings older than this are
    /// dropped before ingestion. `None` ingests regardless of age.
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            max_age_days: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    /// Jobs whose last sighting is older than this many days (and which have
    /// no application) are moved into the archive table.
    #[serde(default = "default_retention_days")]
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.crawler.timeout_secs == 0 {
        anyhow::bail!("crawler.timeout_secs must be > 0");
    }

    if config.retention.days == 0 {
        anyhow::bail!("retention.days must be >= 1");
    }

    if let Some(days) = config.crawler.max_age_days {
        if days == 0 {
            anyhow::bail!("crawler.max_age_days must be >= 1 when set");
        }
    }

    Ok(config)
}
