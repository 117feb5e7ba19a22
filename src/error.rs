//! Typed failures at the ingestion seam.
//!
//! Each variant is scoped per the failure taxonomy: a source, a single
//! posting, or a single archival candidate. Nothing here is fatal to the
//! process; the orchestrator converts source-level errors into failed
//! crawler runs and carries on with the next source.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Network or HTTP-level failure reaching a source.
    #[error("source unreachable: {0}")]
    SourceUnreachable(String),

    /// The source responded but its listing could not be parsed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A posting is missing a required field and was dropped. Carries enough
    /// context to diagnose adapter drift.
    #[error("posting from source {source_id} missing required field `{field}` ({raw_id})")]
    MissingField {
        source_id: i64,
        field: &'static str,
        raw_id: String,
    },

    /// A write tripped the identity uniqueness constraint outside the intended
    /// upsert path. Retryable: the caller re-attempts as an update.
    #[error("identity conflict while upserting {url}")]
    Conflict { url: String },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl IngestError {
    /// True for write races the upsert retries as an update.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Conflict { .. })
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        IngestError::SourceUnreachable(err.to_string())
    }
}
