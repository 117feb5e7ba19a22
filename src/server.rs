//! HTTP API server.
//!
//! Exposes the pipeline over a JSON HTTP API for dashboard frontends and
//! the browser capture extension.
//!
//! # Endpoints
//!
//! | Method   | Path              | Description |
//! |----------|-------------------|-------------|
//! | `GET`    | `/health`         | Health check (returns version) |
//! | `GET`    | `/jobs`           | List jobs with filters |
//! | `POST`   | `/jobs/{id}/flag` | Set a per-user flag on a job |
//! | `DELETE` | `/jobs/{id}/flag` | Remove a per-user flag |
//! | `POST`   | `/capture-job`    | Ingest one posting from a browser page |
//! | `POST`   | `/crawl/trigger`  | Crawl all enabled sources (or one) |
//! | `GET`    | `/crawl/status`   | Recent crawler runs |
//! | `POST`   | `/archive`        | Run a retention pass |
//! | `GET`    | `/stats`          | Aggregate counts |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unknown age window: 3w" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `upstream` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the extension and
//! browser dashboards can call the API cross-origin.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::adapters::AdapterRegistry;
use crate::capture::{capture_job, CaptureRequest};
use crate::config::Config;
use crate::crawl::{self, CrawlScope};
use crate::db;
use crate::error::IngestError;
use crate::jobs::{self, JobFilter};
use crate::models::FlagKind;
use crate::retention;
use crate::stats;

/// Shared state for all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: sqlx::SqlitePool,
    registry: Arc<AdapterRegistry>,
}

/// Starts the HTTP server on `[server].bind` and serves until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    let registry = Arc::new(AdapterRegistry::with_builtins(&config.crawler)?);

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        registry,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/jobs", get(handle_list_jobs))
        .route("/jobs/{id}/flag", post(handle_flag).delete(handle_unflag))
        .route("/capture-job", post(handle_capture))
        .route("/crawl/trigger", post(handle_crawl_trigger))
        .route("/crawl/status", get(handle_crawl_status))
        .route("/archive", post(handle_archive))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(state);

    println!("server listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("no source with id") || msg.contains("no job with id") {
            not_found(msg)
        } else {
            internal(msg)
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::MissingField { .. } | IngestError::Extraction(_) => bad_request(message),
            IngestError::SourceUnreachable(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "upstream".to_string(),
                message,
            },
            IngestError::Conflict { .. } => AppError {
                status: StatusCode::CONFLICT,
                code: "conflict".to_string(),
                message,
            },
            IngestError::Db(_) => internal(message),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /jobs ============

#[derive(Deserialize)]
struct JobsQuery {
    user_id: Option<String>,
    source_id: Option<i64>,
    search: Option<String>,
    #[serde(default)]
    include_inactive: bool,
    flagged: Option<bool>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct JobsResponse {
    jobs: Vec<jobs::JobListing>,
}

async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<JobsResponse>, AppError> {
    let filter = JobFilter {
        source_id: query.source_id,
        active_only: !query.include_inactive,
        search: query.search,
        flagged: query.flagged,
        limit: query.limit,
    };
    let user_id = query.user_id.as_deref().unwrap_or("default");
    let listings = jobs::list_jobs(&state.pool, user_id, &filter).await?;
    Ok(Json(JobsResponse { jobs: listings }))
}

// ============ POST / DELETE /jobs/{id}/flag ============

#[derive(Deserialize)]
struct FlagRequest {
    user_id: Option<String>,
    kind: String,
    reason: Option<String>,
}

async fn handle_flag(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Json(request): Json<FlagRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let kind = FlagKind::parse(&request.kind)
        .ok_or_else(|| bad_request(format!("unknown flag kind: {}", request.kind)))?;
    let user_id = request.user_id.as_deref().unwrap_or("default");
    jobs::flag_job(&state.pool, user_id, job_id, kind, request.reason.as_deref()).await?;
    Ok(Json(serde_json::json!({ "flagged": true })))
}

#[derive(Deserialize)]
struct UnflagQuery {
    user_id: Option<String>,
}

async fn handle_unflag(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Query(query): Query<UnflagQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = query.user_id.as_deref().unwrap_or("default");
    let removed = jobs::unflag_job(&state.pool, user_id, job_id).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

// ============ POST /capture-job ============

async fn handle_capture(
    State(state): State<AppState>,
    Json(request): Json<CaptureRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if request.url.trim().is_empty() {
        return Err(bad_request("url must not be empty"));
    }
    let result = capture_job(&state.pool, &request).await?;
    Ok(Json(serde_json::json!({ "capture": result })))
}

// ============ POST /crawl/trigger ============

#[derive(Deserialize, Default)]
struct CrawlTriggerRequest {
    source_id: Option<i64>,
    max_age_days: Option<u32>,
    age_window: Option<String>,
}

/// Parses dashboard-style age windows (`24h`, `7d`, `30d`) into days.
fn parse_age_window(window: &str) -> Option<u32> {
    match window {
        "24h" => Some(1),
        "7d" => Some(7),
        "30d" => Some(30),
        _ => None,
    }
}

async fn handle_crawl_trigger(
    State(state): State<AppState>,
    body: Option<Json<CrawlTriggerRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let max_age_days = match (&request.age_window, request.max_age_days) {
        (Some(window), _) => Some(
            parse_age_window(window)
                .ok_or_else(|| bad_request(format!("unknown age window: {window}")))?,
        ),
        (None, Some(days)) => Some(days),
        (None, None) => state.config.crawler.max_age_days,
    };

    let scope = match request.source_id {
        Some(id) => CrawlScope::Source(id),
        None => CrawlScope::AllEnabled,
    };

    let outcomes = crawl::crawl(
        &state.pool,
        &state.registry,
        &state.config.crawler,
        scope,
        max_age_days,
    )
    .await?;

    Ok(Json(serde_json::json!({ "results": outcomes })))
}

// ============ GET /crawl/status ============

#[derive(Deserialize)]
struct StatusQuery {
    limit: Option<i64>,
}

async fn handle_crawl_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let runs = crawl::recent_runs(&state.pool, query.limit.unwrap_or(20)).await?;
    Ok(Json(serde_json::json!({ "runs": runs })))
}

// ============ POST /archive ============

#[derive(Deserialize, Default)]
struct ArchiveRequest {
    days: Option<u32>,
    #[serde(default)]
    dry_run: bool,
}

async fn handle_archive(
    State(state): State<AppState>,
    body: Option<Json<ArchiveRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let days = request.days.unwrap_or(state.config.retention.days);
    if days == 0 {
        return Err(bad_request("days must be at least 1"));
    }
    let summary = retention::archive_old_jobs(&state.pool, days, request.dry_run).await?;
    Ok(Json(serde_json::json!({ "archive": summary })))
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<stats::Stats>, AppError> {
    let stats = stats::collect_stats(&state.pool).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::parse_age_window;

    #[test]
    fn age_windows_map_to_days() {
        assert_eq!(parse_age_window("24h"), Some(1));
        assert_eq!(parse_age_window("7d"), Some(7));
        assert_eq!(parse_age_window("30d"), Some(30));
        assert_eq!(parse_age_window("3w"), None);
    }
}
