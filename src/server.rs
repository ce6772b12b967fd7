//! HTTP surface: `GET /health`, `GET /api/analyze`, `POST /api/loop`.
//!
//! Pipeline runs are blocking and go to tokio's blocking pool; each one owns
//! its own workspace, so concurrent requests never share files.

use crate::{
    core::timing::BeatAnalyzer,
    error::{ErrorKind, MaestroError},
    io::{ffmpeg::Transcoder, ytdlp::MediaSource},
    pipeline::Pipeline,
    types::{Limits, LoopOutcome, LoopSpec, Request, TimingResult},
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tower_http::cors::CorsLayer;
use tracing::error;

/// Error response body: `{"error": {"code", "message"}}`.
pub struct ApiError(MaestroError);

impl From<MaestroError> for ApiError {
    fn from(e: MaestroError) -> Self {
        ApiError(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError(MaestroError::policy(format!("Invalid query: {}", e.body_text())))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError(MaestroError::policy(format!("Invalid body: {}", e.body_text())))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::PolicyViolation | ErrorKind::InvalidParameter => StatusCode::BAD_REQUEST,
            ErrorKind::SourceTooLarge | ErrorKind::SourceTooLong => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::AcquisitionFailed => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorKind::ExternalToolError | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Internal errors can carry paths; keep those in the log only.
        let message = match kind {
            ErrorKind::Internal => {
                error!(error = %self.0, "internal error");
                "Processing error".to_string()
            }
            _ => self.0.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": kind.as_str(),
                "message": message,
            }
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub struct AppState<S, T, A> {
    pipeline: Arc<Pipeline<S, T, A>>,
    output_dir: PathBuf,
}

impl<S, T, A> Clone for AppState<S, T, A> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            output_dir: self.output_dir.clone(),
        }
    }
}

impl<S, T, A> AppState<S, T, A> {
    /// Loop outputs are written under `output_dir`, never at a
    /// caller-chosen path.
    pub fn new(pipeline: Pipeline<S, T, A>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            output_dir: output_dir.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub limits: Limits,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct LoopBody {
    pub url: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default = "default_end")]
    pub end: f64,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_repeats")]
    pub repeats: u32,
    #[serde(default)]
    pub format: LoopFormat,
    pub max_source_sec: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopFormat {
    #[default]
    Wav,
    Mp3,
}

fn default_end() -> f64 {
    15.0
}

fn default_speed() -> f64 {
    0.7
}

fn default_repeats() -> u32 {
    5
}

pub fn build_router<S, T, A>(state: AppState<S, T, A>) -> Router
where
    S: MediaSource + 'static,
    T: Transcoder + 'static,
    A: BeatAnalyzer + 'static,
{
    Router::new()
        .route("/health", get(health::<S, T, A>))
        .route("/api/analyze", get(analyze::<S, T, A>))
        .route("/api/loop", post(make_loop::<S, T, A>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health<S, T, A>(State(state): State<AppState<S, T, A>>) -> Json<HealthResponse>
where
    S: MediaSource + 'static,
    T: Transcoder + 'static,
    A: BeatAnalyzer + 'static,
{
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        limits: state.pipeline.limits().clone(),
    })
}

async fn analyze<S, T, A>(
    State(state): State<AppState<S, T, A>>,
    query: Result<Query<AnalyzeQuery>, QueryRejection>,
) -> ApiResult<Json<TimingResult>>
where
    S: MediaSource + 'static,
    T: Transcoder + 'static,
    A: BeatAnalyzer + 'static,
{
    let Query(q) = query?;
    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.analyze(Request::analyze(q.url)))
        .await
        .map_err(|e| MaestroError::from(anyhow::anyhow!("analysis task failed: {e}")))??;
    Ok(Json(result))
}

async fn make_loop<S, T, A>(
    State(state): State<AppState<S, T, A>>,
    body: Result<Json<LoopBody>, JsonRejection>,
) -> ApiResult<Json<LoopOutcome>>
where
    S: MediaSource + 'static,
    T: Transcoder + 'static,
    A: BeatAnalyzer + 'static,
{
    let Json(body) = body?;
    let ext = match body.format {
        LoopFormat::Wav => "wav",
        LoopFormat::Mp3 => "mp3",
    };
    let name = format!("loop-{}.{ext}", uuid::Uuid::new_v4().simple());
    let mut req = Request::looped(
        body.url,
        LoopSpec {
            start_sec: body.start,
            end_sec: body.end,
            speed: body.speed,
            repeats: body.repeats,
            output: state.output_dir.join(name),
        },
    );
    req.max_source_sec = body.max_source_sec;

    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.make_loop(req))
        .await
        .map_err(|e| MaestroError::from(anyhow::anyhow!("loop task failed: {e}")))??;
    Ok(Json(result))
}
