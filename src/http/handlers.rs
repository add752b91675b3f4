use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::control::{self, ControlError};
use crate::session::{finalize, StreamPath};

use super::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AttachStreamRequest {
    /// Application segment (defaults to "live")
    pub app: Option<String>,

    /// Stream name (if not provided, generate one)
    pub name: Option<String>,

    /// URI-like locator ffmpeg reads the live source from
    pub input_url: String,
}

#[derive(Debug, Serialize)]
pub struct AttachStreamResponse {
    pub stream_path: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_status(err: &ControlError) -> StatusCode {
    match err {
        ControlError::NoSessionFound(_) => StatusCode::NOT_FOUND,
        ControlError::AlreadyRecording(_)
        | ControlError::NotRecording(_)
        | ControlError::UnsupportedOperation(_)
        | ControlError::Duplicate(_) => StatusCode::CONFLICT,
        ControlError::InvalidStreamPath(_) => StatusCode::BAD_REQUEST,
        ControlError::StartFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ControlError) -> axum::response::Response {
    error!("{}", err);
    (
        error_status(&err),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /streams
/// Attach a live stream: create and register its recording session
pub async fn attach_stream(
    State(state): State<AppState>,
    Json(req): Json<AttachStreamRequest>,
) -> impl IntoResponse {
    let app = req.app.unwrap_or_else(|| "live".to_string());
    let name = req
        .name
        .unwrap_or_else(|| format!("stream-{}", uuid::Uuid::new_v4()));

    if app.trim_matches('/').is_empty() || name.trim_matches('/').is_empty() {
        return error_response(ControlError::InvalidStreamPath(format!("{}/{}", app, name)));
    }
    let stream = StreamPath::new(&app, &name);

    info!("attaching stream: {}", stream);

    match control::attach_stream(&state.registry, &state.config, stream.clone(), &req.input_url)
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(AttachStreamResponse {
                stream_path: stream.canonical(),
                message: format!("Stream {} attached", stream),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /streams/:app/:name
/// Tear down a stream and its recording session
pub async fn detach_stream(
    State(state): State<AppState>,
    Path((app, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let path = StreamPath::new(&app, &name).canonical();

    match control::detach_stream(&state.registry, &path).await {
        Ok(()) => (
            StatusCode::OK,
            Json(AttachStreamResponse {
                stream_path: path.clone(),
                message: format!("Stream {} detached", path),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /streams
/// List every registered session with its status snapshot
pub async fn list_streams(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = control::list_active(&state.registry).await;
    let statuses: Vec<_> = sessions.into_iter().map(|(_, status)| status).collect();
    (StatusCode::OK, Json(statuses)).into_response()
}

/// POST /streams/:app/:name/record/start
pub async fn start_recording(
    State(state): State<AppState>,
    Path((app, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let path = StreamPath::new(&app, &name).canonical();
    info!("starting recording for stream: {}", path);

    match control::start_for_stream(&state.registry, &path).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /streams/:app/:name/record/stop
pub async fn stop_recording(
    State(state): State<AppState>,
    Path((app, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let path = StreamPath::new(&app, &name).canonical();
    info!("stopping recording for stream: {}", path);

    match control::stop_for_stream(&state.registry, &path, "manual").await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /streams/:app/:name/record/status
pub async fn recording_status(
    State(state): State<AppState>,
    Path((app, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let path = StreamPath::new(&app, &name).canonical();

    match control::status_for_stream(&state.registry, &path).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /streams/:app/:name/record/validate
/// Probe the finalized file for a decodable video stream (advisory)
pub async fn validate_recording(
    State(state): State<AppState>,
    Path((app, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let path = StreamPath::new(&app, &name).canonical();

    let session = match state.registry.lookup(&path).await {
        Some(s) => s,
        None => return error_response(ControlError::NoSessionFound(path)),
    };

    let status = session.status().await;
    let Some(output_path) = status.output_path else {
        return error_response(ControlError::NotRecording(path));
    };

    match finalize::validate_file(&session.config().ffprobe_path, &output_path).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!("validation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("validation failed: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /record/start-all
pub async fn start_all(State(state): State<AppState>) -> impl IntoResponse {
    let report = control::start_all(&state.registry).await;
    (StatusCode::OK, Json(report)).into_response()
}

/// POST /record/stop-all
pub async fn stop_all(State(state): State<AppState>) -> impl IntoResponse {
    let report = control::stop_all(&state.registry, "manual").await;
    (StatusCode::OK, Json(report)).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
