//! Operator-facing operations over the session registry.
//!
//! Everything here is stateless: each operation resolves sessions through
//! the registry and drives them through their public contract only. Errors
//! are typed so the HTTP/CLI layer can surface them verbatim.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Config;
use crate::registry::{DuplicateSessionError, SessionRegistry};
use crate::session::{RecordingConfig, RecordingSession, SessionEvent, SessionStatus, StreamPath};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no active session found for stream {0}")]
    NoSessionFound(String),

    #[error("recording already active for stream {0}")]
    AlreadyRecording(String),

    #[error("no active recording for stream {0}")]
    NotRecording(String),

    #[error("operation not supported for stream {0}: session already finished")]
    UnsupportedOperation(String),

    #[error(transparent)]
    Duplicate(#[from] DuplicateSessionError),

    #[error("failed to start recording for stream {stream_path}: {message}")]
    StartFailed { stream_path: String, message: String },

    #[error("invalid stream path: {0}")]
    InvalidStreamPath(String),
}

/// Create and register a session for a stream that just went live.
///
/// Spawns the registry-removal watcher, starts the pass-through relay when
/// configured, and begins capturing immediately if `record_on_publish` is
/// set.
pub async fn attach_stream(
    registry: &Arc<SessionRegistry>,
    cfg: &Config,
    stream: StreamPath,
    input_url: &str,
) -> Result<Arc<RecordingSession>, ControlError> {
    let recording_cfg = RecordingConfig::for_stream(cfg, &stream, input_url);
    let session = RecordingSession::new(stream.clone(), recording_cfg);

    // Subscribe before registering so no terminal event can slip past.
    let events = session.subscribe();
    registry.register(&stream.canonical(), Arc::clone(&session)).await?;
    spawn_removal_watcher(Arc::clone(registry), Arc::clone(&session), events);

    info!("attached stream {}", stream);

    if let Err(e) = session.start_relay().await {
        warn!("relay failed for {}: {}", stream, e);
    }

    if cfg.recording.record_on_publish {
        if let Err(e) = session.start().await {
            warn!("record-on-publish failed for {}: {}", stream, e);
        }
    }

    Ok(session)
}

/// Unconditional teardown when the owning stream disconnects or an operator
/// removes it.
pub async fn detach_stream(
    registry: &Arc<SessionRegistry>,
    path: &str,
) -> Result<(), ControlError> {
    let session = registry
        .lookup(path)
        .await
        .ok_or_else(|| ControlError::NoSessionFound(path.to_string()))?;

    session.end().await;
    registry
        .remove_session(&session.stream_path().canonical(), &session)
        .await;

    Ok(())
}

/// Start recording for one stream.
pub async fn start_for_stream(
    registry: &Arc<SessionRegistry>,
    path: &str,
) -> Result<SessionStatus, ControlError> {
    let session = registry
        .lookup(path)
        .await
        .ok_or_else(|| ControlError::NoSessionFound(path.to_string()))?;

    match session.start().await {
        Ok(true) => Ok(session.status().await),
        Ok(false) => {
            if session.state().await.is_terminal() {
                Err(ControlError::UnsupportedOperation(path.to_string()))
            } else {
                Err(ControlError::AlreadyRecording(path.to_string()))
            }
        }
        Err(e) => Err(ControlError::StartFailed {
            stream_path: path.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Stop recording for one stream.
pub async fn stop_for_stream(
    registry: &Arc<SessionRegistry>,
    path: &str,
    reason: &str,
) -> Result<SessionStatus, ControlError> {
    let session = registry
        .lookup(path)
        .await
        .ok_or_else(|| ControlError::NoSessionFound(path.to_string()))?;

    if session.stop(reason).await {
        Ok(session.status().await)
    } else {
        Err(ControlError::NotRecording(path.to_string()))
    }
}

/// Status snapshot for one stream.
pub async fn status_for_stream(
    registry: &Arc<SessionRegistry>,
    path: &str,
) -> Result<SessionStatus, ControlError> {
    let session = registry
        .lookup(path)
        .await
        .ok_or_else(|| ControlError::NoSessionFound(path.to_string()))?;

    Ok(session.status().await)
}

/// Status snapshots for every registered session.
pub async fn list_active(registry: &Arc<SessionRegistry>) -> Vec<(String, SessionStatus)> {
    registry.list().await
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    pub stream_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkSkip {
    pub stream_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub stream_path: String,
    pub error: String,
}

/// Per-item outcome of a bulk operation. Partial failure of one session
/// never aborts the rest of the batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<BulkItem>,
    pub skipped: Vec<BulkSkip>,
    pub errored: Vec<BulkFailure>,
}

/// Start recording on every registered session.
pub async fn start_all(registry: &Arc<SessionRegistry>) -> BulkReport {
    let mut report = BulkReport::default();

    for (stream_path, session) in registry.snapshot().await {
        let state = session.state().await;
        if state.is_terminal() {
            report.skipped.push(BulkSkip {
                stream_path,
                reason: "session already finished".to_string(),
            });
            continue;
        }

        match session.start().await {
            Ok(true) => report.succeeded.push(BulkItem { stream_path }),
            Ok(false) => report.skipped.push(BulkSkip {
                stream_path,
                reason: "already recording".to_string(),
            }),
            Err(e) => report.errored.push(BulkFailure {
                stream_path,
                error: e.to_string(),
            }),
        }
    }

    info!(
        "bulk start: {} started, {} skipped, {} errors",
        report.succeeded.len(),
        report.skipped.len(),
        report.errored.len()
    );
    report
}

/// Stop recording on every registered session.
pub async fn stop_all(registry: &Arc<SessionRegistry>, reason: &str) -> BulkReport {
    let entries = registry.snapshot().await;

    let outcomes = join_all(entries.iter().map(|(stream_path, session)| {
        let stream_path = stream_path.clone();
        async move { (stream_path, session.stop(reason).await) }
    }))
    .await;

    let mut report = BulkReport::default();
    for (stream_path, stopped) in outcomes {
        if stopped {
            report.succeeded.push(BulkItem { stream_path });
        } else {
            report.skipped.push(BulkSkip {
                stream_path,
                reason: "not recording".to_string(),
            });
        }
    }

    info!(
        "bulk stop: {} stopped, {} skipped",
        report.succeeded.len(),
        report.skipped.len()
    );
    report
}

/// Remove the session from the registry once it reaches a terminal state.
fn spawn_removal_watcher(
    registry: Arc<SessionRegistry>,
    session: Arc<RecordingSession>,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.is_terminal() => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Advisory updates may be lost; terminal detection falls
                    // back to the state itself.
                    if session.state().await.is_terminal() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }

        registry
            .remove_session(&session.stream_path().canonical(), &session)
            .await;
    });
}
