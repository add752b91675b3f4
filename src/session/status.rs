use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle state of a recording session.
///
/// Transitions only move forward through the pipeline; `Finalized`,
/// `Corrupted` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Capturing,
    StoppingGraceful,
    Finalizing,
    Optimizing,
    Recovering,
    Finalized,
    Corrupted,
    Failed,
}

impl RecordingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Corrupted | Self::Failed)
    }

    /// Whether the capture process is (or may still be) running.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Capturing | Self::StoppingGraceful)
    }
}

/// Point-in-time snapshot of a session. Always available, even pre-start.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub stream_path: String,
    pub state: RecordingState,
    pub temp_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub duration_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub graceful_stop: bool,
    pub web_optimized: bool,
}

/// Lifecycle events fanned out to session observers.
///
/// Delivery is at-most-once per update with no back-pressure; a lagging
/// observer loses intermediate updates, never the session state itself.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started {
        temp_path: PathBuf,
        started_at: DateTime<Utc>,
    },
    Progress {
        duration_secs: f64,
    },
    Finalized {
        path: PathBuf,
        size: u64,
        duration_secs: f64,
        optimized: bool,
    },
    Recovered {
        path: PathBuf,
        strategy: usize,
    },
    Corrupted {
        path: PathBuf,
    },
    Failed {
        error: String,
    },
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finalized { .. } | Self::Recovered { .. } | Self::Corrupted { .. } | Self::Failed { .. }
        )
    }
}

/// Shared progress sink: latest observed encoder duration plus fire-and-forget
/// notification of observers. Cheap to clone into finalize-phase helpers.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    duration_ms: Arc<AtomicU64>,
    events: broadcast::Sender<SessionEvent>,
}

impl ProgressTracker {
    pub fn new(events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            duration_ms: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    pub fn update_seconds(&self, seconds: f64) {
        self.duration_ms
            .store((seconds * 1000.0) as u64, Ordering::Relaxed);
        let _ = self.events.send(SessionEvent::Progress {
            duration_secs: seconds,
        });
    }

    pub fn seconds(&self) -> f64 {
        self.duration_ms.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_serialize_snake_case() {
        let json = serde_json::to_string(&RecordingState::StoppingGraceful).unwrap();
        assert_eq!(json, "\"stopping_graceful\"");
    }

    #[test]
    fn terminal_states_are_exactly_three() {
        assert!(RecordingState::Finalized.is_terminal());
        assert!(RecordingState::Corrupted.is_terminal());
        assert!(RecordingState::Failed.is_terminal());
        assert!(!RecordingState::Finalizing.is_terminal());
        assert!(!RecordingState::Optimizing.is_terminal());
        assert!(!RecordingState::Recovering.is_terminal());
    }

    #[test]
    fn progress_tracker_keeps_latest_value() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(8);
        let tracker = ProgressTracker::new(tx);

        tracker.update_seconds(1.5);
        tracker.update_seconds(3.0);
        assert!((tracker.seconds() - 3.0).abs() < f64::EPSILON);

        assert!(matches!(
            rx.try_recv(),
            Ok(SessionEvent::Progress { duration_secs }) if duration_secs == 1.5
        ));
    }
}
