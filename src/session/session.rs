use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::encoder::{args, EncoderEvent, EncoderProcess};

use super::config::{RecordingConfig, StreamPath};
use super::finalize;
use super::paths::RecordingPaths;
use super::status::{ProgressTracker, RecordingState, SessionEvent, SessionStatus};

/// The recording lifecycle of one live stream.
///
/// A session drives exactly one capture process through
/// `Capturing → (StoppingGraceful) → Finalizing → (Optimizing | Recovering)`
/// into a terminal state, and optionally owns the primary pass-through relay
/// whose exit signals end of source. All public operations are safe to call
/// concurrently; each is an idempotent no-op outside its valid state.
#[derive(Debug)]
pub struct RecordingSession {
    stream_path: StreamPath,
    config: RecordingConfig,

    state: RwLock<RecordingState>,
    paths: Mutex<Option<RecordingPaths>>,
    output_path: Mutex<Option<PathBuf>>,

    started_at: Mutex<Option<DateTime<Utc>>>,
    ended_at: Mutex<Option<DateTime<Utc>>>,

    graceful_stop: AtomicBool,
    stop_requested: AtomicBool,
    stop_tx: Mutex<Option<mpsc::Sender<String>>>,
    capture_task: Mutex<Option<JoinHandle<()>>>,

    relay_stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    relay_task: Mutex<Option<JoinHandle<()>>>,

    events: broadcast::Sender<SessionEvent>,
    progress: ProgressTracker,
}

impl RecordingSession {
    pub fn new(stream_path: StreamPath, config: RecordingConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        let progress = ProgressTracker::new(events.clone());

        Arc::new(Self {
            stream_path,
            config,
            state: RwLock::new(RecordingState::Idle),
            paths: Mutex::new(None),
            output_path: Mutex::new(None),
            started_at: Mutex::new(None),
            ended_at: Mutex::new(None),
            graceful_stop: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
            capture_task: Mutex::new(None),
            relay_stop_tx: Mutex::new(None),
            relay_task: Mutex::new(None),
            events,
            progress,
        })
    }

    pub fn stream_path(&self) -> &StreamPath {
        &self.stream_path
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Subscribe to lifecycle events. Updates are advisory and at-most-once;
    /// a lagging receiver drops intermediate updates.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> RecordingState {
        *self.state.read().await
    }

    /// Begin capturing. Returns `Ok(false)` if the session already left
    /// `Idle` (idempotent no-op); a spawn failure drives the session to
    /// `Failed` and is also returned to the caller.
    pub async fn start(self: &Arc<Self>) -> Result<bool> {
        {
            let mut state = self.state.write().await;
            if *state != RecordingState::Idle {
                debug!("recording already active for {}", self.stream_path);
                return Ok(false);
            }
            *state = RecordingState::Capturing;
        }

        match self.spawn_capture().await {
            Ok(()) => Ok(true),
            Err(e) => {
                self.finish(
                    RecordingState::Failed,
                    SessionEvent::Failed {
                        error: e.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn spawn_capture(self: &Arc<Self>) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create output directory {}",
                    self.config.output_dir.display()
                )
            })?;

        let now = Utc::now();
        let paths = RecordingPaths::new(
            self.config.output_dir.clone(),
            RecordingConfig::base_file_name(now),
        );
        let capture_args = args::capture_args(&self.config, &paths.temp());

        let mut encoder = EncoderProcess::spawn(&self.config.ffmpeg_path, &capture_args, "capture")
            .with_context(|| format!("failed to start capture for {}", self.stream_path))?;

        if let Some(mut rx) = encoder.take_output() {
            let progress = self.progress.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        EncoderEvent::Progress { seconds } => progress.update_seconds(seconds),
                        EncoderEvent::Log(line) => debug!("capture: {}", line),
                    }
                }
            });
        }

        let (stop_tx, stop_rx) = mpsc::channel(1);
        *self.stop_tx.lock().await = Some(stop_tx);
        *self.paths.lock().await = Some(paths.clone());
        *self.started_at.lock().await = Some(now);

        info!(
            "recording started for {}: {}",
            self.stream_path,
            paths.temp().display()
        );
        let _ = self.events.send(SessionEvent::Started {
            temp_path: paths.temp(),
            started_at: now,
        });

        let session = Arc::clone(self);
        let task = tokio::spawn(session.supervise(encoder, stop_rx));
        *self.capture_task.lock().await = Some(task);

        Ok(())
    }

    /// Request a graceful stop. Returns true if a stop was actually
    /// initiated, false when no capture is running or one is already
    /// stopping.
    pub async fn stop(&self, reason: &str) -> bool {
        if *self.state.read().await != RecordingState::Capturing {
            return false;
        }
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.graceful_stop.store(true, Ordering::SeqCst);

        let tx = self.stop_tx.lock().await.clone();
        match tx {
            Some(tx) => tx.send(reason.to_string()).await.is_ok(),
            None => false,
        }
    }

    /// The ingestion layer's end-of-source signal.
    pub async fn notify_source_ended(&self) {
        self.stop("stream_ended").await;
    }

    /// Unconditional teardown when the owning stream goes away: schedules
    /// relay shutdown and drives any active recording through its stop path.
    /// Returns without waiting for termination; the deadline tasks guarantee
    /// both processes are gone in bounded time.
    pub async fn end(&self) {
        info!("ending session for {}", self.stream_path);

        if let Some(tx) = self.relay_stop_tx.lock().await.take() {
            let _ = tx.try_send(());
        }

        self.stop("session_end").await;
    }

    /// Point-in-time snapshot; available in every state.
    pub async fn status(&self) -> SessionStatus {
        let paths = self.paths.lock().await.clone();

        SessionStatus {
            stream_path: self.stream_path.canonical(),
            state: *self.state.read().await,
            temp_path: paths.as_ref().map(|p| p.temp()),
            output_path: self.output_path.lock().await.clone(),
            duration_secs: self.progress.seconds(),
            started_at: *self.started_at.lock().await,
            ended_at: *self.ended_at.lock().await,
            graceful_stop: self.graceful_stop.load(Ordering::SeqCst),
            web_optimized: self.config.web_optimized,
        }
    }

    /// Block until the session reaches a terminal state.
    pub async fn wait_until_terminal(&self) {
        let mut rx = self.events.subscribe();
        loop {
            if self.state.read().await.is_terminal() {
                return;
            }
            match rx.recv().await {
                Ok(event) if event.is_terminal() => return,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Spawn the primary HLS pass-through relay, if configured. The relay's
    /// own exit is treated as end of source and stops an active recording.
    pub async fn start_relay(self: &Arc<Self>) -> Result<bool> {
        let Some(relay_cfg) = self.config.relay.clone() else {
            return Ok(false);
        };

        let mut task_guard = self.relay_task.lock().await;
        if task_guard.is_some() {
            return Ok(false);
        }

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .context("failed to create relay output directory")?;

        let relay_args = args::relay_args(
            &self.config.input_url,
            &relay_cfg.playlist_path,
            relay_cfg.hls_time,
            relay_cfg.hls_list_size,
        );
        let mut relay = EncoderProcess::spawn(&self.config.ffmpeg_path, &relay_args, "relay")
            .with_context(|| format!("failed to start relay for {}", self.stream_path))?;

        // Reader task drains the pipe even with no consumer attached.
        drop(relay.take_output());

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        *self.relay_stop_tx.lock().await = Some(stop_tx);

        let session = Arc::clone(self);
        let deadline = relay_cfg.stop_timeout;
        *task_guard = Some(tokio::spawn(async move {
            let source_ended = tokio::select! {
                status = relay.wait() => {
                    info!(
                        "relay for {} exited: code={:?}",
                        session.stream_path,
                        status.ok().and_then(|s| s.code())
                    );
                    true
                }
                _ = stop_rx.recv() => {
                    let _ = relay.stop_with_deadline(deadline).await;
                    false
                }
            };

            if source_ended {
                session.notify_source_ended().await;
            }
        }));

        info!("relay started for {}", self.stream_path);
        Ok(true)
    }

    async fn supervise(self: Arc<Self>, mut encoder: EncoderProcess, mut stop_rx: mpsc::Receiver<String>) {
        let exit = tokio::select! {
            status = encoder.wait() => status,
            reason = stop_rx.recv() => {
                let reason = reason.unwrap_or_else(|| "teardown".to_string());
                info!("stopping recording for {} ({})", self.stream_path, reason);
                self.set_state(RecordingState::StoppingGraceful).await;
                encoder.stop_with_deadline(self.config.stop_timeout).await
            }
        };

        let exit_code = match exit {
            Ok(status) => status.code(),
            Err(e) => {
                error!("failed to reap encoder for {}: {}", self.stream_path, e);
                None
            }
        };

        self.set_state(RecordingState::Finalizing).await;
        self.finalize_pipeline(exit_code).await;
    }

    async fn finalize_pipeline(&self, exit_code: Option<i32>) {
        let Some(paths) = self.paths.lock().await.clone() else {
            self.finish(
                RecordingState::Failed,
                SessionEvent::Failed {
                    error: "no capture paths recorded".to_string(),
                },
            )
            .await;
            return;
        };
        let graceful = self.graceful_stop.load(Ordering::SeqCst);

        let temp_size = match finalize::verify_temp(&paths).await {
            Ok(size) => size,
            Err(e) => {
                warn!(
                    "capture for {} produced no usable output: {}",
                    self.stream_path, e
                );
                paths.cleanup_side_files().await;
                self.finish(
                    RecordingState::Failed,
                    SessionEvent::Failed {
                        error: e.to_string(),
                    },
                )
                .await;
                return;
            }
        };

        info!(
            "finalizing capture for {}: {} bytes, code={:?}, graceful={}",
            self.stream_path, temp_size, exit_code, graceful
        );

        if graceful || exit_code == Some(0) {
            self.commit(&paths, temp_size).await;
        } else {
            self.recover(&paths).await;
        }
    }

    /// Clean exit: optimize when enabled (falling back to the raw capture on
    /// failure), then commit.
    async fn commit(&self, paths: &RecordingPaths, temp_size: u64) {
        let mut optimized = false;

        let committed = if self.config.web_optimized {
            self.set_state(RecordingState::Optimizing).await;
            match finalize::optimize_for_web(&self.config, paths, &self.progress).await {
                Ok(path) => {
                    optimized = true;
                    Ok(path)
                }
                Err(e) => {
                    warn!(
                        "optimization failed for {}, committing raw capture: {}",
                        self.stream_path, e
                    );
                    finalize::commit_raw(paths).await
                }
            }
        } else {
            finalize::commit_raw(paths).await
        };

        match committed {
            Ok(path) => {
                let size = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(temp_size);
                paths.cleanup_side_files().await;
                *self.output_path.lock().await = Some(path.clone());
                self.finish(
                    RecordingState::Finalized,
                    SessionEvent::Finalized {
                        path,
                        size,
                        duration_secs: self.progress.seconds(),
                        optimized,
                    },
                )
                .await;
            }
            Err(e) => {
                paths.cleanup_side_files().await;
                self.finish(
                    RecordingState::Failed,
                    SessionEvent::Failed {
                        error: e.to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// Dirty exit with captured data: ordered recovery, quarantine on
    /// exhaustion. The raw capture is never deleted on the quarantine path.
    async fn recover(&self, paths: &RecordingPaths) {
        self.set_state(RecordingState::Recovering).await;

        match finalize::attempt_recovery(&self.config, paths, &self.progress).await {
            Some((path, strategy)) => {
                paths.cleanup_side_files().await;
                *self.output_path.lock().await = Some(path.clone());
                self.finish(
                    RecordingState::Finalized,
                    SessionEvent::Recovered { path, strategy },
                )
                .await;
            }
            None => match finalize::quarantine(paths).await {
                Ok(quarantined) => {
                    paths.cleanup_side_files().await;
                    self.finish(
                        RecordingState::Corrupted,
                        SessionEvent::Corrupted { path: quarantined },
                    )
                    .await;
                }
                Err(e) => {
                    paths.cleanup_side_files().await;
                    self.finish(
                        RecordingState::Failed,
                        SessionEvent::Failed {
                            error: e.to_string(),
                        },
                    )
                    .await;
                }
            },
        }
    }

    async fn set_state(&self, next: RecordingState) {
        let mut state = self.state.write().await;
        debug!("session {}: {:?} -> {:?}", self.stream_path, *state, next);
        *state = next;
    }

    async fn finish(&self, state: RecordingState, event: SessionEvent) {
        self.set_state(state).await;
        *self.ended_at.lock().await = Some(Utc::now());
        *self.stop_tx.lock().await = None;

        match &state {
            RecordingState::Finalized => info!("session {} finalized", self.stream_path),
            RecordingState::Corrupted => warn!("session {} corrupted", self.stream_path),
            RecordingState::Failed => error!("session {} failed", self.stream_path),
            _ => {}
        }

        let _ = self.events.send(event);
    }
}
