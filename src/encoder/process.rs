//! Supervision of a single external encoder process.
//!
//! Owns one `tokio::process::Child`: spawn, stderr observation, graceful
//! stop (SIGTERM) and idempotent force-kill. Each instance produces exactly
//! one terminal outcome, either an exit status or a spawn failure.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch {executable}: {source}")]
    Launch {
        executable: String,
        #[source]
        source: std::io::Error,
    },
}

/// Observable output of a running encoder process.
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    /// Most recent elapsed-duration marker parsed from a progress line
    Progress { seconds: f64 },
    /// Any other diagnostic line; advisory only
    Log(String),
}

pub struct EncoderProcess {
    child: Child,
    executable: String,
    label: String,
}

impl EncoderProcess {
    /// Spawn the executable with stderr piped for observation.
    pub fn spawn(executable: &str, args: &[String], label: &str) -> Result<Self, SpawnError> {
        debug!("{}: spawning {} {}", label, executable, args.join(" "));

        let child = Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Launch {
                executable: executable.to_string(),
                source,
            })?;

        Ok(Self {
            child,
            executable: executable.to_string(),
            label: label.to_string(),
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Take the diagnostic stream as a channel of [`EncoderEvent`]s.
    ///
    /// The stream runs until process exit and is not restartable; the second
    /// call returns `None`.
    pub fn take_output(&mut self) -> Option<mpsc::Receiver<EncoderEvent>> {
        let stderr = self.child.stderr.take()?;
        let label = self.label.clone();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let event = match parse_progress_seconds(&line) {
                    Some(seconds) => EncoderEvent::Progress { seconds },
                    None => EncoderEvent::Log(line),
                };
                // Receiver gone means nobody is observing; keep draining so
                // the pipe never fills up and blocks the encoder.
                let _ = tx.send(event).await;
            }
            debug!("{}: diagnostic stream ended", label);
        });

        Some(rx)
    }

    /// Send a cooperative termination signal. Non-blocking.
    #[cfg(unix)]
    pub fn request_graceful_stop(&self) {
        if let Some(pid) = self.child.id() {
            debug!("{}: sending SIGTERM to pid {}", self.label, pid);
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }
    }

    #[cfg(not(unix))]
    pub fn request_graceful_stop(&self) {
        // No cooperative signal available; degrade to a hard kill.
        warn!("{}: graceful stop unsupported on this platform", self.label);
    }

    /// Unconditional kill. Non-blocking and safe to call after exit.
    pub fn force_stop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("{}: kill after exit ignored: {}", self.label, e);
        }
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Graceful stop with a hard deadline: signal, wait up to `deadline`,
    /// then force-kill and reap. Guarantees the process is gone on return.
    pub async fn stop_with_deadline(&mut self, deadline: Duration) -> std::io::Result<ExitStatus> {
        self.request_graceful_stop();

        match timeout(deadline, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    "{}: {} unresponsive after {:?}, force killing",
                    self.label, self.executable, deadline
                );
                self.force_stop();
                self.child.wait().await
            }
        }
    }
}

/// Extract the elapsed duration from an ffmpeg progress line.
///
/// Looks for `time=HH:MM:SS.cc`; returns seconds. Lines without the marker
/// (or with `time=N/A`) yield `None`.
pub fn parse_progress_seconds(line: &str) -> Option<f64> {
    let idx = line.find("time=")?;
    let token: String = line[idx + 5..]
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();

    let mut parts = token.splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
