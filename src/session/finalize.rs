//! Post-capture finalization: verification, web optimization, ordered
//! recovery, quarantine, and the short-lived subordinate processes that do
//! the work. Each helper runs sequentially inside the owning session's
//! supervising task; no two run concurrently for one session.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::encoder::{args, EncoderEvent, EncoderProcess, RECOVERY_STRATEGIES};

use super::config::RecordingConfig;
use super::paths::RecordingPaths;
use super::status::ProgressTracker;

/// An unusable capture. Both variants are unrecoverable: there is nothing
/// for the recovery strategies to operate on.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("captured file missing: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("captured file is empty: {}", .0.display())]
    EmptyOutput(PathBuf),
}

/// Check the captured temp file exists and is non-empty; returns its size.
pub async fn verify_temp(paths: &RecordingPaths) -> Result<u64, CaptureError> {
    let temp = paths.temp();
    let meta = match tokio::fs::metadata(&temp).await {
        Ok(meta) => meta,
        Err(_) => return Err(CaptureError::MissingOutput(temp)),
    };

    if meta.len() == 0 {
        return Err(CaptureError::EmptyOutput(temp));
    }

    Ok(meta.len())
}

/// Run one short-lived encoder pass to completion; true on exit code 0.
///
/// Progress markers in its output feed the session's duration tracker so
/// observers keep seeing updates during finalize phases.
async fn run_pass(
    executable: &str,
    pass_args: Vec<String>,
    label: &str,
    progress: &ProgressTracker,
) -> bool {
    let mut process = match EncoderProcess::spawn(executable, &pass_args, label) {
        Ok(p) => p,
        Err(e) => {
            error!("{}: {}", label, e);
            return false;
        }
    };

    if let Some(mut rx) = process.take_output() {
        let progress = progress.clone();
        let label = label.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    EncoderEvent::Progress { seconds } => progress.update_seconds(seconds),
                    EncoderEvent::Log(line) => debug!("{}: {}", label, line),
                }
            }
        });
    }

    match process.wait().await {
        Ok(status) => status.success(),
        Err(e) => {
            error!("{}: wait failed: {}", label, e);
            false
        }
    }
}

/// Single re-mux pass with web-friendly container flags, then an atomic move
/// of the optimized output into the final path and removal of the temp file.
pub async fn optimize_for_web(
    cfg: &RecordingConfig,
    paths: &RecordingPaths,
    progress: &ProgressTracker,
) -> Result<PathBuf> {
    let temp = paths.temp();
    let optimized = paths.optimized();
    let final_path = paths.final_path();

    info!("optimizing {} for web playback", temp.display());

    let ok = run_pass(
        &cfg.ffmpeg_path,
        args::optimize_args(&temp, &optimized),
        "optimize",
        progress,
    )
    .await;

    if !ok {
        bail!("optimization pass failed");
    }

    let meta = tokio::fs::metadata(&optimized)
        .await
        .context("optimized output missing")?;
    if meta.len() == 0 {
        bail!("optimized output is empty");
    }

    tokio::fs::rename(&optimized, &final_path)
        .await
        .with_context(|| format!("failed to move optimized file to {}", final_path.display()))?;

    if let Err(e) = tokio::fs::remove_file(&temp).await {
        warn!("failed to remove temp file {}: {}", temp.display(), e);
    }

    Ok(final_path)
}

/// Commit the raw capture directly: atomic rename of temp into final.
pub async fn commit_raw(paths: &RecordingPaths) -> Result<PathBuf> {
    let temp = paths.temp();
    let final_path = paths.final_path();

    tokio::fs::rename(&temp, &final_path)
        .await
        .with_context(|| format!("failed to move capture to {}", final_path.display()))?;

    Ok(final_path)
}

/// Try the ordered recovery strategies against the captured temp file, one
/// at a time, stopping at the first success.
///
/// Returns the committed final path and the 1-based index of the winning
/// strategy; `None` once every strategy is exhausted.
pub async fn attempt_recovery(
    cfg: &RecordingConfig,
    paths: &RecordingPaths,
    progress: &ProgressTracker,
) -> Option<(PathBuf, usize)> {
    let temp = paths.temp();

    for (i, strategy) in RECOVERY_STRATEGIES.iter().enumerate() {
        let attempt_path = paths.attempt(i);
        info!(
            "recovery attempt {}/{}: {}",
            i + 1,
            RECOVERY_STRATEGIES.len(),
            strategy.name
        );

        let ok = run_pass(
            &cfg.ffmpeg_path,
            args::recovery_args(strategy, &temp, &attempt_path),
            "recover",
            progress,
        )
        .await;

        let produced = match tokio::fs::metadata(&attempt_path).await {
            Ok(meta) => meta.len() > 0,
            Err(_) => false,
        };

        if !(ok && produced) {
            continue;
        }

        let final_path = paths.final_path();
        match tokio::fs::rename(&attempt_path, &final_path).await {
            Ok(()) => {
                info!(
                    "recovery succeeded (strategy {}): {}",
                    i + 1,
                    final_path.display()
                );
                return Some((final_path, i + 1));
            }
            Err(e) => {
                error!("failed to move recovered file: {}", e);
            }
        }
    }

    None
}

/// Rename the unrecoverable capture to its quarantine path. The original
/// bytes are preserved for manual inspection; nothing is deleted.
pub async fn quarantine(paths: &RecordingPaths) -> Result<PathBuf> {
    let temp = paths.temp();
    let quarantined = paths.quarantine();

    tokio::fs::rename(&temp, &quarantined)
        .await
        .with_context(|| format!("failed to quarantine {}", temp.display()))?;

    error!(
        "all recovery attempts failed, saved as: {}",
        quarantined.display()
    );

    Ok(quarantined)
}

/// Result of an ffprobe validation pass over a finalized file.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub detail: String,
}

/// Probe a finalized file for a decodable video stream. Advisory only; a
/// failed validation never changes session state.
pub async fn validate_file(ffprobe_path: &str, file: &Path) -> Result<ValidationReport> {
    if tokio::fs::metadata(file).await.is_err() {
        return Ok(ValidationReport {
            valid: false,
            detail: "file not found".to_string(),
        });
    }

    let output = tokio::process::Command::new(ffprobe_path)
        .args(args::probe_args(file))
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to launch {}", ffprobe_path))?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    let has_errors = stderr.contains("Invalid") || stderr.contains("error");

    Ok(ValidationReport {
        valid: output.status.success() && !has_errors && !stdout.is_empty(),
        detail: if stdout.is_empty() {
            stderr.trim().to_string()
        } else {
            stdout
        },
    })
}
