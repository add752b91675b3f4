//! Deterministic file naming for one recording session.
//!
//! Every file a session touches derives from a single timestamped base name
//! with a fixed set of prefixes, so cleanup can enumerate all side artifacts
//! without globbing.

use std::path::PathBuf;

use tracing::warn;

use crate::encoder::RECOVERY_STRATEGIES;

/// All paths belonging to one recording session.
#[derive(Debug, Clone)]
pub struct RecordingPaths {
    dir: PathBuf,
    base_name: String,
}

impl RecordingPaths {
    /// `base_name` is the timestamped final file name, e.g. `2026-08-06-12-30-00.mp4`.
    pub fn new(dir: PathBuf, base_name: String) -> Self {
        Self { dir, base_name }
    }

    /// In-progress write target; the only path the live encoder writes.
    pub fn temp(&self) -> PathBuf {
        self.dir.join(format!("recording_{}", self.base_name))
    }

    /// Destination on success.
    pub fn final_path(&self) -> PathBuf {
        self.dir.join(&self.base_name)
    }

    /// Side path for the web-optimization pass.
    pub fn optimized(&self) -> PathBuf {
        self.dir.join(format!("optimized_{}", self.base_name))
    }

    /// Side path reserved for recovered output.
    pub fn recovered(&self) -> PathBuf {
        self.dir.join(format!("recovered_{}", self.base_name))
    }

    /// Fresh output path for recovery attempt `n` (0-based).
    pub fn attempt(&self, n: usize) -> PathBuf {
        self.dir.join(format!("attempt{}_{}", n, self.base_name))
    }

    /// Quarantine name for an unrecoverable capture: `<stem>_corrupted.mp4`.
    pub fn quarantine(&self) -> PathBuf {
        let stem = self.base_name.strip_suffix(".mp4").unwrap_or(&self.base_name);
        self.dir.join(format!("{}_corrupted.mp4", stem))
    }

    /// Every side artifact this session may have produced. Excludes the
    /// final path and the quarantine path, which both survive the session.
    pub fn side_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.temp(), self.optimized(), self.recovered()];
        for n in 0..RECOVERY_STRATEGIES.len() {
            paths.push(self.attempt(n));
        }
        paths
    }

    /// Delete leftover side artifacts. Failures are logged and ignored; the
    /// session's terminal state is already decided by the time this runs.
    pub async fn cleanup_side_files(&self) {
        for path in self.side_paths() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("failed to clean up {}: {}", path.display(), e),
            }
        }
    }
}
