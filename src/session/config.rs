use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Logical identifier for one live source, e.g. `live/cam1`.
///
/// The canonical form always carries a leading slash (`/live/cam1`); parsing
/// is tolerant of a missing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPath {
    app: String,
    name: String,
}

impl StreamPath {
    pub fn new(app: &str, name: &str) -> Self {
        Self {
            app: app.trim_matches('/').to_string(),
            name: name.trim_matches('/').to_string(),
        }
    }

    /// Parse `"app/name"` or `"/app/name"`; anything else is rejected.
    pub fn parse(path: &str) -> Option<Self> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let app = segments.next()?;
        let name = segments.next()?;
        if segments.next().is_some() {
            return None;
        }
        Some(Self::new(app, name))
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical registry key: `/app/name`.
    pub fn canonical(&self) -> String {
        format!("/{}/{}", self.app, self.name)
    }
}

impl fmt::Display for StreamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.app, self.name)
    }
}

/// Immutable configuration for a single recording session.
///
/// Created once when the stream attaches; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// URI-like locator for the live source (what ffmpeg reads)
    pub input_url: String,

    /// Directory all of this session's files land in
    pub output_dir: PathBuf,

    /// Path to the ffmpeg executable
    pub ffmpeg_path: String,

    /// Path to the ffprobe executable
    pub ffprobe_path: String,

    /// Run the web-optimization re-mux pass after capture
    pub web_optimized: bool,

    /// Fragment duration in microseconds for fragmented MP4 output
    pub frag_duration_us: u64,

    /// Minimum fragment duration in microseconds
    pub min_frag_duration_us: u64,

    /// Metadata title written into the output container
    pub title: String,

    /// Metadata encoder tag written into the output container
    pub encoder_tag: String,

    /// How long a graceful stop may run before the encoder is force-killed
    pub stop_timeout: Duration,

    /// Pass-through relay run next to the recording, if enabled
    pub relay: Option<RelayPassConfig>,
}

/// Configuration for the primary HLS pass-through relay.
#[derive(Debug, Clone)]
pub struct RelayPassConfig {
    pub playlist_path: PathBuf,
    pub hls_time: u32,
    pub hls_list_size: u32,
    pub stop_timeout: Duration,
}

impl RecordingConfig {
    /// Derive a session config from the service config for one stream.
    pub fn for_stream(cfg: &Config, stream: &StreamPath, input_url: &str) -> Self {
        let output_dir = PathBuf::from(&cfg.recording.media_root)
            .join(stream.app())
            .join(stream.name());

        let relay = cfg.relay.hls.then(|| RelayPassConfig {
            playlist_path: output_dir.join("index.m3u8"),
            hls_time: cfg.relay.hls_time,
            hls_list_size: cfg.relay.hls_list_size,
            stop_timeout: Duration::from_secs(cfg.relay.stop_timeout_secs),
        });

        Self {
            input_url: input_url.to_string(),
            output_dir,
            ffmpeg_path: cfg.recording.ffmpeg_path.clone(),
            ffprobe_path: cfg.recording.ffprobe_path.clone(),
            web_optimized: cfg.recording.web_optimized,
            frag_duration_us: cfg.recording.frag_duration_us,
            min_frag_duration_us: cfg.recording.min_frag_duration_us,
            title: stream.name().to_string(),
            encoder_tag: cfg.recording.encoder_tag.clone(),
            stop_timeout: Duration::from_secs(cfg.recording.stop_timeout_secs),
            relay,
        }
    }

    /// Timestamp-derived base file name, e.g. `2026-08-06-12-30-00.mp4`.
    pub fn base_file_name(at: DateTime<Utc>) -> String {
        format!("{}.mp4", at.format("%Y-%m-%d-%H-%M-%S"))
    }
}
