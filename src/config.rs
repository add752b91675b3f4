use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub recording: RecordingSettings,
    pub relay: RelaySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Settings for the capture/finalize pipeline shared by every session.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingSettings {
    /// Root directory for recordings; each stream gets `<media_root>/<app>/<name>/`
    pub media_root: String,

    /// Path to the ffmpeg executable
    pub ffmpeg_path: String,

    /// Path to the ffprobe executable (finalized-file validation)
    pub ffprobe_path: String,

    /// Re-mux finalized files with web-friendly container flags
    #[serde(default = "default_true")]
    pub web_optimized: bool,

    /// Fragment duration in microseconds for fragmented MP4 output
    #[serde(default = "default_frag_duration")]
    pub frag_duration_us: u64,

    /// Minimum fragment duration in microseconds
    #[serde(default = "default_min_frag_duration")]
    pub min_frag_duration_us: u64,

    /// Seconds to wait after a graceful stop before force-killing the encoder
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Encoder tag written into output metadata
    #[serde(default = "default_encoder_tag")]
    pub encoder_tag: String,

    /// Begin capturing as soon as a stream attaches
    #[serde(default)]
    pub record_on_publish: bool,
}

/// Settings for the primary pass-through relay that mirrors the live source.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    /// Run an HLS pass-through relay next to each recording
    #[serde(default)]
    pub hls: bool,

    /// HLS segment duration in seconds
    #[serde(default = "default_hls_time")]
    pub hls_time: u32,

    /// Number of segments kept in the live playlist
    #[serde(default = "default_hls_list_size")]
    pub hls_list_size: u32,

    /// Seconds to wait before force-killing the relay on teardown
    #[serde(default = "default_relay_stop_timeout")]
    pub stop_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_frag_duration() -> u64 {
    2_000_000
}

fn default_min_frag_duration() -> u64 {
    1_000_000
}

fn default_stop_timeout() -> u64 {
    15
}

fn default_encoder_tag() -> String {
    "streamvault".to_string()
}

fn default_hls_time() -> u32 {
    10
}

fn default_hls_list_size() -> u32 {
    6
}

fn default_relay_stop_timeout() -> u64 {
    5
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
