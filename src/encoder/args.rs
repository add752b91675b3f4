//! Argument construction for every ffmpeg/ffprobe invocation the pipeline
//! makes. Pure functions: no state, no I/O.

use std::path::Path;

use crate::session::RecordingConfig;

/// Arguments for the initial capture pass writing into the temp path.
pub fn capture_args(cfg: &RecordingConfig, temp_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        cfg.input_url.clone(),
        "-analyzeduration".to_string(),
        "1000000".to_string(),
        "-probesize".to_string(),
        "1000000".to_string(),
        // Copy both streams; the capture pass never re-encodes
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        // Fragmented MP4 survives an interrupted write
        "-movflags".to_string(),
        "frag_keyframe+empty_moov+default_base_moof+faststart".to_string(),
        "-frag_duration".to_string(),
        cfg.frag_duration_us.to_string(),
        "-min_frag_duration".to_string(),
        cfg.min_frag_duration_us.to_string(),
        "-reset_timestamps".to_string(),
        "1".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        "-brand".to_string(),
        "isom".to_string(),
        "-compatible_brands".to_string(),
        "isom,mp41,mp42".to_string(),
        "-metadata".to_string(),
        format!("title={}", cfg.title),
        "-metadata".to_string(),
        format!("encoder={}", cfg.encoder_tag),
    ];

    if cfg.web_optimized {
        args.push("-strict".to_string());
        args.push("experimental".to_string());
        args.push("-max_muxing_queue_size".to_string());
        args.push("1024".to_string());
    }

    args.push(temp_path.to_string_lossy().to_string());
    args
}

/// Arguments for the single web-optimization re-mux pass (same codecs).
pub fn optimize_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "faststart+frag_keyframe+empty_moov".to_string(),
        "-frag_duration".to_string(),
        "2000000".to_string(),
        "-brand".to_string(),
        "isom".to_string(),
        "-compatible_brands".to_string(),
        "isom,mp41,mp42,avc1".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// One recovery strategy: a label plus the codec/timestamp arguments placed
/// between `-i <input>` and the output path.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryStrategy {
    pub name: &'static str,
    codec_args: &'static [&'static str],
}

/// Ordered recovery strategies. The order is significant: cheapest and most
/// quality-preserving first, audio-dropping last resort at the end.
pub const RECOVERY_STRATEGIES: [RecoveryStrategy; 3] = [
    RecoveryStrategy {
        name: "stream-copy with timestamp regeneration",
        codec_args: &[
            "-c",
            "copy",
            "-avoid_negative_ts",
            "make_zero",
            "-fflags",
            "+genpts",
        ],
    },
    RecoveryStrategy {
        name: "full re-encode with timestamp correction",
        codec_args: &[
            "-c:v",
            "libx264",
            "-c:a",
            "aac",
            "-preset",
            "fast",
            "-avoid_negative_ts",
            "make_zero",
        ],
    },
    RecoveryStrategy {
        name: "stream-copy video only, audio dropped",
        codec_args: &["-c:v", "copy", "-an", "-avoid_negative_ts", "make_zero"],
    },
];

/// Arguments for one recovery attempt against the captured temp file.
pub fn recovery_args(strategy: &RecoveryStrategy, input: &Path, output: &Path) -> Vec<String> {
    let mut args = vec!["-i".to_string(), input.to_string_lossy().to_string()];
    args.extend(strategy.codec_args.iter().map(|s| s.to_string()));
    args.push(output.to_string_lossy().to_string());
    args
}

/// Arguments for the ffprobe validation pass over a finalized file.
pub fn probe_args(file: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "v:0".to_string(),
        "-show_entries".to_string(),
        "stream=codec_name,duration".to_string(),
        "-of".to_string(),
        "csv=p=0".to_string(),
        file.to_string_lossy().to_string(),
    ]
}

/// Arguments for the primary HLS pass-through relay.
pub fn relay_args(
    input_url: &str,
    playlist_path: &Path,
    hls_time: u32,
    hls_list_size: u32,
) -> Vec<String> {
    vec![
        "-i".to_string(),
        input_url.to_string(),
        "-analyzeduration".to_string(),
        "1000000".to_string(),
        "-probesize".to_string(),
        "1000000".to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        hls_time.to_string(),
        "-hls_list_size".to_string(),
        hls_list_size.to_string(),
        "-hls_flags".to_string(),
        "delete_segments".to_string(),
        playlist_path.to_string_lossy().to_string(),
    ]
}
