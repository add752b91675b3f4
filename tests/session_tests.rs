// Integration tests for the recording session state machine.
//
// The external encoder is stood in for by small shell scripts so the full
// capture -> finalize pipeline runs without ffmpeg: the scripts take the
// same argument lists, write (or refuse to write) their last argument, and
// exit with a chosen code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use streamvault::session::{RecordingConfig, RecordingSession, StreamPath};
use streamvault::{RecordingState, SessionEvent};
use tempfile::TempDir;
use tokio::time::timeout;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\nfor out; do :; done\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn session_config(output_dir: &Path, encoder: &Path, web_optimized: bool) -> RecordingConfig {
    RecordingConfig {
        input_url: "rtmp://127.0.0.1:1935/live/cam1".to_string(),
        output_dir: output_dir.to_path_buf(),
        ffmpeg_path: encoder.to_string_lossy().to_string(),
        ffprobe_path: "ffprobe".to_string(),
        web_optimized,
        frag_duration_us: 2_000_000,
        min_frag_duration_us: 1_000_000,
        title: "cam1".to_string(),
        encoder_tag: "streamvault".to_string(),
        stop_timeout: Duration::from_secs(5),
        relay: None,
    }
}

async fn wait_terminal(session: &RecordingSession) {
    timeout(Duration::from_secs(15), session.wait_until_terminal())
        .await
        .expect("session should reach a terminal state in bounded time");
}

/// Wait until the capture script has written the temp file, so stop signals
/// land after its trap handler is installed.
async fn wait_for_temp(session: &RecordingSession) {
    timeout(Duration::from_secs(5), async {
        loop {
            let status = session.status().await;
            if let Some(temp) = &status.temp_path {
                if temp.exists() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("capture should create its temp file");
}

fn collect_events(mut rx: tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn clean_exit_with_optimization_finalizes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");

    // Capture and optimize passes both just produce their output and exit 0
    let encoder = write_script(temp_dir.path(), "encoder.sh", "printf 'captured-bytes' > \"$out\"");

    let session = RecordingSession::new(
        StreamPath::new("live", "cam1"),
        session_config(&media, &encoder, true),
    );
    let events = session.subscribe();

    assert!(session.start().await?);
    wait_terminal(&session).await;

    let status = session.status().await;
    assert_eq!(status.state, RecordingState::Finalized);

    let output = status.output_path.expect("final path should be set");
    assert!(output.exists(), "final file should exist");
    assert!(std::fs::metadata(&output)?.len() > 0, "final file should be non-empty");

    let temp = status.temp_path.expect("temp path recorded");
    assert!(!temp.exists(), "temp file should be gone after finalize");

    let events = collect_events(events);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Started { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Finalized { optimized: true, .. })));

    Ok(())
}

#[tokio::test]
async fn failed_optimization_falls_back_to_raw_capture() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");

    // Capture succeeds; the optimize pass (recognized by its movflags value)
    // exits non-zero without producing output
    let encoder = write_script(
        temp_dir.path(),
        "encoder.sh",
        r#"case "$*" in
  *faststart+frag_keyframe*) exit 1;;
  *) printf 'captured-bytes' > "$out";;
esac"#,
    );

    let session = RecordingSession::new(
        StreamPath::new("live", "cam1"),
        session_config(&media, &encoder, true),
    );
    let events = session.subscribe();

    assert!(session.start().await?);
    wait_terminal(&session).await;

    let status = session.status().await;
    assert_eq!(status.state, RecordingState::Finalized);

    let output = status.output_path.expect("final path should be set");
    assert_eq!(std::fs::read_to_string(&output)?, "captured-bytes");

    let events = collect_events(events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Finalized { optimized: false, .. })));

    Ok(())
}

#[tokio::test]
async fn empty_capture_fails_without_recovery() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");
    let markers = temp_dir.path().join("invocations.log");

    // Every invocation is logged; the capture pass writes nothing and dies
    let encoder = write_script(
        temp_dir.path(),
        "encoder.sh",
        &format!("echo \"$*\" >> {}\nexit 1", markers.display()),
    );

    let session = RecordingSession::new(
        StreamPath::new("live", "cam1"),
        session_config(&media, &encoder, true),
    );

    assert!(session.start().await?);
    wait_terminal(&session).await;

    let status = session.status().await;
    assert_eq!(status.state, RecordingState::Failed);
    assert!(status.output_path.is_none());

    // Only the capture pass ran; no recovery strategy was attempted
    let invocations = std::fs::read_to_string(&markers)?;
    assert_eq!(invocations.lines().count(), 1);

    Ok(())
}

#[tokio::test]
async fn recovery_tries_strategies_in_order_and_stops_at_first_success() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");
    let markers = temp_dir.path().join("invocations.log");

    // Capture produces data but exits dirty; only the re-encode strategy
    // (strategy 2, recognized by libx264) can repair the file
    let encoder = write_script(
        temp_dir.path(),
        "encoder.sh",
        &format!(
            r#"echo "$*" >> {}
case "$*" in
  *frag_keyframe*) printf 'captured-bytes' > "$out"; exit 3;;
  *libx264*) printf 'recovered-bytes' > "$out"; exit 0;;
  *) exit 1;;
esac"#,
            markers.display()
        ),
    );

    let session = RecordingSession::new(
        StreamPath::new("live", "cam1"),
        session_config(&media, &encoder, false),
    );
    let events = session.subscribe();

    assert!(session.start().await?);
    wait_terminal(&session).await;

    let status = session.status().await;
    assert_eq!(status.state, RecordingState::Finalized);

    let output = status.output_path.expect("final path should be set");
    assert_eq!(std::fs::read_to_string(&output)?, "recovered-bytes");

    let temp = status.temp_path.expect("temp path recorded");
    assert!(!temp.exists(), "temp file cleaned up after recovery");

    let events = collect_events(events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Recovered { strategy: 2, .. })));

    // Capture, strategy 1, strategy 2 — strategy 3 never runs
    let invocations = std::fs::read_to_string(&markers)?;
    assert_eq!(invocations.lines().count(), 3);
    assert!(!invocations.contains(" -an "), "audio-drop strategy should be skipped");

    // Strategy 1 was attempted before strategy 2
    let lines: Vec<&str> = invocations.lines().collect();
    assert!(lines[1].contains("+genpts"));
    assert!(lines[2].contains("libx264"));

    Ok(())
}

#[tokio::test]
async fn exhausted_recovery_quarantines_the_capture() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");

    let encoder = write_script(
        temp_dir.path(),
        "encoder.sh",
        r#"case "$*" in
  *frag_keyframe*) printf 'raw-capture-bytes' > "$out"; exit 3;;
  *) exit 1;;
esac"#,
    );

    let session = RecordingSession::new(
        StreamPath::new("live", "cam1"),
        session_config(&media, &encoder, false),
    );
    let events = session.subscribe();

    assert!(session.start().await?);
    wait_terminal(&session).await;

    let status = session.status().await;
    assert_eq!(status.state, RecordingState::Corrupted);

    let events = collect_events(events);
    let quarantined = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::Corrupted { path } => Some(path.clone()),
            _ => None,
        })
        .expect("corrupted event should carry the quarantine path");

    // The original bytes survive unmodified under the quarantine name
    assert!(quarantined
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_corrupted.mp4"));
    assert_eq!(std::fs::read_to_string(&quarantined)?, "raw-capture-bytes");

    let temp = status.temp_path.expect("temp path recorded");
    assert!(!temp.exists(), "temp was renamed, not copied");
    assert!(status.output_path.is_none(), "no final file on corruption");

    Ok(())
}

#[tokio::test]
async fn graceful_stop_commits_the_capture() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");

    // Runs until told to stop, then exits cleanly
    let encoder = write_script(
        temp_dir.path(),
        "encoder.sh",
        r#"trap 'exit 0' TERM
printf 'captured-bytes' > "$out"
while :; do sleep 1; done"#,
    );

    let session = RecordingSession::new(
        StreamPath::new("live", "cam1"),
        session_config(&media, &encoder, false),
    );

    assert!(session.start().await?);
    wait_for_temp(&session).await;

    assert!(session.stop("manual").await, "stop should initiate");
    assert!(!session.stop("manual").await, "second stop is a no-op");

    wait_terminal(&session).await;

    let status = session.status().await;
    assert_eq!(status.state, RecordingState::Finalized);
    assert!(status.graceful_stop);
    assert!(status.output_path.unwrap().exists());

    Ok(())
}

#[tokio::test]
async fn unresponsive_encoder_is_force_killed_at_the_deadline() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");

    // Ignores the termination signal entirely
    let encoder = write_script(
        temp_dir.path(),
        "encoder.sh",
        r#"trap '' TERM
printf 'captured-bytes' > "$out"
while :; do sleep 1; done"#,
    );

    let mut cfg = session_config(&media, &encoder, false);
    cfg.stop_timeout = Duration::from_secs(1);

    let session = RecordingSession::new(StreamPath::new("live", "cam1"), cfg);

    assert!(session.start().await?);
    wait_for_temp(&session).await;
    assert!(session.stop("manual").await);

    // Terminal state must arrive despite the encoder never cooperating
    wait_terminal(&session).await;

    let status = session.status().await;
    assert_eq!(status.state, RecordingState::Finalized);
    assert!(status.ended_at.is_some());

    Ok(())
}

#[tokio::test]
async fn spawn_failure_moves_session_to_failed() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");

    let cfg = session_config(&media, Path::new("/nonexistent/ffmpeg"), false);
    let session = RecordingSession::new(StreamPath::new("live", "cam1"), cfg);
    let events = session.subscribe();

    assert!(session.start().await.is_err(), "spawn failure is reported");
    assert_eq!(session.state().await, RecordingState::Failed);

    let events = collect_events(events);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Failed { .. })));

    Ok(())
}

#[tokio::test]
async fn start_is_idempotent_while_active() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");

    let encoder = write_script(
        temp_dir.path(),
        "encoder.sh",
        r#"trap 'exit 0' TERM
printf 'captured-bytes' > "$out"
while :; do sleep 1; done"#,
    );

    let session = RecordingSession::new(
        StreamPath::new("live", "cam1"),
        session_config(&media, &encoder, false),
    );

    assert!(session.start().await?);
    assert!(!session.start().await?, "second start is a no-op");

    wait_for_temp(&session).await;
    session.stop("manual").await;
    wait_terminal(&session).await;

    assert!(!session.start().await?, "terminal sessions cannot restart");

    Ok(())
}

#[tokio::test]
async fn progress_markers_update_the_observed_duration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let media = temp_dir.path().join("media");

    let encoder = write_script(
        temp_dir.path(),
        "encoder.sh",
        r#"printf 'captured-bytes' > "$out"
echo "frame=  150 fps= 30 q=-1.0 size=    1024kB time=00:00:05.00 bitrate=1677.7kbits/s" >&2
sleep 1"#,
    );

    let session = RecordingSession::new(
        StreamPath::new("live", "cam1"),
        session_config(&media, &encoder, false),
    );
    let mut events = session.subscribe();

    assert!(session.start().await?);

    // A progress notification arrives while the capture is still running
    let progress = timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Progress { duration_secs }) => return duration_secs,
                Ok(_) => {}
                Err(e) => panic!("event stream ended early: {}", e),
            }
        }
    })
    .await
    .expect("progress event should arrive");
    assert!((progress - 5.0).abs() < f64::EPSILON);

    wait_terminal(&session).await;
    assert!((session.status().await.duration_secs - 5.0).abs() < f64::EPSILON);

    Ok(())
}
