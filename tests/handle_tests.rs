// Integration tests for the blocking SessionHandle
//
// These run on plain threads, the way a native host calls the library.

mod common;

use anyhow::Result;
use capture_session::encoder::inspect;
use capture_session::{
    ErrorKind, RecorderError, SessionConfig, SessionHandle, SessionState, TestPatternOptions,
    TestPatternSource,
};
use common::{config_in, ManualSource, ProbeEncoder};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[test]
fn test_create_rejects_invalid_config() {
    let result = SessionHandle::create(SessionConfig {
        width: 0,
        ..Default::default()
    });
    assert!(matches!(result, Err(RecorderError::InvalidConfig(_))));
}

#[test]
fn test_blocking_start_stop_delivers_codes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = config_in(&temp_dir, "blocking.mp4");
    let handle = SessionHandle::create(config.clone())?;

    let codes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&codes);
    handle.set_observer(move |event| sink.lock().push(event.code()));

    assert_eq!(handle.duration(), 0.0);
    handle.start()?;
    // Started has been delivered by the time start returns
    assert_eq!(codes.lock().first(), Some(&0));

    std::thread::sleep(Duration::from_millis(300));
    assert!(handle.duration() > 0.0);
    handle.stop()?;

    assert_eq!(handle.state(), SessionState::Stopped);
    let delivered = codes.lock().clone();
    assert_eq!(delivered.last(), Some(&1));
    assert!(delivered[1..delivered.len() - 1].iter().all(|c| *c == 3));

    assert_eq!(handle.start(), Err(RecorderError::AlreadyStarted));
    assert_eq!(handle.stop(), Err(RecorderError::NotRunning));
    assert!(handle.last_error().is_none());

    handle.release();
    assert!(inspect(&config.output_path)?.video_timestamps.len() > 3);
    Ok(())
}

#[test]
fn test_drop_while_running_finalizes_output() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = config_in(&temp_dir, "dropped.mp4");
    let handle = SessionHandle::create(config.clone())?;

    handle.start()?;
    std::thread::sleep(Duration::from_millis(200));
    drop(handle);

    let summary = inspect(&config.output_path)?;
    assert!(!summary.video_timestamps.is_empty());
    Ok(())
}

#[test]
fn test_release_is_bounded_by_timeout() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = config_in(&temp_dir, "stuck.mp4");
    config.timeouts.release_ms = 200;

    let (source, _slot) = ManualSource::new();
    let (encoder, _probe) = ProbeEncoder::hanging_finalize();
    let handle = SessionHandle::with_collaborators(config, Box::new(source), Box::new(encoder))?;
    handle.start()?;

    let coordinator = Arc::clone(handle.coordinator());
    let began = Instant::now();
    handle.release();
    assert!(began.elapsed() < Duration::from_secs(3));

    assert_eq!(coordinator.state(), SessionState::Failed);
    assert_eq!(coordinator.last_error().unwrap().kind, ErrorKind::Timeout);
    Ok(())
}

#[test]
fn test_start_failure_reports_init_failed() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = TestPatternSource::new(TestPatternOptions {
        fail_start: true,
        ..Default::default()
    });
    let handle = SessionHandle::with_collaborators(
        config_in(&temp_dir, "a.mp4"),
        Box::new(source),
        Box::new(capture_session::ContainerWriter::new()),
    )?;

    let err = handle.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InitFailed);
    assert_eq!(handle.state(), SessionState::Failed);
    assert_eq!(handle.last_error().unwrap().kind, ErrorKind::InitFailed);
    Ok(())
}

#[tokio::test]
async fn test_drop_inside_async_context_releases_session() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = config_in(&temp_dir, "async-drop.mp4");

    let started = config.clone();
    let handle = std::thread::spawn(move || -> Result<SessionHandle> {
        let handle = SessionHandle::create(started)?;
        handle.start()?;
        Ok(handle)
    })
    .join()
    .expect("start thread")?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let coordinator = Arc::clone(handle.coordinator());
    drop(handle);

    assert_eq!(coordinator.state(), SessionState::Stopped);
    assert!(!inspect(&config.output_path)?.video_timestamps.is_empty());
    Ok(())
}
