// Shared collaborator doubles for the integration tests

#![allow(dead_code)]

use anyhow::Result;
use capture_session::{
    AudioBatch, CaptureSource, Event, FrameSink, MediaEncoder, MediaUnit, SessionConfig,
    SessionCoordinator, StreamKind, VideoFrame,
};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Config writing into a temporary directory
pub fn config_in(dir: &TempDir, file: &str) -> SessionConfig {
    SessionConfig {
        output_path: dir.path().join(file),
        width: 1280,
        height: 720,
        ..Default::default()
    }
}

pub fn frame(timestamp_ms: u64) -> VideoFrame {
    VideoFrame {
        data: vec![0u8; 16],
        width: 1280,
        height: 720,
        timestamp_ms,
    }
}

pub fn batch(timestamp_ms: u64) -> AudioBatch {
    AudioBatch {
        samples: vec![0i16; 960],
        sample_rate: 48000,
        channels: 2,
        timestamp_ms,
    }
}

/// Source the test drives by hand through the captured sink
pub struct ManualSource {
    sink: Arc<Mutex<Option<FrameSink>>>,
    capturing: bool,
}

impl ManualSource {
    pub fn new() -> (Self, Arc<Mutex<Option<FrameSink>>>) {
        let sink = Arc::new(Mutex::new(None));
        (
            Self {
                sink: Arc::clone(&sink),
                capturing: false,
            },
            sink,
        )
    }
}

#[async_trait::async_trait]
impl CaptureSource for ManualSource {
    async fn start(&mut self, _config: &SessionConfig, sink: FrameSink) -> Result<()> {
        *self.sink.lock() = Some(sink);
        self.capturing = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "manual"
    }
}

/// Grab the sink a started ManualSource received
pub fn sink_of(slot: &Arc<Mutex<Option<FrameSink>>>) -> FrameSink {
    slot.lock().clone().expect("source was started")
}

/// Encoder double recording what it was given
#[derive(Clone, Default)]
pub struct Probe {
    pub written: Arc<Mutex<Vec<(StreamKind, u64)>>>,
    pub writes_entered: Arc<AtomicUsize>,
    pub finalized: Arc<AtomicUsize>,
}

impl Probe {
    pub fn written(&self) -> Vec<(StreamKind, u64)> {
        self.written.lock().clone()
    }

    pub fn timestamps(&self, kind: StreamKind) -> Vec<u64> {
        self.written
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, ts)| *ts)
            .collect()
    }

    /// Wait until the encoder has started `n` writes
    pub async fn wait_for_writes(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.writes_entered.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("encoder received units");
    }
}

pub struct ProbeEncoder {
    probe: Probe,
    /// Each write waits for a permit when set
    gate: Option<Arc<Semaphore>>,
    fail_on_write: bool,
    fail_on_finalize: bool,
    hang_on_finalize: bool,
}

impl ProbeEncoder {
    pub fn new() -> (Self, Probe) {
        let probe = Probe::default();
        (
            Self {
                probe: probe.clone(),
                gate: None,
                fail_on_write: false,
                fail_on_finalize: false,
                hang_on_finalize: false,
            },
            probe,
        )
    }

    pub fn gated(gate: Arc<Semaphore>) -> (Self, Probe) {
        let (mut encoder, probe) = Self::new();
        encoder.gate = Some(gate);
        (encoder, probe)
    }

    pub fn failing() -> (Self, Probe) {
        let (mut encoder, probe) = Self::new();
        encoder.fail_on_write = true;
        (encoder, probe)
    }

    pub fn failing_finalize() -> (Self, Probe) {
        let (mut encoder, probe) = Self::new();
        encoder.fail_on_finalize = true;
        (encoder, probe)
    }

    pub fn hanging_finalize() -> (Self, Probe) {
        let (mut encoder, probe) = Self::new();
        encoder.hang_on_finalize = true;
        (encoder, probe)
    }
}

#[async_trait::async_trait]
impl MediaEncoder for ProbeEncoder {
    async fn open(&mut self, _config: &SessionConfig) -> Result<()> {
        Ok(())
    }

    async fn write(&mut self, unit: MediaUnit) -> Result<()> {
        self.probe.writes_entered.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if self.fail_on_write {
            anyhow::bail!("disk full");
        }
        self.probe.written.lock().push((unit.kind(), unit.timestamp_ms()));
        Ok(())
    }

    async fn finalize(&mut self) -> Result<Vec<PathBuf>> {
        if self.hang_on_finalize {
            std::future::pending::<()>().await;
        }
        if self.fail_on_finalize {
            anyhow::bail!("moov atom could not be written");
        }
        self.probe.finalized.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "probe"
    }
}

/// Observer collecting every delivered event
pub fn event_log(session: &SessionCoordinator) -> Arc<Mutex<Vec<Event>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    session.set_observer(move |event| sink.lock().push(event));
    log
}

/// Read events until the terminal one (or the timeout)
pub async fn collect_until_terminal(
    mut events: impl Stream<Item = Event> + Unpin,
    limit: Duration,
) -> Vec<Event> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(limit, async {
        while let Some(event) = events.next().await {
            seen.push(event);
            if event.is_terminal() {
                break;
            }
        }
    })
    .await;
    seen
}

/// Events other than Frame, in order
pub fn lifecycle_events(events: &[Event]) -> Vec<Event> {
    events
        .iter()
        .copied()
        .filter(|event| *event != Event::Frame)
        .collect()
}
