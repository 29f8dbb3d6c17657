use super::backend::{AudioDeviceInfo, CaptureSource, DisplayInfo};
use super::sink::FrameSink;
use crate::media::{AudioBatch, VideoFrame};
use crate::session::SessionConfig;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const TEST_DISPLAY_ID: u32 = 1;
pub const TEST_AUDIO_DEVICE_ID: &str = "test-tone";

/// Knobs for the synthetic source
#[derive(Debug, Clone)]
pub struct TestPatternOptions {
    /// Payload size of each frame; the pattern is not a full raster
    pub frame_bytes: usize,
    pub sample_rate: u32,
    pub channels: u16,
    /// Audio delivered per batch
    pub batch_ms: u64,
    pub tone_hz: f32,
    /// Make `start` fail
    pub fail_start: bool,
    /// Delay `start` by this long before capturing
    pub start_delay: Option<Duration>,
    /// Report the display as lost after this much capture time
    pub device_lost_after: Option<Duration>,
}

impl Default for TestPatternOptions {
    fn default() -> Self {
        Self {
            frame_bytes: 64,
            sample_rate: 48_000,
            channels: 2,
            batch_ms: 10,
            tone_hz: 440.0,
            fail_start: false,
            start_delay: None,
            device_lost_after: None,
        }
    }
}

/// Synthetic capture source: a moving byte pattern and a sine tone
///
/// Video and audio run on their own threads and pace themselves to the
/// configured frame rate and batch length.
pub struct TestPatternSource {
    options: TestPatternOptions,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl TestPatternSource {
    pub fn new(options: TestPatternOptions) -> Self {
        Self {
            options,
            running: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        }
    }

    fn spawn_video(&self, config: &SessionConfig, sink: FrameSink, origin: Instant) -> Result<JoinHandle<()>> {
        let running = Arc::clone(&self.running);
        let (width, height) = match config.region {
            Some(region) => (region.width, region.height),
            None => (config.width, config.height),
        };
        let interval = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);
        let frame_bytes = self.options.frame_bytes;
        let lost_after = self.options.device_lost_after;

        std::thread::Builder::new()
            .name("test-pattern-video".to_string())
            .spawn(move || {
                let mut next = Instant::now();
                let mut index: u64 = 0;

                while running.load(Ordering::Acquire) {
                    let elapsed = origin.elapsed();
                    if lost_after.map_or(false, |limit| elapsed >= limit) {
                        warn!("Test pattern simulating display loss after {:?}", elapsed);
                        sink.device_lost("test pattern display disconnected");
                        break;
                    }

                    sink.push_video(VideoFrame {
                        data: pattern(index, frame_bytes),
                        width,
                        height,
                        timestamp_ms: elapsed.as_millis() as u64,
                    });
                    index += 1;

                    next += interval;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                debug!("Test pattern video thread exiting after {} frames", index);
            })
            .context("Failed to spawn video thread")
    }

    fn spawn_audio(&self, sink: FrameSink) -> Result<JoinHandle<()>> {
        let running = Arc::clone(&self.running);
        let TestPatternOptions {
            sample_rate,
            channels,
            batch_ms,
            tone_hz,
            ..
        } = self.options.clone();
        let frames_per_batch = (sample_rate as u64 * batch_ms / 1000).max(1) as usize;
        let interval = Duration::from_millis(batch_ms.max(1));

        std::thread::Builder::new()
            .name("test-pattern-audio".to_string())
            .spawn(move || {
                let mut next = Instant::now();
                let mut frames_sent: u64 = 0;

                while running.load(Ordering::Acquire) {
                    let mut samples = Vec::with_capacity(frames_per_batch * channels as usize);
                    for i in 0..frames_per_batch as u64 {
                        let t = (frames_sent + i) as f32 / sample_rate as f32;
                        let value = (t * tone_hz * std::f32::consts::TAU).sin() * 0.25;
                        let sample = (value * i16::MAX as f32) as i16;
                        samples.extend(std::iter::repeat(sample).take(channels as usize));
                    }

                    sink.push_audio(AudioBatch {
                        samples,
                        sample_rate,
                        channels,
                        timestamp_ms: frames_sent * 1000 / sample_rate as u64,
                    });
                    frames_sent += frames_per_batch as u64;

                    next += interval;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                debug!("Test pattern audio thread exiting after {} frames", frames_sent);
            })
            .context("Failed to spawn audio thread")
    }
}

fn pattern(index: u64, len: usize) -> Vec<u8> {
    (0..len).map(|i| (index as usize + i) as u8).collect()
}

#[async_trait::async_trait]
impl CaptureSource for TestPatternSource {
    async fn start(&mut self, config: &SessionConfig, sink: FrameSink) -> Result<()> {
        if self.options.fail_start {
            anyhow::bail!("Test pattern configured to fail on start");
        }
        if self.running.load(Ordering::Acquire) {
            anyhow::bail!("Test pattern already capturing");
        }
        if let Some(delay) = self.options.start_delay {
            tokio::time::sleep(delay).await;
        }

        info!(
            "Starting test pattern: {}x{} @ {} fps, audio: {}",
            config.width, config.height, config.fps, config.capture_audio
        );

        self.running.store(true, Ordering::Release);
        let origin = Instant::now();

        match self.spawn_video(config, sink.clone(), origin) {
            Ok(handle) => self.threads.push(handle),
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e);
            }
        }

        if config.capture_audio {
            match self.spawn_audio(sink) {
                Ok(handle) => self.threads.push(handle),
                Err(e) => {
                    self.stop().await?;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        let threads = std::mem::take(&mut self.threads);
        if threads.is_empty() {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || {
            for handle in threads {
                if handle.join().is_err() {
                    warn!("Test pattern thread panicked");
                }
            }
        })
        .await
        .context("Failed to join test pattern threads")?;

        info!("Test pattern stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn name(&self) -> &str {
        "test-pattern"
    }

    fn displays(&self) -> Vec<DisplayInfo> {
        vec![DisplayInfo {
            id: TEST_DISPLAY_ID,
            name: "Test Pattern".to_string(),
            width: 1920,
            height: 1080,
            is_primary: true,
        }]
    }

    fn audio_devices(&self) -> Vec<AudioDeviceInfo> {
        vec![AudioDeviceInfo {
            id: TEST_AUDIO_DEVICE_ID.to_string(),
            name: "Test Tone".to_string(),
            is_default: true,
            is_builtin: true,
        }]
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
