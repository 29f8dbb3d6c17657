use super::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a recording session
///
/// Immutable once the session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Output container path
    pub output_path: PathBuf,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Target frames per second
    pub fps: u32,

    /// Quality tier, interpreted by the encoder
    pub quality: u32,

    /// Display to capture (0 = main display)
    pub display_id: u32,

    /// Capture the mouse cursor
    pub capture_cursor: bool,

    /// Capture region (None = full display)
    pub region: Option<CaptureRegion>,

    /// Capture audio alongside video
    pub capture_audio: bool,

    /// Audio device unique ID (None = auto-select)
    pub audio_device_id: Option<String>,

    /// Which capture backend produces the units
    pub backend: CaptureBackend,

    /// Handoff queue sizing and overflow behaviour
    pub handoff: HandoffConfig,

    /// Bounds on blocking lifecycle calls
    pub timeouts: TimeoutConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("recording.mp4"),
            width: 1920,
            height: 1080,
            fps: 30,
            quality: 80,
            display_id: 0,
            capture_cursor: true,
            region: None,
            capture_audio: false,
            audio_device_id: None,
            backend: CaptureBackend::default(),
            handoff: HandoffConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Screen region to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Capture backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureBackend {
    /// Synthetic test pattern and tone
    #[default]
    TestPattern,
    /// Native platform capture, provided by the host
    Platform,
}

/// What a full handoff queue does with a new unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued unit to make room
    DropOldest,
    /// Refuse the new unit
    RejectNew,
}

/// Per-stream handoff queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub video_capacity: usize,
    pub audio_capacity: usize,
    pub video_overflow: OverflowPolicy,
    /// Audio loss is fatal whichever unit is given up
    pub audio_overflow: OverflowPolicy,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            video_capacity: 8,
            audio_capacity: 64,
            video_overflow: OverflowPolicy::DropOldest,
            audio_overflow: OverflowPolicy::RejectNew,
        }
    }
}

/// Timeouts for lifecycle transitions, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub start_ms: u64,
    pub stop_ms: u64,
    /// Bound on the implicit stop performed by release
    pub release_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            start_ms: 5_000,
            stop_ms: 10_000,
            release_ms: 3_000,
        }
    }
}

impl TimeoutConfig {
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_millis(self.stop_ms)
    }

    pub fn release(&self) -> Duration {
        Duration::from_millis(self.release_ms)
    }
}

const MAX_FPS: u32 = 240;

impl SessionConfig {
    /// Checks that need no filesystem or device access
    pub fn validate(&self) -> RecorderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecorderError::InvalidConfig(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }

        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(RecorderError::InvalidConfig(format!(
                "fps must be between 1 and {}, got {}",
                MAX_FPS, self.fps
            )));
        }

        if self.output_path.as_os_str().is_empty() {
            return Err(RecorderError::InvalidConfig("output path is empty".to_string()));
        }

        if let Some(region) = self.region {
            let fits_x = region.x.checked_add(region.width).map_or(false, |r| r <= self.width);
            let fits_y = region.y.checked_add(region.height).map_or(false, |b| b <= self.height);
            if region.width == 0 || region.height == 0 || !fits_x || !fits_y {
                return Err(RecorderError::InvalidConfig(format!(
                    "capture region {:?} does not fit in {}x{}",
                    region, self.width, self.height
                )));
            }
        }

        if matches!(self.audio_device_id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(RecorderError::InvalidConfig(
                "audio device id is empty (omit it to auto-select)".to_string(),
            ));
        }

        if self.handoff.video_capacity == 0 || self.handoff.audio_capacity == 0 {
            return Err(RecorderError::InvalidConfig(
                "handoff queue capacities must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Verify the output location can be written
    ///
    /// Probes by creating the file; a probe file that did not exist before
    /// is removed again.
    pub fn check_output_writable(&self) -> RecorderResult<()> {
        let path = self.output_path.as_path();

        if path.is_dir() {
            return Err(RecorderError::InvalidConfig(format!(
                "output path {} is a directory",
                path.display()
            )));
        }

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(RecorderError::InvalidConfig(format!(
                "output directory {} does not exist",
                parent.display()
            )));
        }

        let existed = path.exists();
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                RecorderError::InvalidConfig(format!(
                    "output path {} is not writable: {}",
                    path.display(),
                    e
                ))
            })?;
        if !existed {
            let _ = std::fs::remove_file(path);
        }

        Ok(())
    }
}
