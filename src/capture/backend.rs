use super::sink::FrameSink;
use super::test_pattern::{TestPatternOptions, TestPatternSource};
use crate::session::{CaptureBackend, SessionConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A display that can be captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// An audio input device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    /// Unique identifier passed back as `audio_device_id`
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Whether this is the system default input
    pub is_default: bool,
    /// Whether this is a built-in device
    pub is_builtin: bool,
}

/// Capture source trait
///
/// A source produces video frames (and audio batches when audio capture is
/// enabled) on its own threads and hands them to the [`FrameSink`] it was
/// started with. Pushing never blocks.
///
/// Implementations:
/// - Test pattern: synthetic frames and a tone, for tests and headless hosts
/// - Platform: native capture supplied by the embedding host
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync {
    /// Begin delivering units to `sink`
    async fn start(&mut self, config: &SessionConfig, sink: FrameSink) -> Result<()>;

    /// Stop delivering units
    ///
    /// After this returns the source must not push again.
    async fn stop(&mut self) -> Result<()>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;

    /// Displays this source can capture (empty if it cannot enumerate)
    fn displays(&self) -> Vec<DisplayInfo> {
        Vec::new()
    }

    /// Audio input devices this source can capture (empty if it cannot enumerate)
    fn audio_devices(&self) -> Vec<AudioDeviceInfo> {
        Vec::new()
    }
}

/// Capture source factory
pub struct CaptureSourceFactory;

impl CaptureSourceFactory {
    /// Create the capture source selected by the configuration
    pub fn create(config: &SessionConfig) -> Result<Box<dyn CaptureSource>> {
        match config.backend {
            CaptureBackend::TestPattern => {
                let source = TestPatternSource::new(TestPatternOptions::default());
                Ok(Box::new(source))
            }

            CaptureBackend::Platform => {
                anyhow::bail!(
                    "Native capture is not built into this library; the host must supply a CaptureSource"
                )
            }
        }
    }
}
