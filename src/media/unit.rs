use serde::{Deserialize, Serialize};

/// Which handoff stream a unit travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}

/// One captured video frame
///
/// The pixel payload is opaque to the coordinator; only the encoder
/// interprets it.
#[derive(Debug)]
pub struct VideoFrame {
    /// Raw frame bytes in whatever layout the source and encoder agree on
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Presentation timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// One batch of captured audio samples (16-bit PCM, interleaved)
#[derive(Debug)]
pub struct AudioBatch {
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Presentation timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioBatch {
    /// Duration covered by this batch in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// A unit moving through the handoff queues
///
/// Units are moved, never shared: the source gives one up when it pushes it
/// and the encoder takes ownership when it is written.
#[derive(Debug)]
pub enum MediaUnit {
    Video(VideoFrame),
    Audio(AudioBatch),
}

impl MediaUnit {
    pub fn kind(&self) -> StreamKind {
        match self {
            MediaUnit::Video(_) => StreamKind::Video,
            MediaUnit::Audio(_) => StreamKind::Audio,
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        match self {
            MediaUnit::Video(frame) => frame.timestamp_ms,
            MediaUnit::Audio(batch) => batch.timestamp_ms,
        }
    }
}

impl From<VideoFrame> for MediaUnit {
    fn from(frame: VideoFrame) -> Self {
        MediaUnit::Video(frame)
    }
}

impl From<AudioBatch> for MediaUnit {
    fn from(batch: AudioBatch) -> Self {
        MediaUnit::Audio(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_batch_duration() {
        // 10ms of 48kHz stereo
        let batch = AudioBatch {
            samples: vec![0i16; 960],
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: 0,
        };
        assert!((batch.duration_ms() - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_unit_kind_and_timestamp() {
        let unit: MediaUnit = VideoFrame {
            data: vec![1, 2, 3],
            width: 2,
            height: 2,
            timestamp_ms: 33,
        }
        .into();
        assert_eq!(unit.kind(), StreamKind::Video);
        assert_eq!(unit.timestamp_ms(), 33);
    }
}
