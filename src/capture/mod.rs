//! Capture sources and the sink they push into

mod backend;
mod sink;
mod test_pattern;

pub use backend::{AudioDeviceInfo, CaptureSource, CaptureSourceFactory, DisplayInfo};
pub use sink::FrameSink;
pub use test_pattern::{TestPatternOptions, TestPatternSource, TEST_AUDIO_DEVICE_ID, TEST_DISPLAY_ID};
