//! Media units handed from a capture source to an encoder.

mod unit;

pub use unit::{AudioBatch, MediaUnit, StreamKind, VideoFrame};
