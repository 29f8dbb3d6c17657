//! Encoders consuming media units

mod backend;
mod container;

pub use backend::MediaEncoder;
pub use container::{audio_stem_path, inspect, ContainerSummary, ContainerWriter};
