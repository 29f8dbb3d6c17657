pub mod capture;
pub mod config;
pub mod encoder;
pub mod ffi;
pub mod handle;
pub mod http;
pub mod logging;
pub mod media;
pub mod session;

pub use capture::{
    AudioDeviceInfo, CaptureSource, CaptureSourceFactory, DisplayInfo, FrameSink,
    TestPatternOptions, TestPatternSource,
};
pub use config::Config;
pub use encoder::{ContainerSummary, ContainerWriter, MediaEncoder};
pub use handle::SessionHandle;
pub use http::{create_router, AppState};
pub use media::{AudioBatch, MediaUnit, StreamKind, VideoFrame};
pub use session::{
    CaptureBackend, ErrorKind, ErrorRecord, Event, OverflowPolicy, PushOutcome, RecorderError,
    RecorderResult, SessionConfig, SessionCoordinator, SessionState, SessionStats,
};
