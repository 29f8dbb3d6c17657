//! Recording session coordination
//!
//! This module provides the `SessionCoordinator` that manages:
//! - The lifecycle state machine (Created -> Starting -> Running -> Stopping -> Stopped/Failed)
//! - Bounded handoff of video frames and audio batches from capture threads
//! - The encoder task draining the handoff queues
//! - Ordered event delivery to a single observer
//! - The last-error slot and session statistics

mod config;
mod coordinator;
mod error;
mod events;
pub(crate) mod queue;
pub(crate) mod shared;
mod state;
mod stats;

pub use config::{
    CaptureBackend, CaptureRegion, HandoffConfig, OverflowPolicy, SessionConfig, TimeoutConfig,
};
pub use coordinator::SessionCoordinator;
pub use error::{ErrorKind, ErrorRecord, ErrorSlot, RecorderError, RecorderResult};
pub use events::{Event, EventBus, Observer, EVENT_ERROR, EVENT_FRAME, EVENT_STARTED, EVENT_STOPPED};
pub use queue::{HandoffQueue, PushOutcome, QueueCounters, StreamQueues};
pub use state::SessionState;
pub use stats::{SessionStats, StreamStats};
