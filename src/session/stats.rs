use super::error::ErrorRecord;
use super::queue::QueueCounters;
use super::state::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Snapshot of a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier used in logs
    pub id: Uuid,

    /// Current lifecycle state
    pub state: SessionState,

    /// When the session entered Running
    pub started_at: Option<DateTime<Utc>>,

    /// Recorded duration in seconds
    pub duration_secs: f64,

    /// Video handoff statistics
    pub video: StreamStats,

    /// Audio handoff statistics
    pub audio: StreamStats,

    /// Files produced by the encoder (empty until finalized)
    pub output_files: Vec<PathBuf>,

    /// Most recent failure, if any
    pub last_error: Option<ErrorRecord>,
}

/// Handoff and encode counters for one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Units taken by the queue
    pub accepted: u64,

    /// Units lost to overflow
    pub dropped: u64,

    /// Units waiting for the encoder
    pub queued: usize,

    /// Units handed to the encoder
    pub written: u64,
}

impl StreamStats {
    pub fn new(counters: QueueCounters, written: u64) -> Self {
        Self {
            accepted: counters.accepted,
            dropped: counters.dropped,
            queued: counters.depth,
            written,
        }
    }
}
