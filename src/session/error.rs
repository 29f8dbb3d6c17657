//! Error kinds and the last-error slot

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Initialization failed: {0}")]
    InitFailed(String),

    #[error("Capture device lost: {0}")]
    DeviceLost(String),

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),

    #[error("Finalization failed: {0}")]
    FinalizeFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Audio dropped: {0}")]
    AudioDropped(String),

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session is not running")]
    NotRunning,
}

/// Result type for session operations
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Fieldless error classification with stable numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidConfig,
    InitFailed,
    DeviceLost,
    EncodeFailed,
    FinalizeFailed,
    Timeout,
    AlreadyStarted,
    NotRunning,
    AudioDropped,
}

impl ErrorKind {
    /// Numeric code exposed across the C boundary (0 is reserved for success)
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidConfig => 1,
            ErrorKind::InitFailed => 2,
            ErrorKind::DeviceLost => 3,
            ErrorKind::EncodeFailed => 4,
            ErrorKind::FinalizeFailed => 5,
            ErrorKind::Timeout => 6,
            ErrorKind::AlreadyStarted => 7,
            ErrorKind::NotRunning => 8,
            ErrorKind::AudioDropped => 9,
        }
    }

    /// Caller-contract violations are rejected locally and never recorded
    pub fn is_contract_violation(self) -> bool {
        matches!(self, ErrorKind::AlreadyStarted | ErrorKind::NotRunning)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::InitFailed => "init_failed",
            ErrorKind::DeviceLost => "device_lost",
            ErrorKind::EncodeFailed => "encode_failed",
            ErrorKind::FinalizeFailed => "finalize_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AlreadyStarted => "already_started",
            ErrorKind::NotRunning => "not_running",
            ErrorKind::AudioDropped => "audio_dropped",
        };
        f.write_str(name)
    }
}

impl RecorderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecorderError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            RecorderError::InitFailed(_) => ErrorKind::InitFailed,
            RecorderError::DeviceLost(_) => ErrorKind::DeviceLost,
            RecorderError::EncodeFailed(_) => ErrorKind::EncodeFailed,
            RecorderError::FinalizeFailed(_) => ErrorKind::FinalizeFailed,
            RecorderError::Timeout(_) => ErrorKind::Timeout,
            RecorderError::AudioDropped(_) => ErrorKind::AudioDropped,
            RecorderError::AlreadyStarted => ErrorKind::AlreadyStarted,
            RecorderError::NotRunning => ErrorKind::NotRunning,
        }
    }

    /// The message carried by the error, without the kind prefix
    pub fn detail(&self) -> String {
        match self {
            RecorderError::InvalidConfig(m)
            | RecorderError::InitFailed(m)
            | RecorderError::DeviceLost(m)
            | RecorderError::EncodeFailed(m)
            | RecorderError::FinalizeFailed(m)
            | RecorderError::Timeout(m)
            | RecorderError::AudioDropped(m) => m.clone(),
            RecorderError::AlreadyStarted | RecorderError::NotRunning => self.to_string(),
        }
    }

    /// Rebuild an error from a recorded kind and message
    pub fn from_parts(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::InvalidConfig => RecorderError::InvalidConfig(message),
            ErrorKind::InitFailed => RecorderError::InitFailed(message),
            ErrorKind::DeviceLost => RecorderError::DeviceLost(message),
            ErrorKind::EncodeFailed => RecorderError::EncodeFailed(message),
            ErrorKind::FinalizeFailed => RecorderError::FinalizeFailed(message),
            ErrorKind::Timeout => RecorderError::Timeout(message),
            ErrorKind::AudioDropped => RecorderError::AudioDropped(message),
            ErrorKind::AlreadyStarted => RecorderError::AlreadyStarted,
            ErrorKind::NotRunning => RecorderError::NotRunning,
        }
    }
}

/// The most recent failure of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Human-readable description, without the kind prefix
    pub message: String,
    /// When the failure was recorded
    pub at: DateTime<Utc>,
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

impl ErrorRecord {
    pub fn to_error(&self) -> RecorderError {
        RecorderError::from_parts(self.kind, self.message.clone())
    }
}

/// Single-slot holder for the last error
///
/// Every write overwrites the previous record; reads return a snapshot and
/// never consume it.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    record: RwLock<Option<ErrorRecord>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, error: &RecorderError) {
        let record = ErrorRecord {
            kind: error.kind(),
            message: error.detail(),
            at: Utc::now(),
        };
        *self.record.write() = Some(record);
    }

    pub fn snapshot(&self) -> Option<ErrorRecord> {
        self.record.read().clone()
    }

    pub fn clear(&self) {
        *self.record.write() = None;
    }
}
