//! Blocking session handle for callers without an async runtime
//!
//! Each handle owns a small multi-threaded tokio runtime that runs the
//! coordinator, its encoder task and its event dispatcher. Calls block the
//! caller until the operation completes or its timeout elapses. Dropping the
//! handle releases the session.
//!
//! `start` and `stop` must not be called from inside an async runtime; tokio
//! panics when a runtime is blocked on from one of its own tasks. Async
//! callers should drive a [`SessionCoordinator`] directly. Dropping a handle
//! is allowed anywhere: inside an async context the release runs on a
//! helper thread.

use crate::capture::{CaptureSource, CaptureSourceFactory};
use crate::encoder::{ContainerWriter, MediaEncoder};
use crate::session::{
    ErrorRecord, Event, RecorderError, RecorderResult, SessionConfig, SessionCoordinator,
    SessionState, SessionStats,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, error, info};

/// Grace period for runtime threads after the session is released
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(500);

pub struct SessionHandle {
    coordinator: Arc<SessionCoordinator>,
    runtime: Option<Runtime>,
}

impl SessionHandle {
    /// Create a session with the collaborators selected by `config`
    pub fn create(config: SessionConfig) -> RecorderResult<Self> {
        config.validate()?;
        let source = CaptureSourceFactory::create(&config)
            .map_err(|e| RecorderError::InitFailed(format!("{:#}", e)))?;
        Self::with_collaborators(config, source, Box::new(ContainerWriter::new()))
    }

    /// Create a session with host-supplied collaborators
    pub fn with_collaborators(
        config: SessionConfig,
        source: Box<dyn CaptureSource>,
        encoder: Box<dyn MediaEncoder>,
    ) -> RecorderResult<Self> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("capture-session")
            .enable_all()
            .build()
            .map_err(|e| RecorderError::InitFailed(format!("failed to build runtime: {}", e)))?;

        let coordinator = {
            let _guard = runtime.enter();
            SessionCoordinator::new(config, source, encoder)?
        };
        info!(session = %coordinator.id(), "Session handle created");

        Ok(Self {
            coordinator,
            runtime: Some(runtime),
        })
    }

    fn block_on<T>(&self, future: impl Future<Output = RecorderResult<T>>) -> RecorderResult<T> {
        match &self.runtime {
            Some(runtime) => runtime.block_on(future),
            None => Err(RecorderError::InitFailed("session runtime is gone".to_string())),
        }
    }

    /// # Panics
    /// Panics when called from inside an async runtime.
    pub fn start(&self) -> RecorderResult<()> {
        self.block_on(self.coordinator.start())
    }

    /// # Panics
    /// Panics when called from inside an async runtime.
    pub fn stop(&self) -> RecorderResult<()> {
        self.block_on(self.coordinator.stop())
    }

    /// Seconds recorded, as a float
    pub fn duration(&self) -> f64 {
        self.coordinator.duration_secs()
    }

    pub fn state(&self) -> SessionState {
        self.coordinator.state()
    }

    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.coordinator.last_error()
    }

    pub fn stats(&self) -> SessionStats {
        self.coordinator.stats()
    }

    /// Register the event observer, replacing any previous one
    ///
    /// The observer runs on the session's dispatch task and must not call
    /// back into this handle's blocking methods.
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.coordinator.set_observer(observer);
    }

    pub fn clear_observer(&self) {
        self.coordinator.clear_observer();
    }

    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// Stop if needed and free everything the session holds
    ///
    /// Blocks until the release completes or its timeout elapses, also when
    /// called from an async context.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let coordinator = Arc::clone(&self.coordinator);
        let release = move || {
            runtime.block_on(coordinator.shutdown());
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
        };

        // A runtime can be neither blocked on nor dropped from async code
        if tokio::runtime::Handle::try_current().is_ok() {
            if std::thread::spawn(release).join().is_err() {
                error!(session = %self.coordinator.id(), "Session release thread panicked");
            }
        } else {
            release();
        }
        debug!(session = %self.coordinator.id(), "Session handle released");
    }
}
