//! Session state reachable from capture threads and background tasks

use super::config::SessionConfig;
use super::error::{ErrorSlot, RecorderError};
use super::events::{Event, EventBus};
use super::queue::StreamQueues;
use super::state::SessionState;
use crate::media::StreamKind;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

struct Lifecycle {
    state: SessionState,
    started_at: Option<Instant>,
    started_wall: Option<DateTime<Utc>>,
    ended_at: Option<Instant>,
}

/// Everything a capture sink, the encoder task and the supervisor share
///
/// Holds no reference to the source or encoder, so sinks handed to a source
/// never keep the coordinator alive.
pub(crate) struct Shared {
    pub(crate) id: Uuid,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<SessionState>,
    pub(crate) events: EventBus,
    pub(crate) errors: ErrorSlot,
    pub(crate) queues: StreamQueues,
    video_written: AtomicU64,
    audio_written: AtomicU64,
}

impl Shared {
    /// Must be called from within a tokio runtime (the event bus spawns its dispatcher)
    pub(crate) fn new(config: &SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Created);
        Self {
            id: Uuid::new_v4(),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Created,
                started_at: None,
                started_wall: None,
                ended_at: None,
            }),
            state_tx,
            events: EventBus::new(),
            errors: ErrorSlot::new(),
            queues: StreamQueues::new(&config.handoff),
            video_written: AtomicU64::new(0),
            audio_written: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn started_wall(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.lock().started_wall
    }

    /// Atomic check-and-set of the lifecycle state
    ///
    /// The event, if any, is published under the same lock so observers see
    /// events in transition order. Returns the current state on rejection.
    pub(crate) fn transition(
        &self,
        to: SessionState,
        event: Option<Event>,
    ) -> Result<SessionState, SessionState> {
        let mut lifecycle = self.lifecycle.lock();
        let from = lifecycle.state;
        if !from.can_transition_to(to) {
            return Err(from);
        }
        self.apply(&mut lifecycle, to, event);
        Ok(from)
    }

    /// Move to Failed, recording the error and emitting exactly one Error event
    ///
    /// Returns false if the session was already terminal, in which case the
    /// error is only logged.
    pub(crate) fn fail(&self, err: &RecorderError) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state.is_terminal() {
            debug!(session = %self.id, "Ignoring failure after {}: {}", lifecycle.state, err);
            return false;
        }

        error!(session = %self.id, "Session failed in {}: {}", lifecycle.state, err);
        self.errors.record(err);
        self.apply(&mut lifecycle, SessionState::Failed, Some(Event::Error(err.kind())));
        drop(lifecycle);

        self.queues.close();
        true
    }

    fn apply(&self, lifecycle: &mut Lifecycle, to: SessionState, event: Option<Event>) {
        let from = lifecycle.state;
        lifecycle.state = to;

        match to {
            SessionState::Running => {
                lifecycle.started_at = Some(Instant::now());
                lifecycle.started_wall = Some(Utc::now());
            }
            SessionState::Stopped | SessionState::Failed => {
                if lifecycle.started_at.is_some() {
                    lifecycle.ended_at = Some(Instant::now());
                }
            }
            _ => {}
        }

        if let Some(event) = event {
            self.events.publish(event);
        }
        self.state_tx.send_replace(to);
        info!(session = %self.id, "State {} -> {}", from, to);
    }

    /// Count a unit handed to the encoder; video units raise a Frame event while running
    pub(crate) fn record_written(&self, kind: StreamKind) {
        match kind {
            StreamKind::Video => {
                self.video_written.fetch_add(1, Ordering::Relaxed);
                let lifecycle = self.lifecycle.lock();
                if lifecycle.state == SessionState::Running {
                    self.events.publish(Event::Frame);
                }
            }
            StreamKind::Audio => {
                self.audio_written.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn written(&self, kind: StreamKind) -> u64 {
        match kind {
            StreamKind::Video => self.video_written.load(Ordering::Relaxed),
            StreamKind::Audio => self.audio_written.load(Ordering::Relaxed),
        }
    }

    /// Recorded wall time
    ///
    /// Zero until the session is running and a unit has been accepted;
    /// frozen once the session reaches a terminal state.
    pub(crate) fn duration(&self) -> Duration {
        let lifecycle = self.lifecycle.lock();
        let accepted =
            self.queues.video.counters().accepted + self.queues.audio.counters().accepted;
        if accepted == 0 {
            return Duration::ZERO;
        }

        match (lifecycle.started_at, lifecycle.ended_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}
