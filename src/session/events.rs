//! Session events and their single-observer delivery
//!
//! Events are queued in publication order and handed to the observer from a
//! dedicated dispatch task, never from a capture thread. Once a terminal
//! event (Stopped or Error) has been published the bus is sealed and any
//! later publication is discarded.
//!
//! Frame events are coalesced: at most one Frame waits for delivery, so a
//! slow observer sees fewer Frame events instead of an ever-growing backlog.

use super::error::ErrorKind;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Notification delivered to the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "kind", rename_all = "lowercase")]
pub enum Event {
    Started,
    Stopped,
    /// The session failed; details are in the last-error slot
    Error(ErrorKind),
    /// A video frame reached the encoder
    Frame,
}

pub const EVENT_STARTED: i32 = 0;
pub const EVENT_STOPPED: i32 = 1;
pub const EVENT_ERROR: i32 = 2;
pub const EVENT_FRAME: i32 = 3;

impl Event {
    /// Ordinal delivered across the C boundary
    pub fn code(&self) -> i32 {
        match self {
            Event::Started => EVENT_STARTED,
            Event::Stopped => EVENT_STOPPED,
            Event::Error(_) => EVENT_ERROR,
            Event::Frame => EVENT_FRAME,
        }
    }

    /// Last event a session can deliver
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Stopped | Event::Error(_))
    }
}

/// Callback receiving session events
pub type Observer = Arc<dyn Fn(Event) + Send + Sync>;

enum Dispatch {
    Deliver(Event),
    Flush(oneshot::Sender<()>),
}

/// Ordered event delivery to at most one observer
pub struct EventBus {
    sealed: Mutex<bool>,
    tx: mpsc::UnboundedSender<Dispatch>,
    observer: Arc<RwLock<Option<Observer>>>,
    /// Set while a Frame is queued and not yet handed to the observer
    frame_pending: Arc<AtomicBool>,
}

impl EventBus {
    /// Create the bus and spawn its dispatch task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = Arc::new(RwLock::new(None));
        let frame_pending = Arc::new(AtomicBool::new(false));
        tokio::spawn(dispatch(rx, Arc::clone(&observer), Arc::clone(&frame_pending)));

        Self {
            sealed: Mutex::new(false),
            tx,
            observer,
            frame_pending,
        }
    }

    /// Install an observer, replacing any previous one
    pub fn set_observer(&self, observer: Option<Observer>) {
        *self.observer.write() = observer;
    }

    pub fn has_observer(&self) -> bool {
        self.observer.read().is_some()
    }

    /// Queue an event for delivery
    ///
    /// Returns false when the bus is already sealed by a terminal event. A
    /// Frame published while another Frame is still queued merges into it.
    pub fn publish(&self, event: Event) -> bool {
        let mut sealed = self.sealed.lock();
        if *sealed {
            debug!("Discarding {:?} published after the terminal event", event);
            return false;
        }
        if event == Event::Frame && self.frame_pending.swap(true, Ordering::AcqRel) {
            return true;
        }
        if event.is_terminal() {
            *sealed = true;
        }
        self.tx.send(Dispatch::Deliver(event)).is_ok()
    }

    pub fn is_sealed(&self) -> bool {
        *self.sealed.lock()
    }

    /// Wait until every event published so far has been handed to the observer
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Dispatch::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
    observer: Arc<RwLock<Option<Observer>>>,
    frame_pending: Arc<AtomicBool>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Dispatch::Deliver(event) => {
                if event == Event::Frame {
                    frame_pending.store(false, Ordering::Release);
                }
                // Clone out of the lock so the callback may replace the observer
                let current = observer.read().clone();
                if let Some(callback) = current {
                    if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                        error!("Event observer panicked while handling {:?}", event);
                    }
                }
            }
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
