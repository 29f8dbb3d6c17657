use crate::media::{AudioBatch, VideoFrame};
use crate::session::queue::PushOutcome;
use crate::session::shared::Shared;
use crate::session::RecorderError;
use std::sync::Arc;
use tracing::{trace, warn};

/// Handle a capture source pushes units into
///
/// Cheap to clone and safe to use from any thread. Every call returns
/// without waiting for the encoder.
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<Shared>,
}

impl FrameSink {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Hand over a video frame
    ///
    /// Under pressure the oldest queued frame is evicted; losing video never
    /// fails the session.
    pub fn push_video(&self, frame: VideoFrame) -> PushOutcome {
        let outcome = self.shared.queues.video.push(frame);
        match outcome {
            PushOutcome::DroppedOldest | PushOutcome::Rejected => {
                let dropped = self.shared.queues.video.counters().dropped;
                // First drop and then every hundredth, to keep the log readable
                if dropped == 1 || dropped % 100 == 0 {
                    warn!(session = %self.shared.id, "Video queue full, {} frames dropped so far", dropped);
                }
            }
            PushOutcome::Closed => trace!("Video frame after close discarded"),
            PushOutcome::Accepted => {}
        }
        outcome
    }

    /// Hand over an audio batch
    ///
    /// Any audio loss fails the session with `AudioDropped`.
    pub fn push_audio(&self, batch: AudioBatch) -> PushOutcome {
        let timestamp_ms = batch.timestamp_ms;
        let outcome = self.shared.queues.audio.push(batch);
        match outcome {
            PushOutcome::DroppedOldest | PushOutcome::Rejected => {
                let capacity = self.shared.queues.audio.capacity();
                self.shared.fail(&RecorderError::AudioDropped(format!(
                    "audio queue full ({} batches), batch at {}ms lost",
                    capacity, timestamp_ms
                )));
            }
            PushOutcome::Closed => trace!("Audio batch after close discarded"),
            PushOutcome::Accepted => {}
        }
        outcome
    }

    /// Report that the capture device went away
    pub fn device_lost(&self, reason: impl Into<String>) {
        self.shared.fail(&RecorderError::DeviceLost(reason.into()));
    }

    /// Whether units pushed now can still be accepted
    pub fn is_open(&self) -> bool {
        !self.shared.queues.video.is_closed()
    }
}
