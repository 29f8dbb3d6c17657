//! Bounded per-stream handoff between capture threads and the encoder task
//!
//! Producers push from arbitrary threads and never wait for the consumer:
//! a push holds the queue lock for a constant amount of work and returns.
//! The single consumer is woken through a shared [`Notify`].

use super::config::{HandoffConfig, OverflowPolicy};
use crate::media::{AudioBatch, StreamKind, VideoFrame};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// What happened to a pushed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued
    Accepted,
    /// Queued after evicting the oldest queued unit
    DroppedOldest,
    /// Refused because the queue is full
    Rejected,
    /// Refused because the queue no longer takes units
    Closed,
}

impl PushOutcome {
    /// Whether a unit (new or evicted) was lost
    pub fn lost_unit(self) -> bool {
        matches!(self, PushOutcome::DroppedOldest | PushOutcome::Rejected)
    }
}

/// Counters of a single queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    pub accepted: u64,
    pub dropped: u64,
    pub depth: usize,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
    accepted: u64,
    dropped: u64,
}

/// Bounded FIFO with an explicit overflow policy
pub struct HandoffQueue<T> {
    kind: StreamKind,
    capacity: usize,
    policy: OverflowPolicy,
    inner: Mutex<QueueInner<T>>,
    wake: Arc<Notify>,
}

impl<T> HandoffQueue<T> {
    pub fn new(kind: StreamKind, capacity: usize, policy: OverflowPolicy, wake: Arc<Notify>) -> Self {
        Self {
            kind,
            capacity: capacity.max(1),
            policy,
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
                accepted: 0,
                dropped: 0,
            }),
            wake,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn push(&self, item: T) -> PushOutcome {
        // Evicted or refused units are released after the lock is dropped
        let mut discarded = None;

        let outcome = {
            let mut inner = self.inner.lock();
            if inner.closed {
                discarded = Some(item);
                PushOutcome::Closed
            } else if inner.items.len() < self.capacity {
                inner.items.push_back(item);
                inner.accepted += 1;
                PushOutcome::Accepted
            } else {
                inner.dropped += 1;
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        discarded = inner.items.pop_front();
                        inner.items.push_back(item);
                        inner.accepted += 1;
                        PushOutcome::DroppedOldest
                    }
                    OverflowPolicy::RejectNew => {
                        discarded = Some(item);
                        PushOutcome::Rejected
                    }
                }
            }
        };

        drop(discarded);
        if matches!(outcome, PushOutcome::Accepted | PushOutcome::DroppedOldest) {
            self.wake.notify_one();
        }
        outcome
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Move up to `max` units, oldest first, into `out`
    pub fn drain_into(&self, out: &mut VecDeque<T>, max: usize) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.items.len().min(max);
        out.extend(inner.items.drain(..n));
        n
    }

    /// Stop accepting units; queued units stay available to the consumer
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closed and nothing left to deliver
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock();
        inner.closed && inner.items.is_empty()
    }

    pub fn counters(&self) -> QueueCounters {
        let inner = self.inner.lock();
        QueueCounters {
            accepted: inner.accepted,
            dropped: inner.dropped,
            depth: inner.items.len(),
        }
    }
}

/// The video and audio queues of one session, sharing one consumer wakeup
pub struct StreamQueues {
    pub video: HandoffQueue<VideoFrame>,
    pub audio: HandoffQueue<AudioBatch>,
    wake: Arc<Notify>,
}

impl StreamQueues {
    pub fn new(config: &HandoffConfig) -> Self {
        let wake = Arc::new(Notify::new());
        Self {
            video: HandoffQueue::new(
                StreamKind::Video,
                config.video_capacity,
                config.video_overflow,
                Arc::clone(&wake),
            ),
            audio: HandoffQueue::new(
                StreamKind::Audio,
                config.audio_capacity,
                config.audio_overflow,
                Arc::clone(&wake),
            ),
            wake,
        }
    }

    pub fn close(&self) {
        self.video.close();
        self.audio.close();
    }

    pub fn is_drained(&self) -> bool {
        self.video.is_drained() && self.audio.is_drained()
    }

    /// Wait until a producer pushes or a queue is closed
    pub async fn wait(&self) {
        self.wake.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize, policy: OverflowPolicy) -> HandoffQueue<u32> {
        HandoffQueue::new(StreamKind::Video, capacity, policy, Arc::new(Notify::new()))
    }

    #[test]
    fn test_drop_oldest_keeps_newest_in_order() {
        let q = queue(3, OverflowPolicy::DropOldest);
        for i in 0..5 {
            q.push(i);
        }

        let mut out = VecDeque::new();
        q.drain_into(&mut out, 10);
        assert_eq!(out, VecDeque::from(vec![2, 3, 4]));

        let counters = q.counters();
        assert_eq!(counters.accepted, 5);
        assert_eq!(counters.dropped, 2);
        assert_eq!(counters.depth, 0);
    }

    #[test]
    fn test_reject_new_keeps_oldest() {
        let q = queue(2, OverflowPolicy::RejectNew);
        assert_eq!(q.push(1), PushOutcome::Accepted);
        assert_eq!(q.push(2), PushOutcome::Accepted);
        assert_eq!(q.push(3), PushOutcome::Rejected);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_closed_queue_refuses_but_drains() {
        let q = queue(4, OverflowPolicy::DropOldest);
        q.push(7);
        q.close();
        assert_eq!(q.push(8), PushOutcome::Closed);
        assert!(!q.is_drained());
        assert_eq!(q.pop(), Some(7));
        assert!(q.is_drained());
    }

    #[tokio::test]
    async fn test_push_wakes_consumer() {
        let queues = Arc::new(StreamQueues::new(&HandoffConfig::default()));

        let consumer = {
            let queues = Arc::clone(&queues);
            tokio::spawn(async move {
                loop {
                    if let Some(batch) = queues.audio.pop() {
                        return batch.timestamp_ms;
                    }
                    queues.wait().await;
                }
            })
        };

        let producer = Arc::clone(&queues);
        std::thread::spawn(move || {
            producer.audio.push(AudioBatch {
                samples: vec![0; 4],
                sample_rate: 48000,
                channels: 2,
                timestamp_ms: 42,
            });
        });

        let ts = tokio::time::timeout(std::time::Duration::from_secs(2), consumer)
            .await
            .expect("consumer woken")
            .unwrap();
        assert_eq!(ts, 42);
    }
}
