use super::config::SessionConfig;
use super::error::{ErrorRecord, RecorderError, RecorderResult};
use super::events::Event;
use super::shared::Shared;
use super::state::SessionState;
use super::stats::{SessionStats, StreamStats};
use crate::capture::{CaptureSource, FrameSink};
use crate::encoder::MediaEncoder;
use crate::media::{AudioBatch, MediaUnit, StreamKind, VideoFrame};
use futures::Stream;
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Units moved from each queue per consumer pass
const WRITE_BATCH: usize = 32;

type ConsumerHandle = JoinHandle<RecorderResult<Box<dyn MediaEncoder>>>;

/// Coordinates one recording session
///
/// Owns the capture source, the encoder and the task that moves units
/// between them. All lifecycle calls are serialized; state queries never
/// wait for a lifecycle call to finish.
pub struct SessionCoordinator {
    config: SessionConfig,
    shared: Arc<Shared>,
    source: Mutex<Box<dyn CaptureSource>>,
    /// Held here until `start` hands it to the consumer task
    encoder: Mutex<Option<Box<dyn MediaEncoder>>>,
    consumer: Mutex<Option<ConsumerHandle>>,
    transition: Mutex<()>,
    output_files: parking_lot::Mutex<Vec<PathBuf>>,
    this: Weak<SessionCoordinator>,
}

impl SessionCoordinator {
    /// Create a session in the Created state
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: SessionConfig,
        source: Box<dyn CaptureSource>,
        encoder: Box<dyn MediaEncoder>,
    ) -> RecorderResult<Arc<Self>> {
        config.validate()?;

        let shared = Arc::new(Shared::new(&config));
        info!(
            session = %shared.id,
            "Creating recording session: {} ({} -> {})",
            config.output_path.display(),
            source.name(),
            encoder.name()
        );

        Ok(Arc::new_cyclic(|this| Self {
            config,
            shared,
            source: Mutex::new(source),
            encoder: Mutex::new(Some(encoder)),
            consumer: Mutex::new(None),
            transition: Mutex::new(()),
            output_files: parking_lot::Mutex::new(Vec::new()),
            this: this.clone(),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Follow state changes
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.watch_state()
    }

    /// Recorded duration; see [`SessionCoordinator::duration_secs`]
    pub fn duration(&self) -> Duration {
        self.shared.duration()
    }

    /// Seconds recorded so far, frozen once the session ends
    pub fn duration_secs(&self) -> f64 {
        self.duration().as_secs_f64()
    }

    /// Most recent failure; reading does not clear it
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.shared.errors.snapshot()
    }

    /// Files produced by the encoder, once finalized
    pub fn output_files(&self) -> Vec<PathBuf> {
        self.output_files.lock().clone()
    }

    /// Register the event observer, replacing any previous one
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.shared.events.set_observer(Some(Arc::new(observer)));
    }

    pub fn clear_observer(&self) {
        self.shared.events.set_observer(None);
    }

    /// Receive events as a stream
    ///
    /// Takes the observer slot; the stream ends when another observer
    /// replaces it or the session is dropped.
    pub fn subscribe(&self) -> impl Stream<Item = Event> + Unpin {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        self.set_observer(move |event| {
            let _ = tx.unbounded_send(event);
        });
        rx
    }

    pub fn stats(&self) -> SessionStats {
        let queues = &self.shared.queues;
        SessionStats {
            id: self.shared.id,
            state: self.shared.state(),
            started_at: self.shared.started_wall(),
            duration_secs: self.duration_secs(),
            video: StreamStats::new(queues.video.counters(), self.shared.written(StreamKind::Video)),
            audio: StreamStats::new(queues.audio.counters(), self.shared.written(StreamKind::Audio)),
            output_files: self.output_files(),
            last_error: self.last_error(),
        }
    }

    /// Start capturing
    ///
    /// Returns once the source is delivering and Started has been handed to
    /// the observer.
    pub async fn start(&self) -> RecorderResult<()> {
        let _transition = self.transition.lock().await;

        let state = self.shared.state();
        if state != SessionState::Created {
            warn!(session = %self.shared.id, "Start rejected in state {}", state);
            return Err(RecorderError::AlreadyStarted);
        }

        if let Err(e) = self.preflight().await {
            error!(session = %self.shared.id, "Start rejected: {}", e);
            self.shared.errors.record(&e);
            return Err(e);
        }

        if self.shared.transition(SessionState::Starting, None).is_err() {
            return Err(RecorderError::AlreadyStarted);
        }
        self.spawn_supervisor();

        let result = match self
            .guarded("start", self.config.timeouts.start(), self.bring_up())
            .await
        {
            Ok(()) => self
                .shared
                .transition(SessionState::Running, Some(Event::Started))
                .map(|_| info!(session = %self.shared.id, "Recording started"))
                .map_err(|_| self.recorded_failure()),
            Err(e) => {
                self.shared.fail(&e);
                // Settle the output before returning so callers never see a half-open file
                self.release_collaborators(self.config.timeouts.release()).await;
                Err(e)
            }
        };

        self.flush_events(self.config.timeouts.start()).await;
        result
    }

    /// Stop capturing, drain queued units and finalize the output
    pub async fn stop(&self) -> RecorderResult<()> {
        self.stop_within(self.config.timeouts.stop()).await
    }

    /// [`SessionCoordinator::stop`] with an explicit bound
    pub async fn stop_within(&self, limit: Duration) -> RecorderResult<()> {
        let _transition = self.transition.lock().await;

        if let Err(current) = self.shared.transition(SessionState::Stopping, None) {
            warn!(session = %self.shared.id, "Stop rejected in state {}", current);
            return Err(RecorderError::NotRunning);
        }
        self.shared.queues.close();

        let result = match self.guarded("stop", limit, self.drain_and_finalize()).await {
            Ok(files) => {
                *self.output_files.lock() = files;
                self.shared
                    .transition(SessionState::Stopped, Some(Event::Stopped))
                    .map(|_| {
                        info!(
                            session = %self.shared.id,
                            "Recording stopped after {:.2}s",
                            self.duration_secs()
                        )
                    })
                    .map_err(|_| self.recorded_failure())
            }
            Err(e) => {
                self.shared.fail(&e);
                Err(e)
            }
        };

        self.flush_events(limit).await;
        result
    }

    /// Release everything the session holds
    ///
    /// An active session is stopped first, bounded by the release timeout.
    pub async fn shutdown(&self) {
        self.shutdown_within(self.config.timeouts.release()).await
    }

    /// [`SessionCoordinator::shutdown`] with an explicit bound
    pub async fn shutdown_within(&self, limit: Duration) {
        match self.shared.state() {
            SessionState::Starting | SessionState::Running => {
                if let Err(e) = self.stop_within(limit).await {
                    warn!(session = %self.shared.id, "Stop during release failed: {}", e);
                    self.teardown(limit).await;
                }
            }
            SessionState::Stopping | SessionState::Failed => self.teardown(limit).await,
            SessionState::Created | SessionState::Stopped => {}
        }

        self.shared.queues.close();
        self.flush_events(limit).await;
        debug!(session = %self.shared.id, "Session released");
    }

    async fn preflight(&self) -> RecorderResult<()> {
        self.config.validate()?;
        self.config.check_output_writable()?;

        let source = self.source.lock().await;

        let displays = source.displays();
        let display_id = self.config.display_id;
        if display_id != 0 && !displays.is_empty() && !displays.iter().any(|d| d.id == display_id) {
            return Err(RecorderError::InvalidConfig(format!(
                "display {} is not available from {}",
                display_id,
                source.name()
            )));
        }

        if let (true, Some(device_id)) = (self.config.capture_audio, &self.config.audio_device_id) {
            let devices = source.audio_devices();
            if !devices.is_empty() && !devices.iter().any(|d| &d.id == device_id) {
                return Err(RecorderError::InvalidConfig(format!(
                    "audio device {} is not available from {}",
                    device_id,
                    source.name()
                )));
            }
        }

        Ok(())
    }

    async fn bring_up(&self) -> RecorderResult<()> {
        let mut encoder = self
            .encoder
            .lock()
            .await
            .take()
            .ok_or_else(|| RecorderError::InitFailed("encoder already consumed".to_string()))?;

        encoder.open(&self.config).await.map_err(|e| {
            RecorderError::InitFailed(format!("{} failed to open: {:#}", encoder.name(), e))
        })?;

        // The consumer runs before the source so early units have somewhere to go
        let consumer = tokio::spawn(consume(Arc::clone(&self.shared), encoder));
        *self.consumer.lock().await = Some(consumer);

        let sink = FrameSink::new(Arc::clone(&self.shared));
        let mut source = self.source.lock().await;
        source.start(&self.config, sink).await.map_err(|e| {
            RecorderError::InitFailed(format!("{} failed to start: {:#}", source.name(), e))
        })
    }

    async fn drain_and_finalize(&self) -> RecorderResult<Vec<PathBuf>> {
        {
            let mut source = self.source.lock().await;
            if let Err(e) = source.stop().await {
                warn!(session = %self.shared.id, "{} did not stop cleanly: {:#}", source.name(), e);
            }
        }

        let consumer = self
            .consumer
            .lock()
            .await
            .take()
            .ok_or_else(|| RecorderError::FinalizeFailed("no encoder to finalize".to_string()))?;

        let mut encoder = match consumer.await {
            Ok(Ok(encoder)) => encoder,
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(RecorderError::EncodeFailed(format!("encoder task failed: {}", e))),
        };

        encoder.finalize().await.map_err(|e| {
            RecorderError::FinalizeFailed(format!("{} failed to finalize: {:#}", encoder.name(), e))
        })
    }

    /// Release collaborators after a failure; safe to call repeatedly
    async fn teardown(&self, limit: Duration) {
        let _transition = self.transition.lock().await;
        self.release_collaborators(limit).await;
    }

    /// Stop the source and settle the encoder output
    ///
    /// Whatever was encoded before the failure is finalized best-effort. An
    /// output that never received a unit is discarded. Callers hold the
    /// transition lock.
    async fn release_collaborators(&self, limit: Duration) {
        self.shared.queues.close();

        let work = async {
            {
                let mut source = self.source.lock().await;
                if source.is_capturing() {
                    if let Err(e) = source.stop().await {
                        warn!(session = %self.shared.id, "{} did not stop cleanly: {:#}", source.name(), e);
                    }
                }
            }

            let consumer = self.consumer.lock().await.take();
            let Some(consumer) = consumer else {
                return;
            };
            let mut encoder = match consumer.await {
                Ok(Ok(encoder)) => encoder,
                Ok(Err(_)) => return,
                Err(e) => {
                    error!(session = %self.shared.id, "Encoder task failed: {}", e);
                    return;
                }
            };

            let written = self.shared.written(StreamKind::Video) + self.shared.written(StreamKind::Audio);
            if written == 0 {
                match encoder.abort().await {
                    Ok(()) => info!(session = %self.shared.id, "Empty output discarded"),
                    Err(e) => warn!(session = %self.shared.id, "Could not discard empty output: {:#}", e),
                }
                return;
            }

            match encoder.finalize().await {
                Ok(files) => {
                    info!(session = %self.shared.id, "Partial output kept: {:?}", files);
                    *self.output_files.lock() = files;
                }
                Err(e) => warn!(session = %self.shared.id, "Could not finalize partial output: {:#}", e),
            }
        };

        if tokio::time::timeout(limit, work).await.is_err() {
            warn!(
                session = %self.shared.id,
                "Teardown exceeded {}ms, abandoning collaborators",
                limit.as_millis()
            );
        }
    }

    /// Tear down automatically once the session fails
    fn spawn_supervisor(&self) {
        let this = self.this.clone();
        let mut state_rx = self.shared.watch_state();
        let limit = self.config.timeouts.release();

        tokio::spawn(async move {
            let reached = state_rx.wait_for(|state| state.is_terminal()).await.map(|state| *state);
            if !matches!(reached, Ok(SessionState::Failed)) {
                return;
            }
            if let Some(coordinator) = this.upgrade() {
                coordinator.teardown(limit).await;
            }
        });
    }

    /// Run `work` until it finishes, the session fails, or `limit` passes
    async fn guarded<T, F>(&self, operation: &str, limit: Duration, work: F) -> RecorderResult<T>
    where
        F: Future<Output = RecorderResult<T>>,
    {
        let mut state_rx = self.shared.watch_state();
        let failed = async move {
            let _ = state_rx.wait_for(|state| *state == SessionState::Failed).await;
        };
        tokio::select! {
            result = work => result,
            _ = failed => Err(self.recorded_failure()),
            _ = tokio::time::sleep(limit) => Err(RecorderError::Timeout(format!(
                "{} did not complete within {}ms",
                operation,
                limit.as_millis()
            ))),
        }
    }

    fn recorded_failure(&self) -> RecorderError {
        self.shared
            .errors
            .snapshot()
            .map(|record| record.to_error())
            .unwrap_or_else(|| RecorderError::InitFailed("session failed".to_string()))
    }

    /// Wait for the observer to receive everything published so far
    async fn flush_events(&self, limit: Duration) {
        if tokio::time::timeout(limit, self.shared.events.flush()).await.is_err() {
            warn!(
                session = %self.shared.id,
                "Event observer still busy after {}ms",
                limit.as_millis()
            );
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        // Lets the consumer task finish if the session was never shut down
        self.shared.queues.close();
    }
}

/// Move units from the queues to the encoder until both queues are drained
async fn consume(
    shared: Arc<Shared>,
    mut encoder: Box<dyn MediaEncoder>,
) -> RecorderResult<Box<dyn MediaEncoder>> {
    let mut video = VecDeque::with_capacity(WRITE_BATCH);
    let mut audio = VecDeque::with_capacity(WRITE_BATCH);
    debug!(session = %shared.id, "Encoder task started");

    loop {
        shared.queues.video.drain_into(&mut video, WRITE_BATCH);
        shared.queues.audio.drain_into(&mut audio, WRITE_BATCH);

        if video.is_empty() && audio.is_empty() {
            if shared.queues.is_drained() {
                break;
            }
            shared.queues.wait().await;
            continue;
        }

        while let Some(unit) = next_unit(&mut video, &mut audio) {
            let kind = unit.kind();
            if let Err(e) = encoder.write(unit).await {
                let err = RecorderError::EncodeFailed(format!(
                    "{} rejected a {} unit: {:#}",
                    encoder.name(),
                    kind,
                    e
                ));
                shared.fail(&err);
                return Err(err);
            }
            shared.record_written(kind);
        }
    }

    debug!(
        session = %shared.id,
        "Encoder task finished: {} video, {} audio units",
        shared.written(StreamKind::Video),
        shared.written(StreamKind::Audio)
    );
    Ok(encoder)
}

/// Earliest pending unit across both streams; each stream keeps its own order
fn next_unit(video: &mut VecDeque<VideoFrame>, audio: &mut VecDeque<AudioBatch>) -> Option<MediaUnit> {
    let take_audio = match (video.front(), audio.front()) {
        (Some(v), Some(a)) => a.timestamp_ms < v.timestamp_ms,
        (None, Some(_)) => true,
        _ => false,
    };

    if take_audio {
        audio.pop_front().map(MediaUnit::from)
    } else {
        video.pop_front().map(MediaUnit::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts: u64) -> VideoFrame {
        VideoFrame {
            data: Vec::new(),
            width: 2,
            height: 2,
            timestamp_ms: ts,
        }
    }

    fn batch(ts: u64) -> AudioBatch {
        AudioBatch {
            samples: Vec::new(),
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_next_unit_interleaves_by_timestamp() {
        let mut video: VecDeque<_> = vec![frame(0), frame(33), frame(66)].into();
        let mut audio: VecDeque<_> = vec![batch(10), batch(20), batch(40)].into();

        let mut order = Vec::new();
        while let Some(unit) = next_unit(&mut video, &mut audio) {
            order.push((unit.kind(), unit.timestamp_ms()));
        }

        assert_eq!(
            order,
            vec![
                (StreamKind::Video, 0),
                (StreamKind::Audio, 10),
                (StreamKind::Audio, 20),
                (StreamKind::Video, 33),
                (StreamKind::Audio, 40),
                (StreamKind::Video, 66),
            ]
        );
    }
}
