//! Fetch scheduler
//!
//! Ensures at most one outstanding synthesis call per segment id. Every
//! caller of [`FetchScheduler::schedule_fetch`] for an in-flight segment
//! shares the original attempt's outcome; a segment that is already
//! buffered resolves immediately with no network call. Failed attempts are
//! terminal until some later trigger (manual reselection, a later prefetch,
//! or an explicit [`FetchScheduler::retry`]) schedules a fresh attempt —
//! there is no automatic retry, backoff, or scheduler-imposed timeout.

use crate::audio::probe;
use crate::backend::TtsClient;
use crate::error::{Error, Result};
use crate::playback::buffer::{BufferEntry, BufferStore};
use crate::playback::events::EngineEvent;
use duocast_common::events::PlayerEvent;
use duocast_common::models::{Catalog, SegmentDescriptor, SegmentId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, info, warn};

/// Fetch lifecycle for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    NotFetched,
    InFlight,
    Ready,
    Failed,
}

/// Shared outcome of one fetch attempt (error collapsed to display text so
/// every waiter can observe it).
type FetchOutcome = std::result::Result<(), String>;

/// Transient per-segment bookkeeping.
#[derive(Debug)]
struct FetchRecord {
    status: FetchStatus,

    /// Incremented on every attempt, never reset.
    attempt_count: u32,

    /// Outcome channel of the current in-flight attempt.
    outcome_rx: Option<watch::Receiver<Option<FetchOutcome>>>,
}

impl FetchRecord {
    fn new() -> Self {
        Self {
            status: FetchStatus::NotFetched,
            attempt_count: 0,
            outcome_rx: None,
        }
    }
}

/// Schedules and de-duplicates per-segment synthesis fetches.
#[derive(Clone)]
pub struct FetchScheduler {
    catalog: Arc<Catalog>,
    buffer: BufferStore,
    tts: Arc<dyn TtsClient>,
    records: Arc<RwLock<HashMap<SegmentId, FetchRecord>>>,
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
    events: broadcast::Sender<PlayerEvent>,
}

impl FetchScheduler {
    pub fn new(
        catalog: Arc<Catalog>,
        buffer: BufferStore,
        tts: Arc<dyn TtsClient>,
        engine_tx: mpsc::UnboundedSender<EngineEvent>,
        events: broadcast::Sender<PlayerEvent>,
    ) -> Self {
        Self {
            catalog,
            buffer,
            tts,
            records: Arc::new(RwLock::new(HashMap::new())),
            engine_tx,
            events,
        }
    }

    /// Schedule a fetch for `segment_id`, returning once the segment's
    /// buffer entry exists or the underlying synthesis call fails.
    ///
    /// - Already buffered: resolves immediately, no network call.
    /// - Already in flight: awaits the original attempt's shared outcome.
    /// - Otherwise: starts a fresh attempt (attempt count incremented).
    pub async fn schedule_fetch(&self, segment_id: SegmentId) -> Result<()> {
        let segment = self
            .catalog
            .get(segment_id)
            .cloned()
            .ok_or(Error::SegmentNotFound(segment_id))?;

        if self.buffer.has_entry(segment_id).await {
            return Ok(());
        }

        let mut rx = {
            let mut records = self.records.write().await;
            let record = records.entry(segment_id).or_insert_with(FetchRecord::new);

            match record.status {
                FetchStatus::Ready => return Ok(()),
                FetchStatus::InFlight => record.outcome_rx.clone().ok_or_else(|| {
                    Error::Internal("in-flight fetch without outcome channel".to_string())
                })?,
                FetchStatus::NotFetched | FetchStatus::Failed => {
                    record.attempt_count += 1;
                    record.status = FetchStatus::InFlight;

                    let attempt = record.attempt_count;
                    let (tx, rx) = watch::channel(None);
                    record.outcome_rx = Some(rx.clone());

                    info!("Fetch attempt {} for segment {}", attempt, segment_id);
                    self.emit(PlayerEvent::FetchStarted {
                        segment_id,
                        attempt,
                        timestamp: chrono::Utc::now(),
                    });

                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.run_attempt(segment, tx).await;
                    });

                    rx
                }
            }
        };

        let outcome = rx
            .wait_for(|o| o.is_some())
            .await
            .map_err(|_| Error::Internal("fetch task dropped before completing".to_string()))?
            .clone();

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(message)) => Err(Error::Tts(message)),
            None => Err(Error::Internal("fetch resolved without outcome".to_string())),
        }
    }

    /// Explicit retry of a previously failed segment. Identical to
    /// [`schedule_fetch`](Self::schedule_fetch): a fresh attempt unless the
    /// segment is buffered or already in flight.
    pub async fn retry(&self, segment_id: SegmentId) -> Result<()> {
        self.schedule_fetch(segment_id).await
    }

    /// Fire-and-forget fetch, used for background prefetch. The outcome is
    /// still delivered to the engine channel and the status feed.
    pub fn spawn_fetch(&self, segment_id: SegmentId) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.schedule_fetch(segment_id).await {
                debug!("Background fetch of segment {} failed: {}", segment_id, e);
            }
        });
    }

    pub async fn status(&self, segment_id: SegmentId) -> FetchStatus {
        self.records
            .read()
            .await
            .get(&segment_id)
            .map(|r| r.status)
            .unwrap_or(FetchStatus::NotFetched)
    }

    pub async fn attempt_count(&self, segment_id: SegmentId) -> u32 {
        self.records
            .read()
            .await
            .get(&segment_id)
            .map(|r| r.attempt_count)
            .unwrap_or(0)
    }

    /// Attempt counts for every segment that has seen at least one attempt.
    pub async fn attempts(&self) -> HashMap<SegmentId, u32> {
        self.records
            .read()
            .await
            .iter()
            .map(|(id, record)| (*id, record.attempt_count))
            .collect()
    }

    pub async fn is_in_flight(&self, segment_id: SegmentId) -> bool {
        self.status(segment_id).await == FetchStatus::InFlight
    }

    /// Run one synthesis attempt to completion and publish its outcome to
    /// all waiters, the engine channel, and the status feed.
    async fn run_attempt(
        self,
        segment: SegmentDescriptor,
        outcome_tx: watch::Sender<Option<FetchOutcome>>,
    ) {
        let segment_id = segment.segment_id;

        match self.tts.synthesize(segment_id, segment.turns()).await {
            Ok(audio) => {
                let entry = BufferEntry::new(segment_id, audio.audio, audio.mime_type);
                self.buffer.put(entry).await;

                if let Some(record) = self.records.write().await.get_mut(&segment_id) {
                    record.status = FetchStatus::Ready;
                    record.outcome_rx = None;
                }

                info!("Segment {} fetched and buffered", segment_id);
                self.emit(PlayerEvent::FetchSucceeded {
                    segment_id,
                    timestamp: chrono::Utc::now(),
                });
                let _ = self.engine_tx.send(EngineEvent::FetchCompleted {
                    segment_id,
                    result: Ok(()),
                });
                let _ = outcome_tx.send(Some(Ok(())));

                self.spawn_probe(segment_id);
            }
            Err(e) => {
                let message = e.to_string();

                if let Some(record) = self.records.write().await.get_mut(&segment_id) {
                    record.status = FetchStatus::Failed;
                    record.outcome_rx = None;
                }

                warn!("Segment {} fetch failed: {}", segment_id, message);
                self.emit(PlayerEvent::FetchFailed {
                    segment_id,
                    error: message.clone(),
                    timestamp: chrono::Utc::now(),
                });
                let _ = self.engine_tx.send(EngineEvent::FetchCompleted {
                    segment_id,
                    result: Err(message.clone()),
                });
                let _ = outcome_tx.send(Some(Err(message)));
            }
        }
    }

    /// Probe the freshly buffered payload for its duration on a blocking
    /// worker. Probe failure is non-fatal: the entry keeps duration 0.
    fn spawn_probe(&self, segment_id: SegmentId) {
        let buffer = self.buffer.clone();
        let engine_tx = self.engine_tx.clone();

        tokio::spawn(async move {
            let entry = match buffer.get(segment_id).await {
                Ok(entry) => entry,
                Err(_) => return,
            };

            let audio = Arc::clone(&entry.audio);
            let mime_type = entry.mime_type.clone();
            let probed = tokio::task::spawn_blocking(move || {
                probe::probe_duration(&audio, &mime_type)
            })
            .await;

            match probed {
                Ok(Ok(seconds)) => {
                    buffer.set_duration(segment_id, seconds).await;
                    let _ = engine_tx.send(EngineEvent::DurationProbed {
                        segment_id,
                        duration_seconds: seconds,
                    });
                }
                Ok(Err(e)) => {
                    debug!("Duration probe failed for segment {}: {}", segment_id, e);
                }
                Err(e) => {
                    debug!("Duration probe task failed for segment {}: {}", segment_id, e);
                }
            }
        });
    }

    fn emit(&self, event: PlayerEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}
