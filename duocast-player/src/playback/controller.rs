//! Playback controller
//!
//! The state machine that keeps exactly one segment playing at a time in
//! ascending order. All inputs — listener commands, fetch completions,
//! playout milestones — arrive on a single typed channel and are handled to
//! completion one at a time by the controller task, so no transition ever
//! observes a half-applied peer.
//!
//! States: `Idle` (no catalog) → `Buffering(id)` → `Playing(id)` → `Ended`.
//! Pause rides along with `Playing` as a flag rather than a separate state.

use crate::backend::TtsClient;
use crate::error::Result;
use crate::playback::buffer::BufferStore;
use crate::playback::events::EngineEvent;
use crate::playback::output::AudioOutput;
use crate::playback::progress::ProgressTracker;
use crate::playback::scheduler::FetchScheduler;
use duocast_common::events::PlayerEvent;
use duocast_common::models::{Catalog, SegmentId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

/// Playback state visible to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// No catalog loaded.
    #[default]
    Idle,

    /// Waiting for the segment's buffer entry.
    Buffering(SegmentId),

    /// Segment playout in progress (possibly paused).
    Playing(SegmentId),

    /// The last segment finished naturally. Terminal for this catalog.
    Ended,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Buffering(id) => write!(f, "buffering({})", id),
            PlayerState::Playing(id) => write!(f, "playing({})", id),
            PlayerState::Ended => write!(f, "ended"),
        }
    }
}

/// Read-side snapshot of the controller, refreshed after every event.
#[derive(Debug, Clone, Default)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    pub current_segment_id: Option<SegmentId>,

    /// Segments that have fully played; only ever grows within a session.
    pub listened: BTreeSet<SegmentId>,

    /// Actively-playing wall-clock seconds accumulated across play/pause
    /// cycles.
    pub total_listened_seconds: f64,

    pub words_spoken: usize,
    pub total_words: usize,
    pub generated_seconds: f64,

    pub buffered_segments: Vec<SegmentId>,
    pub fetch_attempts: HashMap<SegmentId, u32>,
}

/// Everything owned per loaded catalog. Discarded wholesale (never merged)
/// when a new catalog is loaded.
struct Session {
    catalog: Arc<Catalog>,
    buffer: BufferStore,
    scheduler: FetchScheduler,
    progress: ProgressTracker,

    state: PlayerState,
    current: SegmentId,
    paused: bool,

    /// Start playing as soon as the awaited segment becomes ready. Cleared
    /// only by a pause while still buffering; every other transition into
    /// `Buffering` wants immediate playout.
    pending_autoplay: bool,

    listened: BTreeSet<SegmentId>,
    total_listened_seconds: f64,

    /// Set while actively accumulating listened time; taken on pause, manual
    /// selection away, and natural end.
    play_started_at: Option<Instant>,

    /// Last reported playout position within the current segment.
    position_seconds: f64,
}

/// Handle to a running playback controller task.
///
/// Commands are fire-and-forget sends into the engine channel; observe
/// results through [`subscribe`](Self::subscribe) and
/// [`snapshot`](Self::snapshot).
#[derive(Clone)]
pub struct PlaybackController {
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
    events: broadcast::Sender<PlayerEvent>,
    snapshot: Arc<RwLock<PlayerSnapshot>>,
}

impl PlaybackController {
    /// Spawn the controller task on the current runtime.
    pub fn spawn(tts: Arc<dyn TtsClient>, output: Arc<dyn AudioOutput>) -> Self {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);
        let snapshot = Arc::new(RwLock::new(PlayerSnapshot::default()));

        output.connect(engine_tx.clone());

        let task = ControllerTask {
            tts,
            output,
            engine_tx: engine_tx.clone(),
            events: events.clone(),
            snapshot: Arc::clone(&snapshot),
            session: None,
        };
        tokio::spawn(task.run(engine_rx));

        Self {
            engine_tx,
            events,
            snapshot,
        }
    }

    /// Load a catalog, discarding any prior session state.
    pub fn load_catalog(&self, catalog: Catalog) {
        let _ = self.engine_tx.send(EngineEvent::LoadCatalog(catalog));
    }

    /// Listener-initiated, possibly out-of-order segment selection. Also the
    /// way a failed segment is manually retried.
    pub fn select_segment(&self, segment_id: SegmentId) {
        let _ = self.engine_tx.send(EngineEvent::SelectSegment(segment_id));
    }

    pub fn pause(&self) {
        let _ = self.engine_tx.send(EngineEvent::Pause);
    }

    pub fn resume(&self) {
        let _ = self.engine_tx.send(EngineEvent::Resume);
    }

    /// Stop the controller task. In-flight fetches still run to completion
    /// but nobody consumes their results.
    pub fn shutdown(&self) {
        let _ = self.engine_tx.send(EngineEvent::Shutdown);
    }

    /// Subscribe to the player event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Current read-side snapshot.
    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.read().await.clone()
    }
}

struct ControllerTask {
    tts: Arc<dyn TtsClient>,
    output: Arc<dyn AudioOutput>,
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
    events: broadcast::Sender<PlayerEvent>,
    snapshot: Arc<RwLock<PlayerSnapshot>>,
    session: Option<Session>,
}

impl ControllerTask {
    async fn run(mut self, mut engine_rx: mpsc::UnboundedReceiver<EngineEvent>) {
        while let Some(event) = engine_rx.recv().await {
            if matches!(event, EngineEvent::Shutdown) {
                break;
            }
            self.handle_event(event).await;
            self.refresh_snapshot().await;
        }
        debug!("Playback controller task exited");
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LoadCatalog(catalog) => self.load_catalog(catalog).await,
            EngineEvent::SelectSegment(segment_id) => self.select_segment(segment_id).await,
            EngineEvent::Pause => self.pause().await,
            EngineEvent::Resume => self.resume().await,
            EngineEvent::FetchCompleted { segment_id, result } => {
                self.fetch_completed(segment_id, result).await
            }
            EngineEvent::PlaybackEnded { segment_id } => self.playback_ended(segment_id).await,
            EngineEvent::PositionUpdate {
                segment_id,
                position_seconds,
            } => self.position_update(segment_id, position_seconds).await,
            EngineEvent::DurationProbed { segment_id, .. } => {
                debug!("Duration probed for segment {}", segment_id);
                // Buffer state changed, progress changes with it
                self.emit_progress().await;
            }
            EngineEvent::Shutdown => {}
        }
    }

    /// Transition 1: reset everything, buffer segment 1, fetch it.
    async fn load_catalog(&mut self, catalog: Catalog) {
        if let Some(previous) = self.session.take() {
            if matches!(previous.state, PlayerState::Playing(_)) {
                let _ = self.output.stop().await;
            }
            debug!("Discarding previous session in state {}", previous.state);
        }

        let catalog = Arc::new(catalog);
        let buffer = BufferStore::new();
        let scheduler = FetchScheduler::new(
            Arc::clone(&catalog),
            buffer.clone(),
            Arc::clone(&self.tts),
            self.engine_tx.clone(),
            self.events.clone(),
        );
        let progress = ProgressTracker::new(Arc::clone(&catalog), buffer.clone());

        let first = catalog.first_id();
        info!(
            "Catalog loaded: {} segments, {} words",
            catalog.len(),
            catalog.total_words()
        );
        let _ = self.events.send(PlayerEvent::CatalogLoaded {
            segment_count: catalog.len(),
            total_words: catalog.total_words(),
            timestamp: chrono::Utc::now(),
        });

        let session = Session {
            catalog,
            buffer,
            scheduler,
            progress,
            state: PlayerState::Buffering(first),
            current: first,
            paused: false,
            pending_autoplay: true,
            listened: BTreeSet::new(),
            total_listened_seconds: 0.0,
            play_started_at: None,
            position_seconds: 0.0,
        };

        let _ = self.events.send(PlayerEvent::BufferingStarted {
            segment_id: first,
            timestamp: chrono::Utc::now(),
        });
        session.scheduler.spawn_fetch(first);
        self.session = Some(session);
    }

    /// Transition 2: awaited entry became ready (or its fetch failed).
    async fn fetch_completed(
        &mut self,
        segment_id: SegmentId,
        result: std::result::Result<(), String>,
    ) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match result {
            Ok(()) => {
                // A discarded session's scheduler shares this channel; its
                // completions wrote to the old buffer, so require the entry
                // in the live one before acting
                if session.state == PlayerState::Buffering(segment_id)
                    && session.pending_autoplay
                    && session.buffer.has_entry(segment_id).await
                {
                    self.start_playing(segment_id).await;
                }
            }
            Err(message) => {
                if session.state == PlayerState::Buffering(segment_id) {
                    // The listener sees the error status until a new attempt
                    // is triggered (natural advance or manual reselection)
                    warn!(
                        "Fetch of current segment {} failed, playback stalled: {}",
                        segment_id, message
                    );
                } else {
                    debug!("Prefetch of segment {} failed: {}", segment_id, message);
                }
            }
        }

        self.emit_progress().await;
    }

    /// Begin playout of a buffered segment and prefetch its successor
    /// (transitions 2 and 3).
    async fn start_playing(&mut self, segment_id: SegmentId) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let entry = match session.buffer.get(segment_id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cannot start segment {}: {}", segment_id, e);
                return;
            }
        };

        if let Err(e) = self.output.begin(&entry).await {
            warn!("Failed to start playout of segment {}: {}", segment_id, e);
            return;
        }

        session.state = PlayerState::Playing(segment_id);
        session.paused = false;
        session.position_seconds = 0.0;
        session.play_started_at = Some(Instant::now());

        info!("Playing segment {}/{}", segment_id, session.catalog.len());
        let _ = self.events.send(PlayerEvent::SegmentStarted {
            segment_id,
            segment_count: session.catalog.len(),
            timestamp: chrono::Utc::now(),
        });

        // Prefetch the next segment now that this one is playing
        if let Some(next) = session.catalog.next_id(segment_id) {
            if !session.buffer.has_entry(next).await && !session.scheduler.is_in_flight(next).await
            {
                debug!("Prefetching segment {}", next);
                session.scheduler.spawn_fetch(next);
            }
        }
    }

    /// Transition 4: natural end of a segment.
    async fn playback_ended(&mut self, segment_id: SegmentId) {
        let mut play_now = None;

        {
            let Some(session) = self.session.as_mut() else {
                return;
            };

            if session.state != PlayerState::Playing(segment_id) {
                debug!(
                    "Ignoring stale playback end for segment {} in state {}",
                    segment_id, session.state
                );
                return;
            }

            if let Some(started) = session.play_started_at.take() {
                session.total_listened_seconds += started.elapsed().as_secs_f64();
            }
            session.listened.insert(segment_id);

            info!("Segment {} finished", segment_id);
            let _ = self.events.send(PlayerEvent::SegmentCompleted {
                segment_id,
                timestamp: chrono::Utc::now(),
            });

            match session.catalog.next_id(segment_id) {
                Some(next) => {
                    session.current = next;
                    session.pending_autoplay = true;
                    session.paused = false;
                    session.position_seconds = 0.0;
                    session.state = PlayerState::Buffering(next);
                    let _ = self.events.send(PlayerEvent::BufferingStarted {
                        segment_id: next,
                        timestamp: chrono::Utc::now(),
                    });

                    if session.buffer.has_entry(next).await {
                        // Already prefetched: pass straight through to playing
                        play_now = Some(next);
                    } else {
                        // Covers both an in-flight prefetch (joins it) and an
                        // earlier failure (fresh attempt on natural advance)
                        session.scheduler.spawn_fetch(next);
                    }
                }
                None => {
                    session.state = PlayerState::Ended;
                    info!("Playback complete");
                    let _ = self.events.send(PlayerEvent::PlaybackComplete {
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }

        if let Some(next) = play_now {
            self.start_playing(next).await;
        }
        self.emit_progress().await;
    }

    /// Transition 5: listener-initiated, possibly out-of-order selection.
    /// Cancels nothing; a stale fetch simply completes into the buffer.
    async fn select_segment(&mut self, segment_id: SegmentId) {
        let mut was_playing = false;
        let mut play_now = false;

        {
            let Some(session) = self.session.as_mut() else {
                warn!("Segment {} selected with no catalog loaded", segment_id);
                return;
            };

            if !session.catalog.contains(segment_id) {
                warn!("Selected segment {} is not in the catalog", segment_id);
                return;
            }

            if matches!(session.state, PlayerState::Playing(_)) {
                was_playing = true;
                if let Some(started) = session.play_started_at.take() {
                    if !session.paused {
                        session.total_listened_seconds += started.elapsed().as_secs_f64();
                    }
                }
            }

            info!("Listener selected segment {}", segment_id);
            session.current = segment_id;
            session.pending_autoplay = true;
            session.paused = false;
            session.position_seconds = 0.0;
            session.state = PlayerState::Buffering(segment_id);
            let _ = self.events.send(PlayerEvent::BufferingStarted {
                segment_id,
                timestamp: chrono::Utc::now(),
            });

            if session.buffer.has_entry(segment_id).await {
                play_now = true;
            } else {
                session.scheduler.spawn_fetch(segment_id);
            }
        }

        if was_playing {
            let _ = self.output.stop().await;
        }
        if play_now {
            self.start_playing(segment_id).await;
        }
    }

    /// Transition 6: pause stops listened-time accumulation. While a segment
    /// is still buffering, pause instead parks the pending playout; the
    /// entry may land meanwhile but stays un-played until resume.
    async fn pause(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.state {
            PlayerState::Playing(segment_id) => {
                if session.paused {
                    return;
                }

                let _ = self.output.pause().await;
                if let Some(started) = session.play_started_at.take() {
                    session.total_listened_seconds += started.elapsed().as_secs_f64();
                }
                session.paused = true;

                let _ = self.events.send(PlayerEvent::PlaybackPaused {
                    segment_id,
                    timestamp: chrono::Utc::now(),
                });
            }
            PlayerState::Buffering(segment_id) => {
                if !session.pending_autoplay {
                    return;
                }
                session.pending_autoplay = false;
                debug!("Parked pending playout of segment {}", segment_id);

                let _ = self.events.send(PlayerEvent::PlaybackPaused {
                    segment_id,
                    timestamp: chrono::Utc::now(),
                });
            }
            _ => debug!("Pause ignored in state {}", session.state),
        }
    }

    async fn resume(&mut self) {
        let mut play_now = None;

        {
            let Some(session) = self.session.as_mut() else {
                return;
            };

            match session.state {
                PlayerState::Playing(segment_id) => {
                    if !session.paused {
                        return;
                    }

                    let _ = self.output.resume().await;
                    session.play_started_at = Some(Instant::now());
                    session.paused = false;

                    let _ = self.events.send(PlayerEvent::PlaybackResumed {
                        segment_id,
                        timestamp: chrono::Utc::now(),
                    });
                }
                PlayerState::Buffering(segment_id) => {
                    if session.pending_autoplay {
                        return;
                    }
                    session.pending_autoplay = true;

                    let _ = self.events.send(PlayerEvent::PlaybackResumed {
                        segment_id,
                        timestamp: chrono::Utc::now(),
                    });

                    // The entry may have landed while parked
                    if session.buffer.has_entry(segment_id).await {
                        play_now = Some(segment_id);
                    }
                }
                _ => debug!("Resume ignored in state {}", session.state),
            }
        }

        if let Some(segment_id) = play_now {
            self.start_playing(segment_id).await;
        }
    }

    async fn position_update(&mut self, segment_id: SegmentId, position_seconds: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != PlayerState::Playing(segment_id) {
            return;
        }
        session.position_seconds = position_seconds;
        self.emit_progress().await;
    }

    /// Recompute and broadcast derived progress metrics.
    async fn emit_progress(&self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        let current_listened = matches!(session.state, PlayerState::Ended)
            || session.listened.contains(&session.current);
        let words_spoken = session
            .progress
            .words_spoken(session.current, session.position_seconds, current_listened)
            .await;
        let generated_seconds = session.progress.generated_seconds().await;

        let _ = self.events.send(PlayerEvent::ProgressUpdate {
            words_spoken,
            total_words: session.progress.total_words(),
            generated_seconds,
            timestamp: chrono::Utc::now(),
        });
    }

    async fn refresh_snapshot(&self) {
        let mut snapshot = PlayerSnapshot::default();

        if let Some(session) = &self.session {
            snapshot.state = session.state;
            snapshot.current_segment_id = Some(session.current);
            snapshot.listened = session.listened.clone();
            snapshot.total_listened_seconds = session.total_listened_seconds
                + session
                    .play_started_at
                    .map(|started| started.elapsed().as_secs_f64())
                    .unwrap_or(0.0);

            let current_listened = matches!(session.state, PlayerState::Ended)
                || session.listened.contains(&session.current);
            snapshot.words_spoken = session
                .progress
                .words_spoken(session.current, session.position_seconds, current_listened)
                .await;
            snapshot.total_words = session.progress.total_words();
            snapshot.generated_seconds = session.progress.generated_seconds().await;
            snapshot.buffered_segments = session.buffer.segment_ids().await;
            snapshot.fetch_attempts = session.scheduler.attempts().await;
        }

        *self.snapshot.write().await = snapshot;
    }
}

/// Channel type handed to output implementations for playout milestones.
pub type EngineSender = mpsc::UnboundedSender<EngineEvent>;
