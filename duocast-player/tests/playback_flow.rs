//! Integration tests for the playback engine
//!
//! Drives the full controller/scheduler/buffer stack with a scripted TTS
//! double and a manually-completed output, covering:
//! - prefetch on play start and pass-through on natural advance
//! - fetch de-duplication and manual retry accounting
//! - listened-set monotonicity and words-spoken bounds
//! - pause/resume listened-time accounting

use async_trait::async_trait;
use duocast_common::models::{Catalog, SegmentDescriptor, SegmentId, Turn};
use duocast_player::backend::{TtsAudio, TtsClient};
use duocast_player::playback::controller::EngineSender;
use duocast_player::playback::{
    AudioOutput, BufferEntry, EngineEvent, PlaybackController, PlayerSnapshot, PlayerState,
};
use duocast_player::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// TTS double with a per-segment script: how many times calls for that
/// segment fail before succeeding, plus an optional synthesis delay.
struct ScriptedTts {
    delay: Duration,
    failures: Mutex<HashMap<SegmentId, usize>>,
    calls: Mutex<HashMap<SegmentId, usize>>,
    total_calls: AtomicUsize,
}

impl ScriptedTts {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicUsize::new(0),
        }
    }

    fn fail_first(self, segment_id: SegmentId, times: usize) -> Self {
        self.failures.lock().unwrap().insert(segment_id, times);
        self
    }

    fn calls_for(&self, segment_id: SegmentId) -> usize {
        self.calls.lock().unwrap().get(&segment_id).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TtsClient for ScriptedTts {
    async fn synthesize(&self, segment_id: SegmentId, _turns: &[Turn]) -> Result<TtsAudio> {
        *self.calls.lock().unwrap().entry(segment_id).or_insert(0) += 1;
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&segment_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::Tts("synthesis service unavailable".to_string()));
                }
            }
        }

        Ok(TtsAudio {
            audio: vec![0u8; 32],
            mime_type: "audio/wav".to_string(),
        })
    }
}

/// Output double whose playout only ends when the test says so.
struct ManualOutput {
    engine_tx: Mutex<Option<EngineSender>>,
    begun: Mutex<Vec<SegmentId>>,
}

impl ManualOutput {
    fn new() -> Self {
        Self {
            engine_tx: Mutex::new(None),
            begun: Mutex::new(Vec::new()),
        }
    }

    fn begun(&self) -> Vec<SegmentId> {
        self.begun.lock().unwrap().clone()
    }

    /// Report the natural end of a segment's playout.
    fn finish(&self, segment_id: SegmentId) {
        if let Some(tx) = self.engine_tx.lock().unwrap().as_ref() {
            let _ = tx.send(EngineEvent::PlaybackEnded { segment_id });
        }
    }

    /// Report a playout position within a segment.
    fn report_position(&self, segment_id: SegmentId, position_seconds: f64) {
        if let Some(tx) = self.engine_tx.lock().unwrap().as_ref() {
            let _ = tx.send(EngineEvent::PositionUpdate {
                segment_id,
                position_seconds,
            });
        }
    }
}

#[async_trait]
impl AudioOutput for ManualOutput {
    fn connect(&self, engine_tx: EngineSender) {
        *self.engine_tx.lock().unwrap() = Some(engine_tx);
    }

    async fn begin(&self, entry: &BufferEntry) -> Result<()> {
        self.begun.lock().unwrap().push(entry.segment_id);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

fn segment(id: SegmentId, words: usize) -> SegmentDescriptor {
    let text = vec!["word"; words].join(" ");
    SegmentDescriptor::new(
        id,
        vec![Turn {
            speaker: if id % 2 == 1 { "Jay" } else { "Nik" }.to_string(),
            text,
        }],
    )
}

fn catalog(word_counts: &[usize]) -> Catalog {
    Catalog::new(
        word_counts
            .iter()
            .enumerate()
            .map(|(index, words)| segment(index as SegmentId + 1, *words))
            .collect(),
    )
    .unwrap()
}

async fn wait_for<F>(controller: &PlaybackController, mut predicate: F) -> PlayerSnapshot
where
    F: FnMut(&PlayerSnapshot) -> bool,
{
    for _ in 0..400 {
        let snapshot = controller.snapshot().await;
        if predicate(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "condition not reached; last snapshot: {:?}",
        controller.snapshot().await
    );
}

#[tokio::test]
async fn test_scenario_a_prefetch_and_advance() {
    // Catalog: segment 1 has 10 words, segment 2 has 8
    let tts = Arc::new(ScriptedTts::new(Duration::from_millis(10)));
    let output = Arc::new(ManualOutput::new());
    let controller = PlaybackController::spawn(tts.clone(), output.clone());

    controller.load_catalog(catalog(&[10, 8]));

    // Segment 1 plays; its start triggers the prefetch of segment 2
    wait_for(&controller, |s| s.state == PlayerState::Playing(1)).await;
    wait_for(&controller, |s| s.buffered_segments.contains(&2)).await;
    assert_eq!(tts.calls_for(2), 1);

    // Natural end of 1: advance to 2, which is buffered, so playout is
    // immediate
    output.finish(1);
    let snapshot = wait_for(&controller, |s| s.state == PlayerState::Playing(2)).await;
    assert_eq!(snapshot.current_segment_id, Some(2));
    assert!(snapshot.listened.contains(&1));
    assert_eq!(snapshot.listened.len(), 1);
    assert_eq!(output.begun(), vec![1, 2]);
}

#[tokio::test]
async fn test_scenario_a_slow_prefetch_buffers_then_plays() {
    // Prefetch of segment 2 is still in flight when segment 1 ends
    let tts = Arc::new(ScriptedTts::new(Duration::from_millis(150)));
    let output = Arc::new(ManualOutput::new());
    let controller = PlaybackController::spawn(tts.clone(), output.clone());

    controller.load_catalog(catalog(&[10, 8]));
    wait_for(&controller, |s| s.state == PlayerState::Playing(1)).await;

    output.finish(1);
    let snapshot = wait_for(&controller, |s| s.state == PlayerState::Buffering(2)).await;
    assert!(snapshot.listened.contains(&1));

    // The in-flight prefetch resolves and playback starts automatically,
    // without a second synthesis call
    wait_for(&controller, |s| s.state == PlayerState::Playing(2)).await;
    assert_eq!(tts.calls_for(2), 1);
}

#[tokio::test]
async fn test_scenario_b_manual_retries_accumulate_attempts() {
    let tts = Arc::new(ScriptedTts::new(Duration::from_millis(0)).fail_first(3, 2));
    let output = Arc::new(ManualOutput::new());
    let controller = PlaybackController::spawn(tts.clone(), output.clone());

    controller.load_catalog(catalog(&[5, 5, 5]));
    wait_for(&controller, |s| s.state == PlayerState::Playing(1)).await;

    // First manual selection of 3: attempt 1 fails
    controller.select_segment(3);
    let snapshot = wait_for(&controller, |s| s.fetch_attempts.get(&3) == Some(&1)).await;
    assert_eq!(snapshot.state, PlayerState::Buffering(3));
    assert!(!snapshot.buffered_segments.contains(&3));

    // Second manual reselection: attempt 2 fails
    controller.select_segment(3);
    let snapshot = wait_for(&controller, |s| s.fetch_attempts.get(&3) == Some(&2)).await;
    assert!(!snapshot.buffered_segments.contains(&3));

    // Third reselection succeeds on attempt 3
    controller.select_segment(3);
    let snapshot = wait_for(&controller, |s| s.state == PlayerState::Playing(3)).await;
    assert_eq!(snapshot.fetch_attempts.get(&3), Some(&3));
    assert!(snapshot.buffered_segments.contains(&3));
}

#[tokio::test]
async fn test_scenario_c_pause_excluded_from_listened_time() {
    let tts = Arc::new(ScriptedTts::new(Duration::from_millis(0)));
    let output = Arc::new(ManualOutput::new());
    let controller = PlaybackController::spawn(tts.clone(), output.clone());

    controller.load_catalog(catalog(&[12]));
    wait_for(&controller, |s| s.state == PlayerState::Playing(1)).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    controller.pause();
    tokio::time::sleep(Duration::from_millis(500)).await;
    controller.resume();
    tokio::time::sleep(Duration::from_millis(200)).await;
    output.finish(1);

    let snapshot = wait_for(&controller, |s| s.state == PlayerState::Ended).await;

    // ~0.5s of active play; the 0.5s pause must not be counted
    assert!(
        snapshot.total_listened_seconds >= 0.4,
        "listened time too low: {}",
        snapshot.total_listened_seconds
    );
    assert!(
        snapshot.total_listened_seconds <= 0.85,
        "pause interval leaked into listened time: {}",
        snapshot.total_listened_seconds
    );
}

#[tokio::test]
async fn test_listened_set_is_monotone_and_words_bounded() {
    let tts = Arc::new(ScriptedTts::new(Duration::from_millis(5)));
    let output = Arc::new(ManualOutput::new());
    let controller = PlaybackController::spawn(tts.clone(), output.clone());

    let word_counts = [10usize, 8, 6];
    let total_words: usize = word_counts.iter().sum();
    controller.load_catalog(catalog(&word_counts));

    let mut last_listened = 0usize;
    for id in 1..=3u32 {
        let snapshot = wait_for(&controller, |s| s.state == PlayerState::Playing(id)).await;
        assert!(snapshot.listened.len() >= last_listened);
        last_listened = snapshot.listened.len();
        assert!(snapshot.words_spoken <= total_words);

        output.report_position(id, 1.0);
        output.finish(id);
    }

    let snapshot = wait_for(&controller, |s| s.state == PlayerState::Ended).await;
    assert_eq!(snapshot.listened.len(), 3);
    assert_eq!(snapshot.words_spoken, total_words);
    assert_eq!(snapshot.total_words, total_words);
}

#[tokio::test]
async fn test_manual_select_back_reuses_buffer() {
    let tts = Arc::new(ScriptedTts::new(Duration::from_millis(5)));
    let output = Arc::new(ManualOutput::new());
    let controller = PlaybackController::spawn(tts.clone(), output.clone());

    controller.load_catalog(catalog(&[5, 5]));
    wait_for(&controller, |s| s.state == PlayerState::Playing(1)).await;
    output.finish(1);
    wait_for(&controller, |s| s.state == PlayerState::Playing(2)).await;

    let calls_before = tts.total_calls();

    // Jumping back to a buffered segment must not refetch it
    controller.select_segment(1);
    let snapshot = wait_for(&controller, |s| s.state == PlayerState::Playing(1)).await;
    assert_eq!(tts.total_calls(), calls_before);
    assert_eq!(snapshot.current_segment_id, Some(1));

    // Listened set kept its history
    assert!(snapshot.listened.contains(&1));
}

#[tokio::test]
async fn test_status_feed_reports_transitions() {
    use duocast_common::events::PlayerEvent;

    let tts = Arc::new(ScriptedTts::new(Duration::from_millis(5)));
    let output = Arc::new(ManualOutput::new());
    let controller = PlaybackController::spawn(tts, output.clone());
    let mut events = controller.subscribe();

    controller.load_catalog(catalog(&[4]));
    wait_for(&controller, |s| s.state == PlayerState::Playing(1)).await;
    output.finish(1);
    wait_for(&controller, |s| s.state == PlayerState::Ended).await;

    let mut messages = Vec::new();
    while let Ok(event) = events.try_recv() {
        messages.push(event.status().message);
        if matches!(event, PlayerEvent::PlaybackComplete { .. }) {
            break;
        }
    }

    assert!(messages.iter().any(|m| m == "Buffering segment 1"));
    assert!(messages.iter().any(|m| m == "Playing segment 1/1"));
    assert!(messages.iter().any(|m| m == "Playback complete"));
}
