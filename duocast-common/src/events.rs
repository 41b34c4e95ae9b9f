//! Player event types
//!
//! Every fetch attempt, fetch result, and playback transition is broadcast
//! as a [`PlayerEvent`]. Consumers that only want the narrow status surface
//! (a message plus an info/error level) render events through
//! [`PlayerEvent::status`]; the engine never writes to a display directly.

use crate::models::SegmentId;
use serde::{Deserialize, Serialize};

/// Events broadcast by the playback engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// A new catalog was loaded; all prior session state was discarded.
    CatalogLoaded {
        segment_count: usize,
        total_words: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A synthesis fetch attempt started for a segment.
    FetchStarted {
        segment_id: SegmentId,
        attempt: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A synthesis fetch completed and the segment's audio is buffered.
    FetchSucceeded {
        segment_id: SegmentId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A synthesis fetch failed; the segment stays unbuffered until retried.
    FetchFailed {
        segment_id: SegmentId,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The engine is waiting for a segment's audio to become available.
    BufferingStarted {
        segment_id: SegmentId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playout of a segment began.
    SegmentStarted {
        segment_id: SegmentId,
        segment_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A segment played through to its natural end.
    SegmentCompleted {
        segment_id: SegmentId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playout paused mid-segment.
    PlaybackPaused {
        segment_id: SegmentId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playout resumed after a pause.
    PlaybackResumed {
        segment_id: SegmentId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The final segment finished; terminal state for the catalog.
    PlaybackComplete {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Derived progress metrics, recomputed on position ticks and buffer
    /// changes.
    ProgressUpdate {
        words_spoken: usize,
        total_words: usize,
        generated_seconds: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Severity of a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Error,
}

/// The narrow `{message, level}` feed surfaced to UI/telemetry consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub message: String,
    pub level: StatusLevel,
}

impl PlayerEvent {
    /// Render this event as a status update.
    pub fn status(&self) -> StatusUpdate {
        let (message, level) = match self {
            PlayerEvent::CatalogLoaded {
                segment_count,
                total_words,
                ..
            } => (
                format!(
                    "Loaded script: {} segments, {} words",
                    segment_count, total_words
                ),
                StatusLevel::Info,
            ),
            PlayerEvent::FetchStarted {
                segment_id, attempt, ..
            } => (
                format!("Fetching segment {} (attempt {})", segment_id, attempt),
                StatusLevel::Info,
            ),
            PlayerEvent::FetchSucceeded { segment_id, .. } => (
                format!("Segment {} ready", segment_id),
                StatusLevel::Info,
            ),
            PlayerEvent::FetchFailed {
                segment_id, error, ..
            } => (
                format!("Segment {} fetch failed: {}", segment_id, error),
                StatusLevel::Error,
            ),
            PlayerEvent::BufferingStarted { segment_id, .. } => (
                format!("Buffering segment {}", segment_id),
                StatusLevel::Info,
            ),
            PlayerEvent::SegmentStarted {
                segment_id,
                segment_count,
                ..
            } => (
                format!("Playing segment {}/{}", segment_id, segment_count),
                StatusLevel::Info,
            ),
            PlayerEvent::SegmentCompleted { segment_id, .. } => (
                format!("Finished segment {}", segment_id),
                StatusLevel::Info,
            ),
            PlayerEvent::PlaybackPaused { segment_id, .. } => (
                format!("Paused on segment {}", segment_id),
                StatusLevel::Info,
            ),
            PlayerEvent::PlaybackResumed { segment_id, .. } => (
                format!("Resumed segment {}", segment_id),
                StatusLevel::Info,
            ),
            PlayerEvent::PlaybackComplete { .. } => {
                ("Playback complete".to_string(), StatusLevel::Info)
            }
            PlayerEvent::ProgressUpdate {
                words_spoken,
                total_words,
                ..
            } => (
                format!("{} of {} words spoken", words_spoken, total_words),
                StatusLevel::Info,
            ),
        };

        StatusUpdate { message, level }
    }
}
