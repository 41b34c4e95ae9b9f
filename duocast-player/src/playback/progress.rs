//! Progress tracker
//!
//! Pure read-side metrics derived from the catalog, buffer store, and live
//! playback position. Recomputed on every position tick and buffer change;
//! never mutates playback state and never triggers fetches.

use crate::playback::buffer::BufferStore;
use duocast_common::models::{Catalog, SegmentId};
use std::sync::Arc;

#[derive(Clone)]
pub struct ProgressTracker {
    catalog: Arc<Catalog>,
    buffer: BufferStore,
}

impl ProgressTracker {
    pub fn new(catalog: Arc<Catalog>, buffer: BufferStore) -> Self {
        Self { catalog, buffer }
    }

    /// Cumulative words spoken: all segments before the current one, plus an
    /// interpolated estimate for the current segment. The interpolation is
    /// clamped to the segment's word count, which also covers momentarily
    /// stale duration metadata; an unprobed (zero) duration contributes
    /// nothing.
    pub async fn words_spoken(
        &self,
        current: SegmentId,
        position_seconds: f64,
        current_listened: bool,
    ) -> usize {
        let before = self.catalog.words_before(current);
        let current_words = self.catalog.word_count(current);

        if current_listened {
            return before + current_words;
        }

        let duration = self
            .buffer
            .duration_seconds(current)
            .await
            .unwrap_or(0.0);

        let interpolated = if duration > 0.0 && position_seconds > 0.0 {
            ((current_words as f64) * (position_seconds / duration)).floor() as usize
        } else {
            0
        };

        before + interpolated.min(current_words)
    }

    /// Total synthesized running time across all buffer entries, including
    /// segments not yet played.
    pub async fn generated_seconds(&self) -> f64 {
        self.buffer.total_generated_seconds().await
    }

    pub fn total_words(&self) -> usize {
        self.catalog.total_words()
    }
}
