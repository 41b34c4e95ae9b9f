//! Buffer store
//!
//! Holds fetched audio payloads keyed by segment id. Append-only within a
//! session: entries are created exactly once per segment on first successful
//! fetch and never replaced, only their probed duration is filled in later.
//! Loading a new catalog discards the whole store.

use crate::error::{Error, Result};
use duocast_common::models::SegmentId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One segment's fetched audio.
#[derive(Debug, Clone)]
pub struct BufferEntry {
    pub segment_id: SegmentId,

    /// Opaque audio payload, shared cheaply between store, playout, and probe.
    pub audio: Arc<Vec<u8>>,

    /// Declared MIME type from the synthesis response.
    pub mime_type: String,

    /// Probed duration in seconds; 0.0 until (and unless) the probe succeeds.
    pub duration_seconds: f64,
}

impl BufferEntry {
    pub fn new(segment_id: SegmentId, audio: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            segment_id,
            audio: Arc::new(audio),
            mime_type: mime_type.into(),
            duration_seconds: 0.0,
        }
    }
}

/// Map of segment id → buffered audio.
#[derive(Debug, Clone, Default)]
pub struct BufferStore {
    entries: Arc<RwLock<HashMap<SegmentId, BufferEntry>>>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_entry(&self, segment_id: SegmentId) -> bool {
        self.entries.read().await.contains_key(&segment_id)
    }

    /// Get a segment's entry; errors if it was never fetched.
    pub async fn get(&self, segment_id: SegmentId) -> Result<BufferEntry> {
        self.entries
            .read()
            .await
            .get(&segment_id)
            .cloned()
            .ok_or(Error::SegmentNotFound(segment_id))
    }

    /// Insert an entry. Idempotent: entries are immutable once created, so a
    /// second put for the same segment is a no-op. Returns whether the entry
    /// was inserted.
    pub async fn put(&self, entry: BufferEntry) -> bool {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.segment_id) {
            debug!(
                "Buffer entry for segment {} already exists, keeping original",
                entry.segment_id
            );
            false
        } else {
            entries.insert(entry.segment_id, entry);
            true
        }
    }

    /// Record a probed duration in place. Unknown ids are ignored.
    pub async fn set_duration(&self, segment_id: SegmentId, duration_seconds: f64) {
        if let Some(entry) = self.entries.write().await.get_mut(&segment_id) {
            entry.duration_seconds = duration_seconds;
        }
    }

    pub async fn duration_seconds(&self, segment_id: SegmentId) -> Option<f64> {
        self.entries
            .read()
            .await
            .get(&segment_id)
            .map(|e| e.duration_seconds)
    }

    /// Sum of probed durations across all entries, including segments not
    /// yet played.
    pub async fn total_generated_seconds(&self) -> f64 {
        self.entries
            .read()
            .await
            .values()
            .map(|e| e.duration_seconds)
            .sum()
    }

    /// Buffered segment ids in ascending order.
    pub async fn segment_ids(&self) -> Vec<SegmentId> {
        let mut ids: Vec<SegmentId> = self.entries.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = BufferStore::new();
        assert!(!store.has_entry(1).await);
        assert!(store.get(1).await.is_err());

        assert!(store.put(BufferEntry::new(1, vec![1, 2, 3], "audio/wav")).await);
        assert!(store.has_entry(1).await);

        let entry = store.get(1).await.unwrap();
        assert_eq!(entry.audio.as_slice(), &[1, 2, 3]);
        assert_eq!(entry.mime_type, "audio/wav");
        assert_eq!(entry.duration_seconds, 0.0);
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = BufferStore::new();
        assert!(store.put(BufferEntry::new(1, vec![1], "audio/wav")).await);

        // Second put for the same id keeps the original payload
        assert!(!store.put(BufferEntry::new(1, vec![9, 9], "audio/mpeg")).await);

        let entry = store.get(1).await.unwrap();
        assert_eq!(entry.audio.as_slice(), &[1]);
        assert_eq!(entry.mime_type, "audio/wav");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_set_duration_and_totals() {
        let store = BufferStore::new();
        store.put(BufferEntry::new(1, vec![0], "audio/wav")).await;
        store.put(BufferEntry::new(3, vec![0], "audio/wav")).await;

        store.set_duration(1, 12.5).await;
        store.set_duration(3, 7.5).await;
        store.set_duration(42, 99.0).await; // unknown id ignored

        assert_eq!(store.duration_seconds(1).await, Some(12.5));
        assert_eq!(store.total_generated_seconds().await, 20.0);
        assert_eq!(store.segment_ids().await, vec![1, 3]);
    }
}
