//! Script data model
//!
//! A program's script arrives from the script-generation collaborator as an
//! ordered list of segments, each holding the speaker turns for one
//! independently synthesizable chunk of dialogue. Word counts are derived
//! once at catalog load and cached; everything downstream (prefetch,
//! progress) reads the validated [`Catalog`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Segment identifier: positive, unique, contiguous from 1 within a catalog.
pub type SegmentId = u32;

/// One speaker's utterance within a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: String,
    pub text: String,
}

impl Turn {
    /// Whitespace-tokenized word count of this turn's text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Speaker-turn markup for one segment, matching the backend's JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerMarkup {
    pub turns: Vec<Turn>,
}

/// Immutable segment descriptor supplied by the script collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    #[serde(rename = "segmentId")]
    pub segment_id: SegmentId,

    #[serde(rename = "multiSpeakerMarkup")]
    pub markup: SpeakerMarkup,
}

impl SegmentDescriptor {
    pub fn new(segment_id: SegmentId, turns: Vec<Turn>) -> Self {
        Self {
            segment_id,
            markup: SpeakerMarkup { turns },
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.markup.turns
    }

    /// Whitespace-tokenized word count across all turns.
    pub fn word_count(&self) -> usize {
        self.markup.turns.iter().map(Turn::word_count).sum()
    }
}

/// Validated, ordered segment catalog with cached word counts.
///
/// Construction enforces the catalog invariants: non-empty, segment ids
/// contiguous ascending from 1, and every segment carries at least one turn.
#[derive(Debug, Clone)]
pub struct Catalog {
    segments: Vec<SegmentDescriptor>,

    /// Per-segment word counts, indexed by `segment_id - 1`.
    word_counts: Vec<usize>,

    /// Prefix sums: `words_before[i]` = total words in segments 1..=i.
    cumulative_words: Vec<usize>,
}

impl Catalog {
    /// Validate segments and derive word counts.
    pub fn new(segments: Vec<SegmentDescriptor>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::InvalidInput("catalog has no segments".to_string()));
        }

        for (index, segment) in segments.iter().enumerate() {
            let expected = (index + 1) as SegmentId;
            if segment.segment_id != expected {
                return Err(Error::InvalidInput(format!(
                    "segment ids must be contiguous from 1: expected {}, got {}",
                    expected, segment.segment_id
                )));
            }
            if segment.turns().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "segment {} has no turns",
                    segment.segment_id
                )));
            }
        }

        let word_counts: Vec<usize> = segments.iter().map(SegmentDescriptor::word_count).collect();

        let mut cumulative_words = Vec::with_capacity(word_counts.len());
        let mut running = 0usize;
        for count in &word_counts {
            running += count;
            cumulative_words.push(running);
        }

        Ok(Self {
            segments,
            word_counts,
            cumulative_words,
        })
    }

    /// Number of segments in the catalog (always >= 1).
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment id (always 1).
    pub fn first_id(&self) -> SegmentId {
        1
    }

    /// Last segment id.
    pub fn last_id(&self) -> SegmentId {
        self.segments.len() as SegmentId
    }

    pub fn contains(&self, segment_id: SegmentId) -> bool {
        segment_id >= 1 && (segment_id as usize) <= self.segments.len()
    }

    pub fn get(&self, segment_id: SegmentId) -> Option<&SegmentDescriptor> {
        if self.contains(segment_id) {
            self.segments.get(segment_id as usize - 1)
        } else {
            None
        }
    }

    /// Id of the segment after `segment_id`, if one exists.
    pub fn next_id(&self, segment_id: SegmentId) -> Option<SegmentId> {
        let next = segment_id.checked_add(1)?;
        self.contains(next).then_some(next)
    }

    /// Cached word count for one segment (0 if the id is unknown).
    pub fn word_count(&self, segment_id: SegmentId) -> usize {
        if self.contains(segment_id) {
            self.word_counts[segment_id as usize - 1]
        } else {
            0
        }
    }

    /// Total words in all segments with id strictly less than `segment_id`.
    pub fn words_before(&self, segment_id: SegmentId) -> usize {
        if segment_id <= 1 {
            0
        } else {
            let prior = (segment_id as usize - 1).min(self.segments.len());
            self.cumulative_words[prior - 1]
        }
    }

    /// Total word count across the catalog.
    pub fn total_words(&self) -> usize {
        self.cumulative_words.last().copied().unwrap_or(0)
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(id: SegmentId, words: &[&str]) -> SegmentDescriptor {
        SegmentDescriptor::new(
            id,
            vec![Turn {
                speaker: "Jay".to_string(),
                text: words.join(" "),
            }],
        )
    }

    #[test]
    fn test_turn_word_count() {
        let turn = Turn {
            speaker: "Nik".to_string(),
            text: "  hello   buffered   world ".to_string(),
        };
        assert_eq!(turn.word_count(), 3);
    }

    #[test]
    fn test_catalog_valid() {
        let catalog = Catalog::new(vec![
            segment(1, &["a", "b", "c"]),
            segment(2, &["d", "e"]),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.first_id(), 1);
        assert_eq!(catalog.last_id(), 2);
        assert_eq!(catalog.word_count(1), 3);
        assert_eq!(catalog.word_count(2), 2);
        assert_eq!(catalog.total_words(), 5);
        assert_eq!(catalog.words_before(1), 0);
        assert_eq!(catalog.words_before(2), 3);
        assert_eq!(catalog.next_id(1), Some(2));
        assert_eq!(catalog.next_id(2), None);
    }

    #[test]
    fn test_catalog_rejects_empty() {
        assert!(Catalog::new(Vec::new()).is_err());
    }

    #[test]
    fn test_catalog_rejects_gap() {
        let result = Catalog::new(vec![segment(1, &["a"]), segment(3, &["b"])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_rejects_wrong_start() {
        let result = Catalog::new(vec![segment(2, &["a"])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_rejects_empty_turns() {
        let result = Catalog::new(vec![SegmentDescriptor::new(1, Vec::new())]);
        assert!(result.is_err());
    }

    #[test]
    fn test_segment_json_shape() {
        // Wire format from the script backend
        let json = r#"{
            "segmentId": 1,
            "multiSpeakerMarkup": {
                "turns": [
                    {"speaker": "Jay", "text": "Welcome back to the show"},
                    {"speaker": "Nik", "text": "Great to be here"}
                ]
            }
        }"#;

        let descriptor: SegmentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.segment_id, 1);
        assert_eq!(descriptor.turns().len(), 2);
        assert_eq!(descriptor.word_count(), 9);
    }
}
