//! Internal engine events
//!
//! All inputs to the playback controller arrive on one typed channel:
//! listener commands, fetch completions, and media playout milestones. The
//! controller task consumes them one at a time, so every multi-structure
//! transition (buffer + fetch record + playback state) runs to completion
//! before the next event is seen. These are distinct from the external
//! `duocast_common::events::PlayerEvent` broadcast.

use duocast_common::models::{Catalog, SegmentId};

/// Events consumed by the playback controller's event loop.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Load a new catalog, discarding all prior session state.
    LoadCatalog(Catalog),

    /// Listener selected a segment out of order.
    SelectSegment(SegmentId),

    /// Listener paused playout.
    Pause,

    /// Listener resumed playout.
    Resume,

    /// A fetch attempt finished (success or the error's display text).
    FetchCompleted {
        segment_id: SegmentId,
        result: std::result::Result<(), String>,
    },

    /// Playout of a segment reached its natural end.
    PlaybackEnded { segment_id: SegmentId },

    /// Periodic playout position report for the active segment.
    PositionUpdate {
        segment_id: SegmentId,
        position_seconds: f64,
    },

    /// The duration probe finished for a buffered segment.
    DurationProbed {
        segment_id: SegmentId,
        duration_seconds: f64,
    },

    /// Stop the controller task.
    Shutdown,
}
