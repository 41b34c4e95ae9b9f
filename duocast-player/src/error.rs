//! Error types for duocast-player
//!
//! Module-specific error types using thiserror for clear error propagation.

use duocast_common::models::SegmentId;
use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum Error {
    /// Synthesis (TTS) service failure for one segment
    #[error("TTS error: {0}")]
    Tts(String),

    /// HTTP transport errors talking to the backend
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Script catalog errors (invalid or missing data from the backend)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Duration probe failure (non-fatal to the buffer entry)
    #[error("Probe error: {0}")]
    Probe(String),

    /// Segment id not present in the loaded catalog or buffer
    #[error("Segment not found: {0}")]
    SegmentNotFound(SegmentId),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Audio output errors
    #[error("Audio output error: {0}")]
    Output(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;
