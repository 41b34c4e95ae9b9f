//! # Duocast Common Library
//!
//! Shared code for the Duocast playback engine and its front ends:
//! - Script data model (turns, segment descriptors, validated catalogs)
//! - Player event types broadcast to status/telemetry consumers
//! - Common error types

pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use events::{PlayerEvent, StatusLevel, StatusUpdate};
pub use models::{Catalog, SegmentDescriptor, SegmentId, Turn};
