//! # Duocast Player Library
//!
//! Core playback-continuity engine for generated two-host audio programs.
//!
//! **Purpose:** fetch independently synthesized dialogue segments from the
//! generation backend, de-duplicate and prefetch those fetches, and keep
//! exactly one segment playing at a time in ascending order, recovering
//! from fetch failures without stalling the listener indefinitely.
//!
//! **Architecture:** a single controller task consuming a typed event
//! channel drives the state machine; fetch workers and the duration probe
//! run as background tasks that report back through the same channel.

pub mod audio;
pub mod backend;
pub mod error;
pub mod playback;

pub use backend::{BackendClient, ScriptSource, TtsClient};
pub use error::{Error, Result};
pub use playback::{PlaybackController, PlayerSnapshot, PlayerState};
