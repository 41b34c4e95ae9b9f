//! Playback engine modules

pub mod buffer;
pub mod controller;
pub mod events;
pub mod output;
pub mod progress;
pub mod scheduler;

pub use buffer::{BufferEntry, BufferStore};
pub use controller::{PlaybackController, PlayerSnapshot, PlayerState};
pub use events::EngineEvent;
pub use output::{AudioOutput, ClockOutput};
pub use progress::ProgressTracker;
pub use scheduler::{FetchScheduler, FetchStatus};
