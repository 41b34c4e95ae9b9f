//! Audio payload inspection

pub mod probe;

pub use probe::{format_duration, probe_duration};
