//! Duration probe for fetched audio payloads
//!
//! Decodes a payload's container headers with symphonia purely to learn its
//! duration. The probe is best effort: a failure leaves the buffer entry's
//! duration at 0 and never invalidates the audio itself.

use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Probe an audio payload for its duration in seconds.
///
/// # Errors
/// - Unrecognized or truncated container
/// - Container carries no frame count or sample rate
pub fn probe_duration(data: &[u8], mime_type: &str) -> Result<f64> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(mime_type);

    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| Error::Probe(format!("failed to probe format: {}", e)))?;

    let format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| Error::Probe("no audio track found".to_string()))?;

    let params = &track.codec_params;

    let n_frames = params
        .n_frames
        .ok_or_else(|| Error::Probe("frame count not declared".to_string()))?;
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| Error::Probe("sample rate not declared".to_string()))?;

    if sample_rate == 0 {
        return Err(Error::Probe("zero sample rate".to_string()));
    }

    let seconds = n_frames as f64 / sample_rate as f64;
    debug!(
        "Probed payload: {} frames at {} Hz = {:.2}s",
        n_frames, sample_rate, seconds
    );
    Ok(seconds)
}

/// Format a duration in seconds as MM:SS for display.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 {
        return "00:00".to_string();
    }
    let total = seconds as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}
