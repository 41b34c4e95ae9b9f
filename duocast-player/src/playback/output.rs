//! Audio output seam
//!
//! Media playout is an external collaborator: the engine only needs to start
//! and stop it and to hear about playout milestones. Milestones come back
//! through the engine's event channel, so the controller reacts to them the
//! same way it reacts to fetch completions.
//!
//! [`ClockOutput`] is a headless playout driver for non-interactive hosts:
//! it advances a wall-clock position through the probed duration, reporting
//! position ticks and the natural end of the segment.

use crate::error::Result;
use crate::playback::buffer::BufferEntry;
use crate::playback::events::EngineEvent;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Media playout collaborator. Completion and position are delivered through
/// the engine channel handed over in [`connect`](AudioOutput::connect).
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Attach the engine's event channel. Called once before any playout.
    fn connect(&self, engine_tx: tokio::sync::mpsc::UnboundedSender<EngineEvent>);

    /// Begin playout of a buffered segment from its start.
    async fn begin(&self, entry: &BufferEntry) -> Result<()>;

    /// Pause playout; position holds.
    async fn pause(&self) -> Result<()>;

    /// Resume a paused playout.
    async fn resume(&self) -> Result<()>;

    /// Stop playout without emitting an end-of-segment event.
    async fn stop(&self) -> Result<()>;
}

#[derive(Debug)]
struct ClockState {
    /// Bumped on every begin/stop so stale driver tasks exit silently.
    generation: u64,
    paused: bool,
    stopped: bool,
}

/// Wall-clock playout driver.
pub struct ClockOutput {
    engine_tx: Mutex<Option<tokio::sync::mpsc::UnboundedSender<EngineEvent>>>,
    state: Arc<Mutex<ClockState>>,
}

impl ClockOutput {
    /// Position tick granularity.
    const TICK: Duration = Duration::from_millis(100);

    /// Ticks between position reports (1 second, matching the engine's
    /// progress cadence).
    const TICKS_PER_REPORT: u32 = 10;

    /// Stand-in playout length when a payload's duration never probed.
    const FALLBACK_SECONDS: f64 = 1.0;

    pub fn new() -> Self {
        Self {
            engine_tx: Mutex::new(None),
            state: Arc::new(Mutex::new(ClockState {
                generation: 0,
                paused: false,
                stopped: true,
            })),
        }
    }
}

impl Default for ClockOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioOutput for ClockOutput {
    fn connect(&self, engine_tx: tokio::sync::mpsc::UnboundedSender<EngineEvent>) {
        *self.engine_tx.lock().unwrap() = Some(engine_tx);
    }

    async fn begin(&self, entry: &BufferEntry) -> Result<()> {
        let Some(tx) = self.engine_tx.lock().unwrap().clone() else {
            return Err(crate::error::Error::Output(
                "output not connected to an engine channel".to_string(),
            ));
        };

        let duration = if entry.duration_seconds > 0.0 {
            entry.duration_seconds
        } else {
            // Duration probe hasn't landed (or failed); probe inline so the
            // clock has something to count down.
            let audio = Arc::clone(&entry.audio);
            let mime_type = entry.mime_type.clone();
            tokio::task::spawn_blocking(move || {
                crate::audio::probe::probe_duration(&audio, &mime_type)
            })
            .await
            .map_err(|e| crate::error::Error::Output(e.to_string()))?
            .unwrap_or(Self::FALLBACK_SECONDS)
        };

        let segment_id = entry.segment_id;
        let generation = {
            let mut state = self.state.lock().unwrap();
            state.generation += 1;
            state.paused = false;
            state.stopped = false;
            state.generation
        };

        debug!(
            "Clock playout of segment {} for {:.2}s",
            segment_id, duration
        );

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut position = 0.0f64;
            let mut ticks_since_report = 0u32;

            loop {
                tokio::time::sleep(Self::TICK).await;

                {
                    let guard = state.lock().unwrap();
                    if guard.generation != generation || guard.stopped {
                        return;
                    }
                    if guard.paused {
                        continue;
                    }
                }

                position += Self::TICK.as_secs_f64();
                ticks_since_report += 1;

                if position >= duration {
                    let _ = tx.send(EngineEvent::PositionUpdate {
                        segment_id,
                        position_seconds: duration,
                    });
                    let _ = tx.send(EngineEvent::PlaybackEnded { segment_id });
                    return;
                }

                if ticks_since_report >= Self::TICKS_PER_REPORT {
                    ticks_since_report = 0;
                    let _ = tx.send(EngineEvent::PositionUpdate {
                        segment_id,
                        position_seconds: position,
                    });
                }
            }
        });

        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.state.lock().unwrap().paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.state.lock().unwrap().paused = false;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.state.lock().unwrap().stopped = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn short_entry(seconds: f64) -> BufferEntry {
        let mut entry = BufferEntry::new(1, vec![0u8; 4], "audio/wav");
        entry.duration_seconds = seconds;
        entry
    }

    #[tokio::test]
    async fn test_clock_output_reaches_end() {
        let output = ClockOutput::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        output.connect(tx);

        output.begin(&short_entry(0.3)).await.unwrap();

        let mut ended = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, EngineEvent::PlaybackEnded { segment_id: 1 }) {
                ended = true;
                break;
            }
        }
        assert!(ended);
    }

    #[tokio::test]
    async fn test_clock_output_stop_suppresses_end() {
        let output = ClockOutput::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        output.connect(tx);

        output.begin(&short_entry(0.5)).await.unwrap();
        output.stop().await.unwrap();

        tokio::time::sleep(Duration::from_millis(700)).await;
        while let Ok(event) = rx.try_recv() {
            assert!(
                !matches!(event, EngineEvent::PlaybackEnded { .. }),
                "stopped playout must not report a natural end"
            );
        }
    }

    #[tokio::test]
    async fn test_clock_output_requires_connect() {
        let output = ClockOutput::new();
        assert!(output.begin(&short_entry(0.2)).await.is_err());
    }
}
