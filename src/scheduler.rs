// THEORY:
// The `Scheduler` is the engine's heartbeat. It owns the frame source, the
// pipeline and the emitter, and drives them at a fixed wall-clock interval:
//
//   Idle -> (tick: poll -> process -> emit) -> (tick ...) -> Stopped
//
// Key architectural principles:
// 1.  **Strictly Sequential Ticks**: A tick runs to completion before the timer is
//     awaited again, so the source's frame buffer and the pipeline's workspace are
//     never shared between two ticks.
// 2.  **Overrun Policy: Delay**: When a tick takes longer than the interval, the
//     next tick starts as soon as the previous one ends and the schedule shifts
//     forward from there. Missed ticks are neither queued nor replayed in a burst.
// 3.  **Capture Failures Skip, They Don't Stop**: A failed poll skips the tick and
//     the loop carries on, so a camera that hiccups recovers on its own. The one
//     exception is a frame of the wrong size, which no amount of waiting fixes.
// 4.  **Explicit Shutdown**: The loop ends on Ctrl-C, on a caller-supplied shutdown
//     future, or after a fixed number of ticks.

use crate::config::Config;
use crate::core_modules::frame_source::{FrameSource, open_source};
use crate::core_modules::shape_detector::Candidate;
use crate::error::CyclopsError;
use crate::output::{DetectionRecord, Emitter};
use crate::pipeline::VisionPipeline;
use log::{debug, info, warn};
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

/// Counters kept across the life of a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub skipped: u64,
    pub detections: u64,
    pub consecutive_failures: u64,
}

/// What a single tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Detected(Candidate),
    Empty,
    Skipped,
}

pub struct Scheduler<W: Write> {
    source: Box<dyn FrameSource>,
    pipeline: VisionPipeline,
    emitter: Emitter<W>,
    interval: Duration,
    stats: TickStats,
}

impl<W: Write> Scheduler<W> {
    /// Opens the configured capture device and builds a scheduler around it.
    pub fn open(config: &Config, writer: W) -> Result<Self, CyclopsError> {
        let source = open_source(&config.capture)?;
        Ok(Self::new(config, source, writer))
    }

    pub fn new(config: &Config, source: Box<dyn FrameSource>, writer: W) -> Self {
        let (width, height) = source.resolution();
        if (width, height) != (config.capture.width, config.capture.height) {
            warn!(
                "source opened at {}x{} but capture is configured for {}x{}",
                width, height, config.capture.width, config.capture.height
            );
        }
        Self {
            source,
            pipeline: VisionPipeline::new(config),
            emitter: Emitter::new(writer, &config.output),
            interval: config.capture.interval,
            stats: TickStats::default(),
        }
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn into_writer(self) -> W {
        self.emitter.into_inner()
    }

    /// Polls one frame, processes it and emits the result.
    pub fn tick(&mut self) -> Result<TickOutcome, CyclopsError> {
        let tick = self.stats.ticks;
        self.stats.ticks += 1;

        let frame = match self.source.poll() {
            Ok(frame) => frame,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                self.stats.skipped += 1;
                self.stats.consecutive_failures += 1;
                warn!(
                    "tick {tick}: capture failed ({e}), skipping ({} in a row)",
                    self.stats.consecutive_failures
                );
                return Ok(TickOutcome::Skipped);
            }
        };
        if self.stats.consecutive_failures > 0 {
            info!(
                "tick {tick}: capture recovered after {} failed poll(s)",
                self.stats.consecutive_failures
            );
            self.stats.consecutive_failures = 0;
        }

        let report = self.pipeline.process(frame)?;
        debug!("tick {tick}: {} candidate(s)", report.candidates.len());
        let selection = report.selection;

        self.emitter.emit(&DetectionRecord::new(tick, selection))?;
        Ok(match selection {
            Some(circle) => {
                self.stats.detections += 1;
                TickOutcome::Detected(circle)
            }
            None => TickOutcome::Empty,
        })
    }

    /// Ticks until Ctrl-C.
    pub async fn run(&mut self) -> Result<TickStats, CyclopsError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("cannot listen for Ctrl-C ({e}), running until killed");
                std::future::pending::<()>().await;
            }
            info!("interrupt received, stopping");
        })
        .await
    }

    /// Ticks until `shutdown` resolves or a fatal error occurs.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<TickStats, CyclopsError>
    where
        F: Future<Output = ()>,
    {
        info!("ticking every {:?}", self.interval);
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick()?;
                }
            }
        }
        self.log_summary();
        Ok(self.stats)
    }

    /// Runs exactly `ticks` ticks at the configured interval.
    pub async fn run_for(&mut self, ticks: u64) -> Result<TickStats, CyclopsError> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        for _ in 0..ticks {
            ticker.tick().await;
            self.tick()?;
        }
        self.log_summary();
        Ok(self.stats)
    }

    fn log_summary(&self) {
        info!(
            "stopped after {} tick(s): {} detection(s), {} skipped",
            self.stats.ticks, self.stats.detections, self.stats.skipped
        );
    }
}
