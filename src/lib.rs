// THEORY:
// This file is the entry point for the `cyclops` library crate. It exposes the
// per-frame `VisionPipeline`, the `Scheduler` that drives it from a frame source
// at a fixed interval, the `Config` that tunes both, and the output contract.
//
// The stages themselves live in `core_modules`, one file per stage:
// frame source -> noise suppression -> color classification -> shape detection
// -> selection. Each stage is usable on its own, which is how the tests exercise
// them, but most consumers only need the pipeline and the scheduler.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod scheduler;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use core_modules::frame::frame::{ChannelOrder, Frame, Mask};
pub use core_modules::frame_source::{FrameSource, open_source};
pub use core_modules::selector::Selection;
pub use error::{CaptureError, ConfigError, CyclopsError, DeviceError};
pub use output::{Circle, DetectionRecord, Emitter};
pub use pipeline::{Candidate, TickReport, VisionPipeline};
pub use scheduler::{Scheduler, TickOutcome, TickStats};
