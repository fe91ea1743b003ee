// THEORY:
// The `pipeline` module is the top-level API for a single tick of the engine.
// It chains the stages in a fixed order:
//
//   Frame -> median blur -> HSV bands (AND) -> erosion -> Hough circles -> largest
//
// and returns the candidates and the selection for that frame.
//
// Key architectural principles:
// 1.  **One Workspace**: Every intermediate result (blurred frame, HSV planes,
//     channel masks, mask, gradients, accumulator) lives in a workspace sized
//     from the configuration and owned by the `VisionPipeline`. Stages borrow
//     the buffers they need for the duration of a call and keep nothing
//     afterwards. Buffers a stage fills pixel by pixel are allocated once; the
//     `imageproc` filters return fresh images that replace last tick's.
// 2.  **No Memory Between Ticks**: Each stage rewrites its outputs completely, so
//     processing the same frame twice yields byte-identical masks and identical
//     candidates no matter what was processed in between.
// 3.  **Size Is Checked, Not Assumed**: A frame whose size differs from the
//     configured capture size is rejected before any stage runs.

use crate::config::Config;
use crate::core_modules::color_classifier::{ChannelMasks, ColorClassifier, HsvPlanes};
use crate::core_modules::frame::frame::{ChannelOrder, Frame, Mask};
use crate::core_modules::noise_suppressor::NoiseSuppressor;
use crate::core_modules::selector::{Selection, select_largest};
use crate::core_modules::shape_detector::{CandidateSet, HoughWorkspace, ShapeDetector};
use crate::error::CaptureError;
use log::trace;

pub use crate::core_modules::shape_detector::Candidate;

/// Buffers reused by every tick.
#[derive(Debug, Clone)]
struct Workspace {
    width: u32,
    height: u32,
    smoothed: Frame,
    planes: HsvPlanes,
    channels: ChannelMasks,
    mask: Mask,
    hough: HoughWorkspace,
    candidates: CandidateSet,
}

impl Workspace {
    fn new(width: u32, height: u32, dp: f64) -> Self {
        Self {
            width,
            height,
            smoothed: Frame::new(width, height, ChannelOrder::Rgb),
            planes: HsvPlanes::new(width, height),
            channels: ChannelMasks::new(width, height),
            mask: Mask::new(width, height),
            hough: HoughWorkspace::new(width, height, dp),
            candidates: CandidateSet::new(),
        }
    }
}

/// What one tick produced. Borrows the pipeline's candidate buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport<'a> {
    pub candidates: &'a [Candidate],
    pub selection: Selection,
}

/// The per-tick processing chain for one configuration.
pub struct VisionPipeline {
    suppressor: NoiseSuppressor,
    classifier: ColorClassifier,
    detector: ShapeDetector,
    workspace: Workspace,
}

impl VisionPipeline {
    pub fn new(config: &Config) -> Self {
        let detector = ShapeDetector::new(&config.transform);
        let workspace = Workspace::new(config.capture.width, config.capture.height, detector.dp());
        Self {
            suppressor: NoiseSuppressor::new(&config.morph),
            classifier: ColorClassifier::new(&config.threshold),
            detector,
            workspace,
        }
    }

    /// Runs every stage on `frame`.
    pub fn process(&mut self, frame: &Frame) -> Result<TickReport<'_>, CaptureError> {
        let ws = &mut self.workspace;
        if frame.dimensions() != (ws.width, ws.height) {
            return Err(CaptureError::DimensionMismatch {
                expected_width: ws.width,
                expected_height: ws.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }

        self.suppressor.smooth(frame, &mut ws.smoothed);
        self.classifier
            .classify(&ws.smoothed, &mut ws.planes, &mut ws.channels, &mut ws.mask);
        self.suppressor.erode(&mut ws.mask);
        self.detector.detect(&ws.mask, &mut ws.hough, &mut ws.candidates);
        let selection = select_largest(&ws.candidates);
        trace!("{} candidate(s), selection {:?}", ws.candidates.len(), selection);

        Ok(TickReport {
            candidates: &ws.candidates,
            selection,
        })
    }

    /// The cleaned mask of the last processed frame.
    pub fn mask(&self) -> &Mask {
        &self.workspace.mask
    }
}
