// THEORY:
// Errors are split by the stage that raises them, because the scheduler treats
// each class differently:
// - `ConfigError` and `DeviceError` are fatal and only happen before the loop.
// - `CaptureError` is per-tick. Most variants skip the tick; a frame whose
//   dimensions or pixel layout disagree with the configuration is a setup
//   mistake and ends the loop.
// `CyclopsError` is the top-level wrapper the binary reports, tagged by stage.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config.yaml or config.yml found in {searched:?}")]
    NotFound { searched: Vec<PathBuf> },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration value `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("cannot open capture device `{device}`: {reason}")]
    Open { device: String, reason: String },

    #[error("capture device `{device}` is not supported by this build (enable the `camera` feature)")]
    Unsupported { device: String },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device disconnected: {0}")]
    Disconnected(String),

    #[error("no frame ready")]
    NoFrame,

    #[error("failed to decode frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("unsupported frame layout: {0}")]
    PixelFormat(String),

    #[error("frame is {actual_width}x{actual_height} but capture is configured for {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

impl CaptureError {
    /// A mismatched frame size or layout cannot recover on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::DimensionMismatch { .. } | CaptureError::PixelFormat(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum CyclopsError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("device: {0}")]
    Device(#[from] DeviceError),

    #[error("capture: {0}")]
    Capture(#[from] CaptureError),

    #[error("output: {0}")]
    Output(#[from] std::io::Error),
}
