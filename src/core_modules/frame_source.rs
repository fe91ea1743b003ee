// THEORY:
// A `FrameSource` is the engine's only window on the outside world. It owns the
// one `Frame` buffer that camera data lands in and lends it out for the length of
// a tick. The rest of the pipeline never learns whether the pixels came from a
// V4L2 camera, a video file, or a folder of still images.
//
// Two implementations ship:
// - `ImageSequenceSource` replays image files in name order, looping forever.
//   It resizes images to the configured resolution the way a camera driver would
//   when asked for a mode.
// - `OpenCvSource` (feature `camera`) wraps an OpenCV `VideoCapture` for live
//   devices and video files. The requested resolution is set on the device but
//   not enforced; the pipeline rejects frames of the wrong size.

use crate::config::CaptureConfig;
use crate::core_modules::frame::frame::{ChannelOrder, Frame};
use crate::error::{CaptureError, DeviceError};
use image::imageops::{self, FilterType};
use log::{debug, info};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif"];

pub trait FrameSource {
    /// Captures the next frame into the source's buffer and lends it out.
    fn poll(&mut self) -> Result<&Frame, CaptureError>;

    /// The resolution that was requested at open time, as (width, height).
    fn resolution(&self) -> (u32, u32);
}

/// Opens the source that matches `config.device`: an image file or directory is
/// replayed, anything else is handed to the camera backend.
pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, DeviceError> {
    let path = Path::new(&config.device);
    if path.is_dir() || (path.is_file() && is_image_file(path)) {
        let source = ImageSequenceSource::open(&config.device, config.width, config.height)?;
        return Ok(Box::new(source));
    }
    open_camera(config)
}

#[cfg(feature = "camera")]
fn open_camera(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, DeviceError> {
    let source = camera::OpenCvSource::open(&config.device, config.width, config.height)?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "camera"))]
fn open_camera(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, DeviceError> {
    Err(DeviceError::Unsupported {
        device: config.device.clone(),
    })
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Replays still images as if they were camera frames.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    width: u32,
    height: u32,
    frame: Frame,
}

impl ImageSequenceSource {
    pub fn open(device: &str, width: u32, height: u32) -> Result<Self, DeviceError> {
        let root = Path::new(device);
        let paths = if root.is_dir() {
            let entries = std::fs::read_dir(root).map_err(|e| DeviceError::Open {
                device: device.to_string(),
                reason: e.to_string(),
            })?;
            let mut paths: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_file(p))
                .collect();
            paths.sort();
            paths
        } else if root.is_file() {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };

        if paths.is_empty() {
            return Err(DeviceError::Open {
                device: device.to_string(),
                reason: "no image files found".to_string(),
            });
        }
        info!("replaying {} image(s) from {} at {}x{}", paths.len(), device, width, height);

        Ok(Self {
            paths,
            cursor: 0,
            width,
            height,
            frame: Frame::new(width, height, ChannelOrder::Rgb),
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn poll(&mut self) -> Result<&Frame, CaptureError> {
        let path = &self.paths[self.cursor];
        self.cursor = (self.cursor + 1) % self.paths.len();

        let decoded = image::open(path)
            .map_err(|source| CaptureError::Decode {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        debug!("decoded {} ({}x{})", path.display(), decoded.width(), decoded.height());

        if decoded.dimensions() == (self.width, self.height) {
            self.frame.overwrite(&decoded, ChannelOrder::Rgb);
        } else {
            let resized = imageops::resize(&decoded, self.width, self.height, FilterType::Triangle);
            self.frame.overwrite(&resized, ChannelOrder::Rgb);
        }
        Ok(&self.frame)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Checks that a capture buffer is one tightly packed 8-bit, three-channel
/// image of `cols` x `rows` and returns its size.
#[cfg_attr(not(feature = "camera"), allow(dead_code))]
fn packed_bgr_dimensions(cols: i32, rows: i32, continuous: bool, len: usize) -> Result<(u32, u32), CaptureError> {
    let bad = |reason: String| CaptureError::PixelFormat(reason);
    let width = u32::try_from(cols).map_err(|_| bad(format!("negative width {cols}")))?;
    let height = u32::try_from(rows).map_err(|_| bad(format!("negative height {rows}")))?;
    if !continuous {
        return Err(bad(format!("{width}x{height} buffer has row padding")));
    }
    let expected = width as usize * height as usize * 3;
    if len != expected {
        return Err(bad(format!("{len} bytes for {width}x{height}, expected {expected}")));
    }
    Ok((width, height))
}

#[cfg(feature = "camera")]
pub mod camera {
    use super::{FrameSource, packed_bgr_dimensions};
    use crate::core_modules::frame::frame::{ChannelOrder, Frame, Pixels};
    use crate::error::{CaptureError, DeviceError};
    use log::{info, warn};
    use opencv::{
        core::{CV_8UC3, Mat},
        prelude::*,
        videoio::{self, VideoCapture},
    };

    /// Live capture through OpenCV. Frames arrive in BGR order.
    pub struct OpenCvSource {
        capture: VideoCapture,
        mat: Mat,
        width: u32,
        height: u32,
        frame: Frame,
    }

    impl OpenCvSource {
        /// `device` is either a numeric camera index or a device/file path.
        pub fn open(device: &str, width: u32, height: u32) -> Result<Self, DeviceError> {
            let open_error = |reason: String| DeviceError::Open {
                device: device.to_string(),
                reason,
            };

            let mut capture = match device.parse::<i32>() {
                Ok(index) => VideoCapture::new(index, videoio::CAP_ANY),
                Err(_) => VideoCapture::from_file(device, videoio::CAP_ANY),
            }
            .map_err(|e| open_error(e.to_string()))?;

            if !capture.is_opened().map_err(|e| open_error(e.to_string()))? {
                return Err(open_error("device did not open".to_string()));
            }

            for (property, value, name) in [
                (videoio::CAP_PROP_FRAME_HEIGHT, height, "height"),
                (videoio::CAP_PROP_FRAME_WIDTH, width, "width"),
            ] {
                match capture.set(property, value as f64) {
                    Ok(true) => {}
                    Ok(false) => warn!("device {device} refused frame {name} {value}"),
                    Err(e) => warn!("device {device} failed to set frame {name}: {e}"),
                }
            }
            info!("opened capture device {device} at {width}x{height}");

            Ok(Self {
                capture,
                mat: Mat::default(),
                width,
                height,
                frame: Frame::new(width, height, ChannelOrder::Bgr),
            })
        }
    }

    impl FrameSource for OpenCvSource {
        fn poll(&mut self) -> Result<&Frame, CaptureError> {
            match self.capture.read(&mut self.mat) {
                Ok(true) if !self.mat.empty() => {}
                Ok(_) => return Err(CaptureError::NoFrame),
                Err(e) => return Err(CaptureError::Disconnected(e.to_string())),
            }

            let mat_type = self.mat.typ();
            if mat_type != CV_8UC3 {
                return Err(CaptureError::PixelFormat(format!(
                    "Mat type {mat_type}, expected CV_8UC3 ({CV_8UC3})"
                )));
            }
            let bytes = self
                .mat
                .data_bytes()
                .map_err(|e| CaptureError::PixelFormat(e.to_string()))?;
            let (cols, rows) =
                packed_bgr_dimensions(self.mat.cols(), self.mat.rows(), self.mat.is_continuous(), bytes.len())?;

            if (cols, rows) == self.frame.dimensions() {
                self.frame.pixels_mut().copy_from_slice(bytes);
            } else {
                let pixels = Pixels::from_raw(cols, rows, bytes.to_vec()).ok_or_else(|| {
                    CaptureError::PixelFormat(format!("{} bytes do not fill {cols}x{rows}", bytes.len()))
                })?;
                self.frame = Frame::from_pixels(pixels, ChannelOrder::Bgr);
            }
            Ok(&self.frame)
        }

        fn resolution(&self) -> (u32, u32) {
            (self.width, self.height)
        }
    }
}
