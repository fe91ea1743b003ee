// THEORY:
// `EdgeMap` holds the Canny edge image of a mask and the gradient field the
// edges came from. The circle transform needs both: edge pixels are the voters,
// and the gradient at each edge pixel gives the direction along which it votes.
//
// Steps:
// 1.  Canny from `imageproc`: Gaussian pre-blur, Sobel, L2 magnitude, non-maximum
//     suppression and hysteresis between `low` and `high`.
// 2.  Sobel derivatives of the same pre-blurred image. A binary mask has a
//     staircase boundary; its raw Sobel direction is off by up to 45 degrees on
//     the steps. After the blur the direction follows the true outline.
//
// The buffers are replaced on every call, never patched.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// Pre-blur applied by `imageproc::edges::canny`.
const CANNY_SIGMA: f32 = 1.4;

pub type Gradient = ImageBuffer<Luma<i16>, Vec<i16>>;

/// Gradient and edge buffers for one image size.
#[derive(Debug, Clone)]
pub struct EdgeMap {
    dx: Gradient,
    dy: Gradient,
    edges: GrayImage,
}

impl EdgeMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dx: Gradient::new(width, height),
            dy: Gradient::new(width, height),
            edges: GrayImage::new(width, height),
        }
    }

    pub fn edges(&self) -> &GrayImage {
        &self.edges
    }

    /// Horizontal and vertical derivative at (x, y).
    #[inline]
    pub fn gradient(&self, x: u32, y: u32) -> (i32, i32) {
        (self.dx.get_pixel(x, y).0[0] as i32, self.dy.get_pixel(x, y).0[0] as i32)
    }

    #[inline]
    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        self.edges.get_pixel(x, y).0[0] > 0
    }

    /// Runs Canny on `image` and keeps the smoothed gradient field.
    pub fn compute(&mut self, image: &GrayImage, low: f64, high: f64) {
        self.edges = canny(image, low as f32, high as f32);
        let smoothed = gaussian_blur_f32(image, CANNY_SIGMA);
        self.dx = horizontal_sobel(&smoothed);
        self.dy = vertical_sobel(&smoothed);
    }
}
