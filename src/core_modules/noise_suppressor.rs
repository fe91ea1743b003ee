// THEORY:
// The `NoiseSuppressor` removes the speckle that would otherwise turn into false
// circle votes. It works on both sides of the color classification:
// 1.  **Median Blur** on the raw frame, before HSV conversion. Sensor noise and
//     isolated hot pixels are replaced by the median of their neighborhood while
//     edges stay sharp. An aperture of 0 skips the step.
// 2.  **Erosion** on the binary mask, after classification. A square structuring
//     element shrinks every matched region, so blobs narrower than the element
//     disappear entirely.
//
// Both operations come from `imageproc` and only read a fixed neighborhood of
// each pixel. Borders replicate the edge pixel for the blur and are ignored for
// the erosion, so the image edge never eats into a region on its own.

use crate::config::MorphConfig;
use crate::core_modules::frame::frame::{Frame, MASK_OFF, Mask};
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology::erode_mut;

#[derive(Debug, Clone)]
pub struct NoiseSuppressor {
    blur: u32,
    erosion: u32,
}

impl NoiseSuppressor {
    pub fn new(config: &MorphConfig) -> Self {
        Self {
            blur: config.blur,
            erosion: config.erosion,
        }
    }

    pub fn blur_enabled(&self) -> bool {
        self.blur > 1
    }

    /// Median-blurs `src` into `dst`.
    pub fn smooth(&self, src: &Frame, dst: &mut Frame) {
        if self.blur_enabled() {
            median_blur(src, self.blur, dst);
        } else {
            dst.copy_from(src);
        }
    }

    /// Erodes `mask` in place.
    pub fn erode(&self, mask: &mut Mask) {
        erode(mask, self.erosion);
    }
}

/// Per-channel median over a `ksize` x `ksize` window, `ksize` odd.
pub fn median_blur(src: &Frame, ksize: u32, dst: &mut Frame) {
    let radius = ksize / 2;
    let blurred = median_filter(src.pixels(), radius, radius);
    dst.overwrite(&blurred, src.order());
}

/// Erosion with a `ksize` x `ksize` square anchored at `ksize / 2`.
/// Out-of-image neighbors are skipped.
pub fn erode(mask: &mut Mask, ksize: u32) {
    if ksize <= 1 || !mask.iter().any(|&p| p == MASK_OFF) {
        return;
    }
    // An odd square is an L-infinity ball. An even one reaches one pixel less
    // to the right and below, which is the odd square one size down followed
    // by a 2x2 step towards the origin.
    let radius = (ksize - 1) / 2;
    if radius > 0 {
        erode_mut(mask, Norm::LInf, u8::try_from(radius).unwrap_or(u8::MAX));
    }
    if ksize % 2 == 0 {
        erode_towards_origin(mask);
    }
}

/// 2x2 minimum over (x - 1..=x, y - 1..=y), in place.
fn erode_towards_origin(mask: &mut Mask) {
    let (width, height) = mask.dimensions();
    // Bottom-right first so every read still sees the input value.
    for y in (0..height).rev() {
        for x in (0..width).rev() {
            let mut value = mask.get_pixel(x, y).0[0];
            if x > 0 {
                value = value.min(mask.get_pixel(x - 1, y).0[0]);
            }
            if y > 0 {
                value = value.min(mask.get_pixel(x, y - 1).0[0]);
            }
            if x > 0 && y > 0 {
                value = value.min(mask.get_pixel(x - 1, y - 1).0[0]);
            }
            mask.put_pixel(x, y, image::Luma([value]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::frame::{ChannelOrder, MASK_ON};
    use crate::test_utils::{count_on, fill_rgb};

    fn square_mask(size: u32, x0: u32, y0: u32, side: u32) -> Mask {
        let mut mask = Mask::new(size, size);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                mask.put_pixel(x, y, image::Luma([MASK_ON]));
            }
        }
        mask
    }

    fn erode_copy(mask: &Mask, ksize: u32) -> Mask {
        let mut out = mask.clone();
        erode(&mut out, ksize);
        out
    }

    #[test]
    fn erosion_removes_isolated_pixels() {
        let mut mask = square_mask(20, 5, 5, 7);
        mask.put_pixel(17, 2, image::Luma([MASK_ON]));
        let eroded = erode_copy(&mask, 3);
        assert_eq!(eroded.get_pixel(17, 2).0[0], MASK_OFF);
        // 7x7 square shrinks to 5x5.
        assert_eq!(count_on(&eroded), 25);
    }

    #[test]
    fn erosion_is_a_subset_and_monotonic_in_kernel_size() {
        let mut mask = square_mask(32, 4, 4, 15);
        for i in 0..32 {
            mask.put_pixel(i, (i * 7) % 32, image::Luma([MASK_ON]));
        }
        let mut previous = count_on(&mask);
        for ksize in 1..=9 {
            let eroded = erode_copy(&mask, ksize);
            for (x, y, p) in eroded.enumerate_pixels() {
                if p.0[0] == MASK_ON {
                    assert_eq!(mask.get_pixel(x, y).0[0], MASK_ON, "erosion added ({x},{y})");
                }
            }
            let count = count_on(&eroded);
            assert!(count <= previous, "ksize {ksize}: {count} > {previous}");
            previous = count;
        }
    }

    /// Minimum over the `ksize` square anchored at `ksize / 2`, read pixel by pixel.
    fn erode_reference(mask: &Mask, ksize: u32) -> Mask {
        let (w, h) = mask.dimensions();
        let anchor = (ksize / 2) as i64;
        Mask::from_fn(w, h, |x, y| {
            let mut value = MASK_ON;
            for dy in -anchor..ksize as i64 - anchor {
                for dx in -anchor..ksize as i64 - anchor {
                    let (sx, sy) = (x as i64 + dx, y as i64 + dy);
                    if sx >= 0 && sy >= 0 && sx < w as i64 && sy < h as i64 {
                        value = value.min(mask.get_pixel(sx as u32, sy as u32).0[0]);
                    }
                }
            }
            image::Luma([value])
        })
    }

    #[test]
    fn odd_and_even_kernels_match_the_square_element() {
        let mut mask = square_mask(24, 3, 5, 12);
        for i in 0..24 {
            mask.put_pixel((i * 5) % 24, i, image::Luma([MASK_ON]));
            mask.put_pixel(i, 0, image::Luma([MASK_ON]));
        }
        for ksize in 1..=7 {
            assert_eq!(erode_copy(&mask, ksize), erode_reference(&mask, ksize), "ksize {ksize}");
        }
    }

    #[test]
    fn even_kernel_reaches_further_up_and_left() {
        // 7x7 square, 4x4 element spanning (-2..=1): four columns and rows survive.
        let eroded = erode_copy(&square_mask(20, 5, 5, 7), 4);
        assert_eq!(count_on(&eroded), 16);
        assert_eq!(eroded.get_pixel(7, 7).0[0], MASK_ON);
        assert_eq!(eroded.get_pixel(10, 10).0[0], MASK_ON);
        assert_eq!(eroded.get_pixel(6, 6).0[0], MASK_OFF);
    }

    #[test]
    fn erosion_of_one_is_identity() {
        let mask = square_mask(10, 2, 2, 3);
        assert_eq!(erode_copy(&mask, 1), mask);
    }

    #[test]
    fn border_does_not_erode_regions_touching_the_edge() {
        let mask = square_mask(10, 0, 0, 10);
        assert_eq!(count_on(&erode_copy(&mask, 5)), 100);
    }

    #[test]
    fn median_blur_removes_salt_noise() {
        let mut frame = Frame::new(9, 9, ChannelOrder::Rgb);
        fill_rgb(&mut frame, [10, 20, 30]);
        frame.put_rgb(4, 4, [255, 255, 255]);
        let mut out = Frame::new(9, 9, ChannelOrder::Rgb);
        let suppressor = NoiseSuppressor::new(&MorphConfig { blur: 3, erosion: 1 });
        suppressor.smooth(&frame, &mut out);
        assert_eq!(out.rgb_at(4, 4), [10, 20, 30]);
    }

    #[test]
    fn zero_blur_is_a_plain_copy() {
        let mut frame = Frame::new(5, 5, ChannelOrder::Bgr);
        frame.put_rgb(2, 2, [200, 0, 0]);
        let mut out = Frame::new(5, 5, ChannelOrder::Rgb);
        let suppressor = NoiseSuppressor::new(&MorphConfig { blur: 0, erosion: 5 });
        assert!(!suppressor.blur_enabled());
        suppressor.smooth(&frame, &mut out);
        assert_eq!(out, frame);
    }

    #[test]
    fn smoothing_is_deterministic() {
        let mut frame = Frame::new(12, 12, ChannelOrder::Rgb);
        for y in 0..12 {
            for x in 0..12 {
                frame.put_rgb(x, y, [(x * 20) as u8, (y * 20) as u8, ((x * y) % 255) as u8]);
            }
        }
        let suppressor = NoiseSuppressor::new(&MorphConfig { blur: 5, erosion: 3 });
        let mut first = Frame::new(12, 12, ChannelOrder::Rgb);
        let mut second = Frame::new(12, 12, ChannelOrder::Rgb);
        suppressor.smooth(&frame, &mut first);
        suppressor.smooth(&frame, &mut second);
        assert_eq!(first, second);
    }
}
