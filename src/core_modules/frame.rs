// THEORY:
// The `Frame` and `Mask` types are the "dumb" data containers that flow through
// every tick. They carry pixels and nothing else: no history, no analysis.
//
// Key architectural principles:
// 1.  **Allocated Once**: A frame source owns one `Frame` and overwrites it on
//     every poll; the pipeline owns one `Mask` and overwrites it on every tick.
//     Neither is reallocated while the engine runs.
// 2.  **Native Channel Order**: Cameras do not agree on RGB vs BGR. Instead of
//     paying for a swizzle on every frame, a `Frame` remembers the order its
//     bytes arrived in and `rgb_at` normalizes on read.
// 3.  **Binary Masks**: A `Mask` is a single-channel `GrayImage` whose pixels are
//     either `MASK_OFF` or `MASK_ON`. Any other value is a bug upstream.

pub mod frame {
    use image::{GrayImage, ImageBuffer, Rgb};

    /// Raw three-channel pixel storage. The channel order is described by `ChannelOrder`.
    pub type Pixels = ImageBuffer<Rgb<u8>, Vec<u8>>;
    /// Single-channel binary image, same dimensions as the frame it came from.
    pub type Mask = GrayImage;

    pub const MASK_OFF: u8 = 0;
    pub const MASK_ON: u8 = 255;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum ChannelOrder {
        #[default]
        Rgb,
        /// OpenCV's native layout.
        Bgr,
    }

    /// A single captured image.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Frame {
        pixels: Pixels,
        order: ChannelOrder,
    }

    impl Frame {
        /// A black frame of the given size.
        pub fn new(width: u32, height: u32, order: ChannelOrder) -> Self {
            Self {
                pixels: Pixels::new(width, height),
                order,
            }
        }

        pub fn from_pixels(pixels: Pixels, order: ChannelOrder) -> Self {
            Self { pixels, order }
        }

        pub fn width(&self) -> u32 {
            self.pixels.width()
        }

        pub fn height(&self) -> u32 {
            self.pixels.height()
        }

        pub fn dimensions(&self) -> (u32, u32) {
            self.pixels.dimensions()
        }

        pub fn order(&self) -> ChannelOrder {
            self.order
        }

        pub fn pixels(&self) -> &Pixels {
            &self.pixels
        }

        pub fn pixels_mut(&mut self) -> &mut Pixels {
            &mut self.pixels
        }

        /// Replaces the content, keeping the allocation when the size matches.
        pub fn overwrite(&mut self, pixels: &Pixels, order: ChannelOrder) {
            if self.pixels.dimensions() == pixels.dimensions() {
                self.pixels.copy_from_slice(pixels.as_raw());
            } else {
                self.pixels = pixels.clone();
            }
            self.order = order;
        }

        /// Copies `other` into `self` in place.
        pub fn copy_from(&mut self, other: &Frame) {
            self.overwrite(&other.pixels, other.order);
        }

        /// The pixel at (x, y) as `[red, green, blue]`, whatever the native order.
        #[inline]
        pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
            let [a, b, c] = self.pixels.get_pixel(x, y).0;
            match self.order {
                ChannelOrder::Rgb => [a, b, c],
                ChannelOrder::Bgr => [c, b, a],
            }
        }

        /// Writes an RGB triple at (x, y) in the frame's native order.
        #[inline]
        pub fn put_rgb(&mut self, x: u32, y: u32, [r, g, b]: [u8; 3]) {
            let native = match self.order {
                ChannelOrder::Rgb => [r, g, b],
                ChannelOrder::Bgr => [b, g, r],
            };
            self.pixels.put_pixel(x, y, Rgb(native));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::frame::*;
    use crate::test_utils::fill_rgb;

    #[test]
    fn bgr_frames_read_back_as_rgb() {
        let mut frame = Frame::new(2, 1, ChannelOrder::Bgr);
        frame.put_rgb(0, 0, [10, 20, 30]);
        assert_eq!(frame.pixels().get_pixel(0, 0).0, [30, 20, 10]);
        assert_eq!(frame.rgb_at(0, 0), [10, 20, 30]);
    }

    #[test]
    fn overwrite_keeps_allocation_for_same_size() {
        let mut frame = Frame::new(4, 4, ChannelOrder::Rgb);
        let before = frame.pixels().as_raw().as_ptr();
        let mut other = Frame::new(4, 4, ChannelOrder::Bgr);
        fill_rgb(&mut other, [1, 2, 3]);
        frame.copy_from(&other);
        assert_eq!(frame.pixels().as_raw().as_ptr(), before);
        assert_eq!(frame.order(), ChannelOrder::Bgr);
        assert_eq!(frame.rgb_at(3, 3), [1, 2, 3]);
    }
}
