// THEORY:
// The `ColorClassifier` turns a color frame into a binary `Mask` of the pixels
// whose color falls inside the configured HSV band.
//
// Algorithm:
// 1.  **HSV Conversion**: Every pixel is converted to 8-bit HSV with the
//     half-range hue convention (H in 0..180, S and V in 0..=255). The frame's
//     native channel order is normalized on read.
// 2.  **Per-Channel Bands**: Each of the three HSV planes is thresholded on its
//     own, producing three independent binary masks.
// 3.  **Conjunction**: The three masks are combined with a pixel-wise AND. A pixel
//     is matched only when hue, saturation AND value are all in band.
//
// Every output pixel is written on every call. Buffers are borrowed from the
// pipeline's workspace and may hold the previous tick's data on entry.

use crate::config::ThresholdConfig;
use crate::core_modules::frame::frame::{Frame, MASK_OFF, MASK_ON, Mask};
use image::GrayImage;

/// An inclusive `[min, max]` band on one 8-bit channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: u8) -> bool {
        let value = value as f64;
        self.min <= value && value <= self.max
    }
}

/// The three separate hue, saturation and value planes of a frame.
#[derive(Debug, Clone)]
pub struct HsvPlanes {
    pub hue: GrayImage,
    pub saturation: GrayImage,
    pub value: GrayImage,
}

impl HsvPlanes {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            hue: GrayImage::new(width, height),
            saturation: GrayImage::new(width, height),
            value: GrayImage::new(width, height),
        }
    }
}

/// Per-channel in-band masks, kept separate until the final AND.
#[derive(Debug, Clone)]
pub struct ChannelMasks {
    pub hue: Mask,
    pub saturation: Mask,
    pub value: Mask,
}

impl ChannelMasks {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            hue: Mask::new(width, height),
            saturation: Mask::new(width, height),
            value: Mask::new(width, height),
        }
    }
}

/// Classifies frames against a fixed set of HSV bands.
#[derive(Debug, Clone)]
pub struct ColorClassifier {
    hue: Band,
    saturation: Band,
    value: Band,
}

impl ColorClassifier {
    pub fn new(config: &ThresholdConfig) -> Self {
        Self {
            hue: Band::new(config.min_hue, config.max_hue),
            saturation: Band::new(config.min_saturation, config.max_saturation),
            value: Band::new(config.min_value, config.max_value),
        }
    }

    /// Writes the conjunctive HSV mask of `frame` into `mask`.
    pub fn classify(&self, frame: &Frame, planes: &mut HsvPlanes, channels: &mut ChannelMasks, mask: &mut Mask) {
        split_hsv(frame, planes);
        in_range(&planes.hue, self.hue, &mut channels.hue);
        in_range(&planes.saturation, self.saturation, &mut channels.saturation);
        in_range(&planes.value, self.value, &mut channels.value);
        bitwise_and(&channels.hue, &channels.saturation, mask);
        bitwise_and_in_place(mask, &channels.value);
    }
}

/// 8-bit RGB to HSV: hue in 0..180 (degrees halved), saturation and value in 0..=255.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = (max - min) as f32;

    let saturation = if max == 0 {
        0
    } else {
        (255.0 * chroma / max as f32).round() as u8
    };

    if chroma == 0.0 {
        return [0, saturation, max];
    }

    let (r, g, b) = (r as f32, g as f32, b as f32);
    let mut hue_degrees = if max as f32 == r {
        60.0 * (g - b) / chroma
    } else if max as f32 == g {
        120.0 + 60.0 * (b - r) / chroma
    } else {
        240.0 + 60.0 * (r - g) / chroma
    };
    if hue_degrees < 0.0 {
        hue_degrees += 360.0;
    }
    let hue = (hue_degrees / 2.0).round() as u16 % 180;

    [hue as u8, saturation, max]
}

/// Converts `frame` into three HSV planes.
pub fn split_hsv(frame: &Frame, planes: &mut HsvPlanes) {
    let (width, height) = frame.dimensions();
    for y in 0..height {
        for x in 0..width {
            let [h, s, v] = rgb_to_hsv(frame.rgb_at(x, y));
            planes.hue.put_pixel(x, y, image::Luma([h]));
            planes.saturation.put_pixel(x, y, image::Luma([s]));
            planes.value.put_pixel(x, y, image::Luma([v]));
        }
    }
}

/// `MASK_ON` where `band` contains the plane value, `MASK_OFF` elsewhere.
pub fn in_range(plane: &GrayImage, band: Band, out: &mut Mask) {
    for (dst, &src) in out.iter_mut().zip(plane.iter()) {
        *dst = if band.contains(src) { MASK_ON } else { MASK_OFF };
    }
}

pub fn bitwise_and(a: &Mask, b: &Mask, out: &mut Mask) {
    for ((dst, &lhs), &rhs) in out.iter_mut().zip(a.iter()).zip(b.iter()) {
        *dst = lhs & rhs;
    }
}

pub fn bitwise_and_in_place(acc: &mut Mask, other: &Mask) {
    for (dst, &rhs) in acc.iter_mut().zip(other.iter()) {
        *dst &= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::frame::ChannelOrder;
    use crate::test_utils::count_on;

    fn classify(frame: &Frame, config: &ThresholdConfig) -> Mask {
        let (w, h) = frame.dimensions();
        let mut planes = HsvPlanes::new(w, h);
        let mut channels = ChannelMasks::new(w, h);
        let mut mask = Mask::new(w, h);
        ColorClassifier::new(config).classify(frame, &mut planes, &mut channels, &mut mask);
        mask
    }

    #[test]
    fn primary_colors_match_opencv_convention() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 255]), [90, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
    }

    #[test]
    fn hue_stays_below_180() {
        // Hue just under 360 degrees must wrap instead of rounding up to 180.
        let [h, _, _] = rgb_to_hsv([255, 0, 1]);
        assert!(h < 180, "hue {h}");
    }

    #[test]
    fn pixel_is_set_only_when_all_three_channels_are_in_band() {
        let config = ThresholdConfig {
            min_hue: 0.0,
            max_hue: 10.0,
            min_saturation: 100.0,
            max_saturation: 255.0,
            min_value: 100.0,
            max_value: 255.0,
        };
        let mut frame = Frame::new(4, 1, ChannelOrder::Rgb);
        frame.put_rgb(0, 0, [250, 10, 10]); // all three in band
        frame.put_rgb(1, 0, [10, 250, 10]); // hue out
        frame.put_rgb(2, 0, [250, 200, 200]); // saturation out
        frame.put_rgb(3, 0, [60, 5, 5]); // value out
        let mask = classify(&frame, &config);
        assert_eq!(mask.as_raw(), &vec![MASK_ON, MASK_OFF, MASK_OFF, MASK_OFF]);
    }

    #[test]
    fn hue_outside_band_is_never_matched() {
        let config = ThresholdConfig {
            min_hue: 170.0,
            max_hue: 180.0,
            ..ThresholdConfig::default()
        };
        let mut frame = Frame::new(16, 16, ChannelOrder::Bgr);
        // Every saturation/value combination of a hue-90 (cyan) pixel.
        for y in 0..16u32 {
            for x in 0..16u32 {
                let v = (y * 16 + 15) as u8;
                let s = (x * 16 + 15) as u8;
                let low = (v as u32 * (255 - s as u32) / 255) as u8;
                frame.put_rgb(x, y, [low, v, v]);
            }
        }
        let mask = classify(&frame, &config);
        for (x, y, p) in mask.enumerate_pixels() {
            let [h, _, _] = rgb_to_hsv(frame.rgb_at(x, y));
            if h < 170 {
                assert_eq!(p.0[0], MASK_OFF);
            }
        }
        assert_eq!(count_on(&mask), 0);
    }

    #[test]
    fn mask_is_fully_rewritten() {
        let config = ThresholdConfig::default();
        let frame = Frame::new(8, 8, ChannelOrder::Rgb);
        let mut planes = HsvPlanes::new(8, 8);
        let mut channels = ChannelMasks::new(8, 8);
        let mut mask = Mask::from_pixel(8, 8, image::Luma([MASK_OFF]));
        let classifier = ColorClassifier::new(&config);
        classifier.classify(&frame, &mut planes, &mut channels, &mut mask);
        assert_eq!(count_on(&mask), 64);

        let strict = ColorClassifier::new(&ThresholdConfig {
            min_value: 10.0,
            ..ThresholdConfig::default()
        });
        strict.classify(&frame, &mut planes, &mut channels, &mut mask);
        assert_eq!(count_on(&mask), 0);
    }
}
