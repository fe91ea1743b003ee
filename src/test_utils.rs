//! Scene synthesis shared by the unit tests: flat backgrounds, painted discs
//! and ideal binary masks.

use crate::core_modules::frame::frame::{Frame, MASK_OFF, MASK_ON, Mask};

/// Fills every pixel of `frame` with one RGB color.
pub(crate) fn fill_rgb(frame: &mut Frame, rgb: [u8; 3]) {
    let (width, height) = frame.dimensions();
    for y in 0..height {
        for x in 0..width {
            frame.put_rgb(x, y, rgb);
        }
    }
}

/// Paints the pixels within `radius` of (`cx`, `cy`).
pub(crate) fn draw_disc(frame: &mut Frame, cx: f32, cy: f32, radius: f32, rgb: [u8; 3]) {
    let (width, height) = frame.dimensions();
    let r2 = radius * radius;
    for y in 0..height {
        for x in 0..width {
            let (dx, dy) = (x as f32 - cx, y as f32 - cy);
            if dx * dx + dy * dy <= r2 {
                frame.put_rgb(x, y, rgb);
            }
        }
    }
}

/// Binary mask that is on inside any of the `(cx, cy, radius)` discs.
pub(crate) fn disc_mask(width: u32, height: u32, discs: &[(f32, f32, f32)]) -> Mask {
    Mask::from_fn(width, height, |x, y| {
        let inside = discs.iter().any(|&(cx, cy, r)| {
            let (dx, dy) = (x as f32 - cx, y as f32 - cy);
            dx * dx + dy * dy <= r * r
        });
        image::Luma([if inside { MASK_ON } else { MASK_OFF }])
    })
}

/// Number of `MASK_ON` pixels.
pub(crate) fn count_on(mask: &Mask) -> usize {
    mask.as_raw().iter().filter(|&&v| v == MASK_ON).count()
}
