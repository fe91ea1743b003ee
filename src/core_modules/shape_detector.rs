// THEORY:
// The `ShapeDetector` finds circles in the cleaned mask with the gradient Hough
// transform. It is a stateless utility: one mask in, one list of candidates out,
// no memory of previous ticks. Its vote buffers live in a `HoughWorkspace`
// owned by the pipeline and are reused across ticks.
//
// Algorithm:
// 1.  **Edges**: Canny on the mask, upper threshold `param1`, lower threshold
//     `param1 / 2`. The smoothed Sobel gradient of each edge pixel is kept.
// 2.  **Center Voting**: Every edge pixel walks along its gradient, in both
//     directions, for every radius in `[min_radius, max_radius]`. Each step
//     deposits one vote, split bilinearly over the four nearest cells of an
//     accumulator at `1 / dp` of the image resolution. The center of a circle is
//     where the walks of its boundary pixels cross.
// 3.  **Center Selection**: The accumulator is Gaussian-smoothed so the small
//     direction errors of a digitized boundary pile up on one peak instead of a
//     ring of near misses. The smoothing is rescaled so a single walk crossing a
//     cell still counts as one vote. Local maxima above `param2` become center
//     candidates, strongest first, refined to the centroid of their 3x3 cells.
// 4.  **Radius Estimation**: For each center, the distances to all edge pixels
//     inside the radius bounds are sorted and grouped into bins `dp` wide. The
//     bin with the best support relative to its radius wins; the circle is kept
//     when that support exceeds `param2` and the center is at least `min_dist`
//     away from every circle already kept.
//
// Pixel (x, y) sits at image coordinate (x, y) and accumulator cell (i, j) at
// (i * dp, j * dp). The order of the returned candidates follows the vote
// ranking but callers must not rely on it.

use crate::config::TransformConfig;
use crate::core_modules::edge_map::EdgeMap;
use crate::core_modules::frame::frame::Mask;
use image::{ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Accumulator smoothing, in cells.
const ACCUMULATOR_SIGMA: f32 = 1.0;

/// A detected circle: center and radius in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

impl Candidate {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self { x, y, radius }
    }
}

/// All candidates of one tick, in detector order.
pub type CandidateSet = Vec<Candidate>;

type Accumulator = ImageBuffer<Luma<f32>, Vec<f32>>;

/// A center candidate in image coordinates with its smoothed vote count.
#[derive(Debug, Clone, Copy)]
struct Center {
    x: f32,
    y: f32,
    votes: f32,
}

/// Reusable buffers for one image size.
#[derive(Debug, Clone)]
pub struct HoughWorkspace {
    edge_map: EdgeMap,
    accumulator: Accumulator,
    smoothed: Accumulator,
    centers: Vec<Center>,
    edge_points: Vec<(f32, f32)>,
    distances: Vec<f32>,
}

impl HoughWorkspace {
    pub fn new(width: u32, height: u32, dp: f64) -> Self {
        let acc_width = (width as f64 / dp).ceil() as u32;
        let acc_height = (height as f64 / dp).ceil() as u32;
        Self {
            edge_map: EdgeMap::new(width, height),
            accumulator: Accumulator::new(acc_width, acc_height),
            smoothed: Accumulator::new(acc_width, acc_height),
            centers: Vec::new(),
            edge_points: Vec::new(),
            distances: Vec::new(),
        }
    }

    /// Smoothed votes at cell (ax, ay), zero outside the accumulator.
    #[inline]
    fn votes_at(&self, ax: i64, ay: i64) -> f32 {
        let (w, h) = self.smoothed.dimensions();
        if ax < 0 || ay < 0 || ax >= w as i64 || ay >= h as i64 {
            0.0
        } else {
            self.smoothed.get_pixel(ax as u32, ay as u32).0[0]
        }
    }
}

/// Adds `weight` at the fractional cell (x, y), split over its four neighbors.
/// The caller keeps (x, y) inside `[0, width - 1) x [0, height - 1)`.
#[inline]
fn bilinear_add(accumulator: &mut Accumulator, x: f32, y: f32, weight: f32) {
    let stride = accumulator.width() as usize;
    let (x0, y0) = (x as usize, y as usize);
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);
    let base = y0 * stride + x0;
    let cells: &mut [f32] = accumulator;
    cells[base] += weight * (1.0 - fx) * (1.0 - fy);
    cells[base + 1] += weight * fx * (1.0 - fy);
    cells[base + stride] += weight * (1.0 - fx) * fy;
    cells[base + stride + 1] += weight * fx * fy;
}

#[derive(Debug, Clone)]
pub struct ShapeDetector {
    dp: f64,
    min_dist: f64,
    canny_high: f64,
    canny_low: f64,
    vote_threshold: f64,
    min_radius: f64,
    max_radius: f64,
}

impl ShapeDetector {
    pub fn new(config: &TransformConfig) -> Self {
        Self {
            dp: config.dp.max(1.0),
            min_dist: config.min_dist.max(config.dp),
            canny_high: config.param1,
            canny_low: (config.param1 / 2.0).max(1.0).min(config.param1),
            vote_threshold: config.param2,
            min_radius: config.min_radius.max(0.0),
            max_radius: config.max_radius.max(0.0),
        }
    }

    pub fn dp(&self) -> f64 {
        self.dp
    }

    /// Upper radius bound used for a `width` x `height` image.
    fn radius_limit(&self, width: u32, height: u32) -> f64 {
        if self.max_radius > 0.0 {
            self.max_radius
        } else {
            (width as f64).hypot(height as f64)
        }
    }

    /// Replaces `out` with the circles found in `mask`.
    pub fn detect(&self, mask: &Mask, workspace: &mut HoughWorkspace, out: &mut CandidateSet) {
        out.clear();
        let (width, height) = mask.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        workspace.edge_map.compute(mask, self.canny_low, self.canny_high);
        let max_radius = self.radius_limit(width, height);

        self.vote(workspace, width, height, max_radius);
        self.rank_centers(workspace);
        self.estimate_radii(workspace, max_radius, out);
    }

    fn vote(&self, ws: &mut HoughWorkspace, width: u32, height: u32, max_radius: f64) {
        ws.accumulator.iter_mut().for_each(|v| *v = 0.0);
        ws.edge_points.clear();

        let inverse_dp = (1.0 / self.dp) as f32;
        let x_limit = (ws.accumulator.width() as f32 - 1.0).max(0.0);
        let y_limit = (ws.accumulator.height() as f32 - 1.0).max(0.0);
        let first_step = self.min_radius.ceil().max(1.0) as u32;
        let last_step = max_radius.floor() as u32;

        for y in 0..height {
            for x in 0..width {
                if !ws.edge_map.is_edge(x, y) {
                    continue;
                }
                let (xf, yf) = (x as f32, y as f32);
                ws.edge_points.push((xf, yf));
                let (gx, gy) = ws.edge_map.gradient(x, y);
                if gx == 0 && gy == 0 {
                    continue;
                }
                let magnitude = (gx as f32).hypot(gy as f32);
                let (ux, uy) = (gx as f32 / magnitude, gy as f32 / magnitude);

                for sign in [1.0f32, -1.0] {
                    for r in first_step..=last_step {
                        let step = sign * r as f32;
                        let ax = (xf + step * ux) * inverse_dp;
                        let ay = (yf + step * uy) * inverse_dp;
                        if ax < 0.0 || ay < 0.0 || ax >= x_limit || ay >= y_limit {
                            continue;
                        }
                        bilinear_add(&mut ws.accumulator, ax, ay, 1.0);
                    }
                }
            }
        }
    }

    fn rank_centers(&self, ws: &mut HoughWorkspace) {
        ws.centers.clear();
        let (acc_width, acc_height) = ws.accumulator.dimensions();
        if acc_width < 2 || acc_height < 2 {
            return;
        }
        // A straight run of votes keeps its height through the blur.
        let line_gain = (2.0 * std::f32::consts::PI).sqrt() * ACCUMULATOR_SIGMA;
        ws.smoothed = gaussian_blur_f32(&ws.accumulator, ACCUMULATOR_SIGMA);
        ws.smoothed.iter_mut().for_each(|v| *v *= line_gain);

        for ay in 0..acc_height as i64 {
            for ax in 0..acc_width as i64 {
                let votes = ws.votes_at(ax, ay);
                if (votes as f64) <= self.vote_threshold || !is_peak(ws, ax, ay, votes) {
                    continue;
                }
                let (mut sx, mut sy, mut total) = (0.0f32, 0.0f32, 0.0f32);
                for ny in ay - 1..=ay + 1 {
                    for nx in ax - 1..=ax + 1 {
                        let v = ws.votes_at(nx, ny);
                        sx += v * nx as f32;
                        sy += v * ny as f32;
                        total += v;
                    }
                }
                let dp = self.dp as f32;
                ws.centers.push(Center {
                    x: sx / total * dp,
                    y: sy / total * dp,
                    votes,
                });
            }
        }
        // Stable: equal votes keep scan order.
        ws.centers.sort_by(|a, b| b.votes.total_cmp(&a.votes));
    }

    fn estimate_radii(&self, ws: &mut HoughWorkspace, max_radius: f64, out: &mut CandidateSet) {
        let min_dist2 = (self.min_dist * self.min_dist) as f32;
        let min_r2 = (self.min_radius * self.min_radius) as f32;
        let max_r2 = (max_radius * max_radius) as f32;
        let bin_width = self.dp as f32;

        for center in &ws.centers {
            let (cx, cy) = (center.x, center.y);
            let crowded = out.iter().any(|c| {
                let (dx, dy) = (c.x - cx, c.y - cy);
                dx * dx + dy * dy < min_dist2
            });
            if crowded {
                continue;
            }

            ws.distances.clear();
            for &(px, py) in &ws.edge_points {
                let (dx, dy) = (px - cx, py - cy);
                let r2 = dx * dx + dy * dy;
                if min_r2 <= r2 && r2 <= max_r2 {
                    ws.distances.push(r2.sqrt());
                }
            }
            if ws.distances.is_empty() {
                continue;
            }
            ws.distances.sort_by(f32::total_cmp);

            if let Some((radius, support)) = best_radius(&ws.distances, bin_width) {
                if support as f64 > self.vote_threshold {
                    out.push(Candidate::new(cx, cy, radius));
                }
            }
        }
    }
}

/// Strictly above the neighbors scanned before (ax, ay), at least the ones after.
fn is_peak(ws: &HoughWorkspace, ax: i64, ay: i64, votes: f32) -> bool {
    for (dx, dy) in [(-1, -1), (0, -1), (1, -1), (-1, 0)] {
        if ws.votes_at(ax + dx, ay + dy) >= votes {
            return false;
        }
    }
    for (dx, dy) in [(1, 0), (-1, 1), (0, 1), (1, 1)] {
        if ws.votes_at(ax + dx, ay + dy) > votes {
            return false;
        }
    }
    true
}

/// Groups sorted distances into bins of `bin_width` and returns the median
/// radius and count of the bin with the highest count-to-radius ratio.
fn best_radius(sorted: &[f32], bin_width: f32) -> Option<(f32, usize)> {
    let mut best: Option<(f32, usize)> = None;
    let mut consider = |begin: usize, end: usize| {
        let count = end - begin;
        let radius = sorted[(begin + end - 1) / 2];
        if radius <= f32::EPSILON {
            return;
        }
        let better = match best {
            None => true,
            Some((best_r, best_count)) => count as f32 * best_r >= best_count as f32 * radius,
        };
        if better {
            best = Some((radius, count));
        }
    };

    let mut begin = 0;
    for j in 1..sorted.len() {
        if sorted[j] - sorted[begin] > bin_width {
            consider(begin, j);
            begin = j;
        }
    }
    consider(begin, sorted.len());
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::disc_mask;

    fn config(min_radius: f64, max_radius: f64) -> TransformConfig {
        TransformConfig {
            dp: 1.0,
            min_dist: 20.0,
            param1: 100.0,
            param2: 15.0,
            min_radius,
            max_radius,
        }
    }

    fn detect(mask: &Mask, config: &TransformConfig) -> CandidateSet {
        let detector = ShapeDetector::new(config);
        let mut workspace = HoughWorkspace::new(mask.width(), mask.height(), detector.dp());
        let mut out = CandidateSet::new();
        detector.detect(mask, &mut workspace, &mut out);
        out
    }

    #[test]
    fn empty_mask_yields_no_candidates() {
        let mask = Mask::new(64, 48);
        assert!(detect(&mask, &config(0.0, 0.0)).is_empty());
    }

    #[test]
    fn single_disc_is_found() {
        let mask = disc_mask(120, 100, &[(60.0, 50.0, 20.0)]);
        let found = detect(&mask, &config(10.0, 40.0));
        assert_eq!(found.len(), 1, "{found:?}");
        let best = found[0];
        assert!((best.x - 60.0).abs() <= 1.0, "x {}", best.x);
        assert!((best.y - 50.0).abs() <= 1.0, "y {}", best.y);
        assert!((best.radius - 20.0).abs() <= 1.5, "radius {}", best.radius);
    }

    #[test]
    fn off_grid_disc_center_is_recovered() {
        let mask = disc_mask(120, 100, &[(47.4, 58.7, 17.0)]);
        let found = detect(&mask, &config(8.0, 30.0));
        let best = found.first().expect("a circle");
        assert!((best.x - 47.4).abs() <= 1.0, "x {}", best.x);
        assert!((best.y - 58.7).abs() <= 1.0, "y {}", best.y);
        assert!((best.radius - 17.0).abs() <= 1.5, "radius {}", best.radius);
    }

    #[test]
    fn coarse_accumulator_still_centers_the_disc() {
        let mask = disc_mask(160, 120, &[(80.0, 60.0, 30.0)]);
        let mut cfg = config(15.0, 45.0);
        cfg.dp = 2.0;
        let found = detect(&mask, &cfg);
        let best = found.first().expect("a circle");
        assert!((best.x - 80.0).abs() <= 2.0, "x {}", best.x);
        assert!((best.y - 60.0).abs() <= 2.0, "y {}", best.y);
        assert!((best.radius - 30.0).abs() <= 2.5, "radius {}", best.radius);
    }

    #[test]
    fn unconstrained_radius_still_finds_the_disc() {
        let mask = disc_mask(120, 100, &[(60.0, 50.0, 25.0)]);
        let found = detect(&mask, &config(0.0, 0.0));
        assert!(
            found
                .iter()
                .any(|c| (c.x - 60.0).abs() <= 2.0 && (c.y - 50.0).abs() <= 2.0 && (c.radius - 25.0).abs() <= 2.0),
            "{found:?}"
        );
    }

    #[test]
    fn every_candidate_respects_radius_bounds() {
        let mask = disc_mask(200, 120, &[(40.0, 60.0, 12.0), (110.0, 60.0, 22.0), (170.0, 60.0, 8.0)]);
        let found = detect(&mask, &config(15.0, 30.0));
        assert!(!found.is_empty());
        for c in &found {
            assert!((15.0..=30.0).contains(&c.radius), "{c:?}");
        }
    }

    #[test]
    fn centers_are_at_least_min_dist_apart() {
        let mask = disc_mask(200, 120, &[(50.0, 60.0, 18.0), (140.0, 60.0, 18.0)]);
        let cfg = config(10.0, 30.0);
        let found = detect(&mask, &cfg);
        for (i, a) in found.iter().enumerate() {
            for b in &found[i + 1..] {
                let d = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                assert!(d as f64 >= cfg.min_dist, "{a:?} {b:?}");
            }
        }
        assert!(found.len() >= 2, "{found:?}");
    }

    #[test]
    fn detection_is_repeatable() {
        let mask = disc_mask(100, 100, &[(50.0, 50.0, 15.0), (20.0, 20.0, 6.0)]);
        let cfg = config(0.0, 0.0);
        let detector = ShapeDetector::new(&cfg);
        let mut workspace = HoughWorkspace::new(100, 100, detector.dp());
        let mut first = CandidateSet::new();
        let mut second = CandidateSet::new();
        detector.detect(&mask, &mut workspace, &mut first);
        detector.detect(&mask, &mut workspace, &mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn best_radius_prefers_dense_bins() {
        let distances = [5.0, 5.2, 9.8, 10.0, 10.1, 10.3, 10.4, 10.5, 30.0];
        let (radius, count) = best_radius(&distances, 1.0).expect("bins");
        assert_eq!(count, 6);
        assert!((radius - 10.1).abs() < 0.25, "{radius}");
    }
}
