// THEORY:
// The selector reduces a tick's candidates to the one circle worth reporting:
// the largest, on the assumption that the largest circle of the tracked color is
// the closest one. "No candidates" is represented as `None`, never as a circle of
// radius zero, so a genuine zero-radius detection stays distinguishable from an
// empty tick.

use crate::core_modules::shape_detector::Candidate;

/// The chosen circle of a tick, if any.
pub type Selection = Option<Candidate>;

/// Returns the candidate with the strictly largest radius. Among equal radii the
/// first one in `candidates` wins.
pub fn select_largest(candidates: &[Candidate]) -> Selection {
    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        match best {
            Some(current) if candidate.radius <= current.radius => {}
            _ => best = Some(*candidate),
        }
    }
    best
}
