//! Small UI helpers: truncation, axis math.

use crate::types::Point;

pub fn truncate_middle(s: &str, max: usize) -> String {
    let n = s.chars().count();
    if n <= max { return s.to_string(); }
    if max <= 3 { return "...".into(); }
    let keep = max - 3;
    let left = keep / 2;
    let right = keep - left;
    let head: String = s.chars().take(left).collect();
    let tail: String = s.chars().skip(n - right).collect();
    format!("{head}...{tail}")
}

/// Chart x coordinates: seconds relative to `newest` (so <= 0).
pub fn relative_points(points: &[Point], newest: i64) -> Vec<(f64, f64)> {
    points
        .iter()
        .map(|p| ((p.timestamp - newest) as f64 / 1000.0, p.value))
        .collect()
}

/// Y bounds with 10% headroom; a flat or empty series still gets a range.
pub fn y_bounds<'a>(values: impl IntoIterator<Item = &'a f64>) -> [f64; 2] {
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in values {
        lo = lo.min(*v);
        hi = hi.max(*v);
    }
    if !lo.is_finite() || !hi.is_finite() {
        return [0.0, 1.0];
    }
    let lo = lo.min(0.0);
    let span = (hi - lo).max(1e-9);
    [lo, hi + span * 0.1]
}
