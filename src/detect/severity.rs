//! Severity scoring
//!
//! Maps the magnitude of a detected shift onto the 0..100 scale used by
//! event consumers.

/// Severity of a mean shift between the old and new regime
///
/// The relative difference is taken against the smaller mean; ratios above
/// one fold back through `1 - 1/r` so the score stays bounded.
pub fn mean_shift_severity(old_mean: f64, new_mean: f64) -> u8 {
    let abs_diff = (old_mean - new_mean).abs();
    let floor = old_mean.min(new_mean);
    let rel = if floor <= 0.0 {
        if abs_diff > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        abs_diff / floor
    };
    let norm = if rel <= 1.0 { rel } else { 1.0 - 1.0 / rel };
    (norm * 100.0).floor().clamp(0.0, 100.0) as u8
}

/// Expected latency jump per RTT band, in milliseconds
const LATENCY_BASELINE: &[(f64, f64)] = &[
    (5.0, 5.0),
    (20.0, 10.0),
    (50.0, 20.0),
    (100.0, 30.0),
];

/// Expected jump for RTTs beyond the banded table
const LATENCY_BASELINE_MAX: f64 = 50.0;

/// Severity of a latency jump against a piecewise empirical baseline
///
/// A jump equal to the baseline for its band scores 50; twice the baseline
/// saturates the scale.
pub fn latency_severity(old_ms: f64, new_ms: f64) -> u8 {
    let jump = (new_ms - old_ms).abs();
    let base = LATENCY_BASELINE
        .iter()
        .find(|(upper, _)| old_ms < *upper)
        .map(|(_, b)| *b)
        .unwrap_or(LATENCY_BASELINE_MAX);
    (jump / base * 50.0).floor().clamp(0.0, 100.0) as u8
}
