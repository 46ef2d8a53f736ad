//! Input loudness metering

/// Root-mean-square level of a frame
///
/// Returns a value in `[0, 1]` for normalized input; an empty or silent
/// frame yields `0.0`.
#[must_use]
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = frame.iter().map(|s| s * s).sum();
    #[allow(clippy::cast_precision_loss)]
    let level = (sum_squares / frame.len() as f32).sqrt();

    if level.is_finite() { level.min(1.0) } else { 0.0 }
}
