use statrs::statistics::Statistics;

/// Arithmetic mean. Empty input yields 0.0 rather than NaN.
#[inline]
pub(crate) fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().mean()
}

/// Mean and sample (n-1) standard deviation.
/// Fewer than two samples have no spread, so the deviation is reported as 0.0.
#[inline]
pub(crate) fn mean_and_sample_stddev(data: &[f64]) -> (f64, f64) {
    match data.len() {
        0 => (0.0, 0.0),
        1 => (data[0], 0.0),
        _ => (data.iter().mean(), data.iter().std_dev()),
    }
}

/// Percentage change from `from` to `to`. A zero (or negative) base yields 0.0.
#[inline]
pub(crate) fn percent_change(from: f64, to: f64) -> f64 {
    if from > f64::EPSILON {
        (to - from) / from * 100.0
    } else {
        0.0
    }
}
