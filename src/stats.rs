//! Aggregation helpers shared by the samplers.
//!
//! All helpers return `None` for an empty input instead of a NaN.

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean absolute deviation of `values` from their mean.
pub fn mean_absolute_deviation(values: &[f64]) -> Option<f64> {
    let center = mean(values)?;

    let deviations: Vec<f64> =
        values.iter().map(|value| (value - center).abs()).collect();

    mean(&deviations)
}

/// Mean of the last `window` values (or of all of them when fewer exist).
pub fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    let start = values.len().saturating_sub(window.max(1));

    mean(&values[start..])
}

/// Mean after discarding the lowest and highest `fraction` of samples.
///
/// Samples are sorted ascending and the slice `[floor(n * fraction),
/// floor(n * (1 - fraction)))` is averaged. When that slice is empty the
/// mean of every sample is returned instead.
pub fn trimmed_mean(values: &[f64], fraction: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let len = sorted.len() as f64;
    let lower = (len * fraction).floor() as usize;
    let upper = ((len * (1.0 - fraction)).floor() as usize).min(sorted.len());

    if lower < upper {
        mean(&sorted[lower..upper])
    } else {
        mean(&sorted)
    }
}
