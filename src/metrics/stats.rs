//! Numeric helpers shared by the fatigue and progression engines.
//!
//! All functions are total: empty or degenerate inputs return `None`
//! rather than NaN so callers can decide what "no signal" means.

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Coefficient of variation (`stddev / mean`).
///
/// Returns `None` when the mean is not positive.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    if mean <= 0.0 {
        return None;
    }
    Some(std_dev(values)? / mean)
}

/// Least-squares line through `(index, value)` points.
///
/// Returns `(slope, intercept)`; needs at least two points.
pub fn linear_regression(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = mean(values)?;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (y - mean_y);
        denominator += dx * dx;
    }

    if denominator == 0.0 {
        return None;
    }

    let slope = numerator / denominator;
    Some((slope, mean_y - slope * mean_x))
}

/// Relative change implied by the fitted trend across the whole series.
///
/// `slope × (n - 1) / mean`, e.g. `0.04` means the trend line rose 4 %
/// from the first to the last point.
pub fn relative_trend(values: &[f64]) -> Option<f64> {
    let (slope, _) = linear_regression(values)?;
    let mean = mean(values)?;
    if mean == 0.0 {
        return None;
    }
    Some(slope * (values.len() - 1) as f64 / mean)
}

/// One step of an exponential moving average.
///
/// The first observation seeds the average.
pub fn ema(previous: Option<f64>, observed: f64, alpha: f64) -> f64 {
    match previous {
        Some(prev) => alpha * observed + (1.0 - alpha) * prev,
        None => observed,
    }
}

/// Round to the nearest multiple of `step` (e.g. 0.5 for resistance).
pub fn round_to_step(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}
