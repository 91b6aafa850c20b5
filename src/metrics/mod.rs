//! Shared numeric helpers for trends, variability and smoothing.

pub mod stats;

pub use stats::{coefficient_of_variation, ema, linear_regression, mean, relative_trend, std_dev};
