//! Numeric statistics helper backing the Execution Context's utilities
//! object. Intermediate sums use `rust_decimal` to avoid the rounding
//! drift plain `f64` accumulation picks up over many samples, then
//! convert to `f64` at the boundary for output.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Summary statistics over a sample of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    /// Number of samples.
    pub count: usize,
    /// Sum of all samples.
    pub sum: f64,
    /// Arithmetic mean, 0.0 if `count == 0`.
    pub mean: f64,
    /// Middle value (average of the two middle values for an even
    /// count), 0.0 if `count == 0`.
    pub median: f64,
    /// Smallest sample, 0.0 if `count == 0`.
    pub min: f64,
    /// Largest sample, 0.0 if `count == 0`.
    pub max: f64,
    /// Population variance, 0.0 if `count == 0`.
    pub variance: f64,
    /// Population standard deviation, 0.0 if `count == 0`.
    pub stddev: f64,
}

/// Compute `NumericStats` over `samples`. Returns all-zero stats for an
/// empty input.
#[must_use]
pub fn compute(samples: &[f64]) -> NumericStats {
    if samples.is_empty() {
        return NumericStats {
            count: 0,
            sum: 0.0,
            mean: 0.0,
            median: 0.0,
            min: 0.0,
            max: 0.0,
            variance: 0.0,
            stddev: 0.0,
        };
    }

    let decimals: Vec<Decimal> = samples
        .iter()
        .map(|v| Decimal::from_f64(*v).unwrap_or_default())
        .collect();

    let count = decimals.len();
    let sum: Decimal = decimals.iter().sum();
    let mean = sum / Decimal::from(count);

    let mut sorted = decimals.clone();
    sorted.sort_unstable();
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / Decimal::from(2)
    } else {
        sorted[count / 2]
    };

    let variance_sum: Decimal = decimals
        .iter()
        .map(|v| {
            let diff = *v - mean;
            diff * diff
        })
        .sum();
    let variance = variance_sum / Decimal::from(count);
    let stddev = variance.sqrt().unwrap_or_default();

    NumericStats {
        count,
        sum: sum.to_f64().unwrap_or(0.0),
        mean: mean.to_f64().unwrap_or(0.0),
        median: median.to_f64().unwrap_or(0.0),
        min: sorted.first().copied().unwrap_or_default().to_f64().unwrap_or(0.0),
        max: sorted.last().copied().unwrap_or_default().to_f64().unwrap_or(0.0),
        variance: variance.to_f64().unwrap_or(0.0),
        stddev: stddev.to_f64().unwrap_or(0.0),
    }
}
