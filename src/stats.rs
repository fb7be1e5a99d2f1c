//! Descriptive statistics
//!
//! Every dispersion in Worksignal is the sample standard deviation (n - 1
//! denominator) and every percentile uses linear interpolation between the
//! closest ranks. Results that cannot be computed come back as undefined
//! `Measure`s instead of NaN.

use crate::types::{Measure, UndefinedReason};
use serde::{Deserialize, Serialize};

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Measure {
    if values.is_empty() {
        return Measure::undefined(UndefinedReason::NoSamples);
    }
    Measure::defined(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std(values: &[f64]) -> Measure {
    match values.len() {
        0 => Measure::undefined(UndefinedReason::NoSamples),
        1 => Measure::undefined(UndefinedReason::InsufficientSamples),
        n => {
            let mean = values.iter().sum::<f64>() / n as f64;
            let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            Measure::defined(variance.sqrt())
        }
    }
}

/// Linear-interpolation percentile, `p` in [0, 100]
///
/// Formula: `rank = p / 100 * (n - 1)`, interpolating between
/// `sorted[floor(rank)]` and `sorted[ceil(rank)]`.
pub fn percentile(values: &[f64], p: f64) -> Measure {
    if values.is_empty() {
        return Measure::undefined(UndefinedReason::NoSamples);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Measure::defined(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

pub fn median(values: &[f64]) -> Measure {
    percentile(values, 50.0)
}

/// Coefficient of variation: `std / mean`
pub fn coefficient_of_variation(values: &[f64]) -> Measure {
    let std = sample_std(values);
    match (mean(values).value(), std.value()) {
        (Some(m), Some(_)) if m == 0.0 => Measure::undefined(UndefinedReason::ZeroMean),
        (Some(m), Some(s)) => Measure::defined(s / m),
        _ => std,
    }
}

/// Pearson correlation coefficient of paired values
///
/// Undefined for fewer than two pairs or when either side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Measure {
    let n = xs.len().min(ys.len());
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let (Some(mx), Some(my)) = (mean(xs).value(), mean(ys).value()) else {
        return Measure::undefined(UndefinedReason::NoSamples);
    };
    if n < 2 {
        return Measure::undefined(UndefinedReason::InsufficientSamples);
    }
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        var_x += (x - mx).powi(2);
        var_y += (y - my).powi(2);
    }
    Measure::ratio(cov, (var_x * var_y).sqrt())
}

/// Count of distinct values (exact float equality)
pub fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

/// Five-number summary plus mean and standard deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub count: usize,
    pub mean: Measure,
    pub std: Measure,
    pub min: Measure,
    pub p25: Measure,
    pub median: Measure,
    pub p75: Measure,
    pub max: Measure,
}

impl Distribution {
    pub fn describe(values: &[f64]) -> Self {
        Self {
            count: values.len(),
            mean: mean(values),
            std: sample_std(values),
            min: percentile(values, 0.0),
            p25: percentile(values, 25.0),
            median: median(values),
            p75: percentile(values, 75.0),
            max: percentile(values, 100.0),
        }
    }
}

/// Values outside the Tukey fences `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outliers {
    pub lower_bound: Measure,
    pub upper_bound: Measure,
    pub count: usize,
    /// `count` over all values
    pub share: Measure,
}

impl Outliers {
    pub fn iqr(values: &[f64]) -> Self {
        let (Some(q1), Some(q3)) = (percentile(values, 25.0).value(), percentile(values, 75.0).value())
        else {
            let undefined = Measure::undefined(UndefinedReason::NoSamples);
            return Self {
                lower_bound: undefined,
                upper_bound: undefined,
                count: 0,
                share: undefined,
            };
        };
        let iqr = q3 - q1;
        let (lower, upper) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
        let count = values.iter().filter(|&&v| v < lower || v > upper).count();
        Self {
            lower_bound: Measure::defined(lower),
            upper_bound: Measure::defined(upper),
            count,
            share: Measure::ratio(count as f64, values.len() as f64),
        }
    }
}

/// Mean and sample standard deviation of one group of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub count: usize,
    pub mean: Measure,
    pub std: Measure,
}

impl SeriesStats {
    pub fn of(values: &[f64]) -> Self {
        Self {
            count: values.len(),
            mean: mean(values),
            std: sample_std(values),
        }
    }
}
