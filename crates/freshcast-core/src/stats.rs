//! Series statistics shared across the forecasting pipeline.
//!
//! Quartiles, weighted averages, exponential smoothing and slope estimation.
//! All functions are pure and treat empty input as a defined degenerate case
//! rather than an error, since upstream filtering regularly produces empty
//! series for thin markets.

/// Quartile summary of a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

impl Quartiles {
    /// Interquartile range (q3 - q1).
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Tukey fences at 1.5 * IQR.
    ///
    /// Values outside `(lower, upper)` are outlier candidates.
    pub fn fences(&self) -> (f64, f64) {
        let iqr = self.iqr();
        (self.q1 - 1.5 * iqr, self.q3 + 1.5 * iqr)
    }
}

/// Compute percentile using linear interpolation on a sorted slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let n = sorted.len() as f64;
    let idx = p.clamp(0.0, 1.0) * (n - 1.0);
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    let frac = idx - lower as f64;

    if upper >= sorted.len() {
        sorted[sorted.len() - 1]
    } else {
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Compute Q1/median/Q3 for an unsorted sample.
pub fn quartiles(values: &[f64]) -> Quartiles {
    if values.is_empty() {
        return Quartiles::default();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Quartiles {
        q1: percentile(&sorted, 0.25),
        median: percentile(&sorted, 0.5),
        q3: percentile(&sorted, 0.75),
    }
}

/// Median of an unsorted sample.
pub fn median(values: &[f64]) -> f64 {
    quartiles(values).median
}

/// Arithmetic mean. Empty input yields 0.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Weighted arithmetic mean. Zero total weight yields 0.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= f64::EPSILON {
        return 0.0;
    }
    values
        .iter()
        .zip(weights.iter())
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / total
}

/// Exponential decay weight for an observation `days_ago` in the past.
pub fn decay_weight(days_ago: f64, decay_rate: f64) -> f64 {
    (-decay_rate * days_ago).exp()
}

/// Exponentially weighted moving average over a chronological series.
///
/// The first value seeds the average; later values are folded in with
/// weight `alpha`. Empty input yields 0.
pub fn ewma(values: &[f64], alpha: f64) -> f64 {
    let mut iter = values.iter();
    let Some(&first) = iter.next() else {
        return 0.0;
    };
    iter.fold(first, |acc, &v| alpha * v + (1.0 - alpha) * acc)
}

/// Sample standard deviation (n-1 denominator). Fewer than 2 values yields 0.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Coefficient of variation (std_dev / mean). Zero mean yields 0.
pub fn coef_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() <= f64::EPSILON {
        return 0.0;
    }
    std_dev(values) / m.abs()
}

/// Least-squares slope of `values` over indices 0..n.
///
/// Fewer than 2 values yields 0.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = mean(values);

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        ss_xy += (x - x_mean) * (y - y_mean);
        ss_xx += (x - x_mean).powi(2);
    }

    if ss_xx.abs() <= f64::EPSILON {
        0.0
    } else {
        ss_xy / ss_xx
    }
}

/// Result of Holt-Winters triple exponential smoothing.
#[derive(Debug, Clone)]
pub struct HoltWintersResult {
    /// Smoothed in-sample values
    pub smoothed: Vec<f64>,
    /// One-step-ahead forecast from the final state
    pub next: f64,
}

/// Holt-Winters additive smoothing with a fixed seasonal period.
///
/// Requires at least two full seasons; shorter input falls back to simple
/// exponential smoothing of the level (no trend/seasonal state).
pub fn holt_winters(
    values: &[f64],
    period: usize,
    alpha: f64,
    beta: f64,
    gamma: f64,
) -> HoltWintersResult {
    let n = values.len();
    if period == 0 || n < 2 * period {
        let mut smoothed = Vec::with_capacity(n);
        let mut level = values.first().copied().unwrap_or(0.0);
        for &v in values {
            level = alpha * v + (1.0 - alpha) * level;
            smoothed.push(level);
        }
        return HoltWintersResult {
            smoothed,
            next: level,
        };
    }

    // Initial level/trend from the first two seasons.
    let first_season_mean = mean(&values[..period]);
    let second_season_mean = mean(&values[period..2 * period]);
    let mut level = first_season_mean;
    let mut trend = (second_season_mean - first_season_mean) / period as f64;
    let mut seasonal: Vec<f64> = values[..period]
        .iter()
        .map(|v| v - first_season_mean)
        .collect();

    let mut smoothed = Vec::with_capacity(n);
    for (i, &v) in values.iter().enumerate() {
        let s_idx = i % period;
        let prev_level = level;

        level = alpha * (v - seasonal[s_idx]) + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        seasonal[s_idx] = gamma * (v - level) + (1.0 - gamma) * seasonal[s_idx];

        smoothed.push(level + trend + seasonal[s_idx]);
    }

    let next = level + trend + seasonal[n % period];
    HoltWintersResult { smoothed, next }
}
