//! Baseline demand estimation.
//!
//! A time-decay weighted moving average over the cleaned series, so recent
//! days dominate. With two weeks or more of history a Holt-Winters one-step
//! forecast is blended in to keep the baseline responsive to trend.

use crate::cleaning::CleanedSample;
use crate::stats::{decay_weight, holt_winters, weighted_mean};

/// Default exponential decay rate per day of age.
pub const DEFAULT_DECAY_RATE: f64 = 0.05;

/// Samples needed before the Holt-Winters blend kicks in.
const MIN_SAMPLES_FOR_SMOOTHING: usize = 14;

/// Weekly seasonal period used by the smoothing pass.
const WEEKLY_PERIOD: usize = 7;

/// Time-decay weighted average of cleaned quantities.
///
/// weight(days_ago) = exp(-decay_rate * days_ago). Empty input yields 0.
pub fn decay_weighted_average(samples: &[CleanedSample], decay_rate: f64) -> f64 {
    let values: Vec<f64> = samples.iter().map(|s| s.cleaned_quantity).collect();
    let weights: Vec<f64> = samples
        .iter()
        .map(|s| decay_weight(s.days_ago.max(0) as f64, decay_rate))
        .collect();
    weighted_mean(&values, &weights)
}

/// Baseline demand estimate for a cleaned series.
///
/// The decay-weighted average always anchors the result; with at least 14
/// samples it is blended 50/50 with a Holt-Winters one-step-ahead forecast
/// (weekly period). Negative intermediate values clamp to 0.
pub fn estimate_baseline(samples: &[CleanedSample], decay_rate: f64) -> f64 {
    let decay_avg = decay_weighted_average(samples, decay_rate);

    if samples.len() < MIN_SAMPLES_FOR_SMOOTHING {
        return decay_avg.max(0.0);
    }

    // Oldest first for the chronological smoothing pass
    let mut chronological: Vec<&CleanedSample> = samples.iter().collect();
    chronological.sort_by_key(|s| s.date);
    let values: Vec<f64> = chronological.iter().map(|s| s.cleaned_quantity).collect();

    let smoothed = holt_winters(&values, WEEKLY_PERIOD, 0.3, 0.05, 0.1);
    let blended = 0.5 * decay_avg + 0.5 * smoothed.next.max(0.0);
    blended.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn sample(days_ago: i64, quantity: f64) -> CleanedSample {
        CleanedSample {
            date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap() - chrono::Duration::days(days_ago),
            quantity,
            cleaned_quantity: quantity,
            days_ago,
            is_outlier: false,
            is_special_event: false,
            weather: None,
        }
    }

    #[test]
    fn test_empty_input_yields_zero() {
        assert_eq!(decay_weighted_average(&[], DEFAULT_DECAY_RATE), 0.0);
        assert_eq!(estimate_baseline(&[], DEFAULT_DECAY_RATE), 0.0);
    }

    #[test]
    fn test_constant_series_is_identity() {
        let samples: Vec<CleanedSample> = (1..=10).map(|d| sample(d, 20.0)).collect();
        assert_relative_eq!(
            decay_weighted_average(&samples, DEFAULT_DECAY_RATE),
            20.0,
            epsilon = 1e-10
        );
        assert_relative_eq!(
            estimate_baseline(&samples, DEFAULT_DECAY_RATE),
            20.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_recent_days_dominate() {
        // Recent demand 30, old demand 10
        let mut samples: Vec<CleanedSample> = (1..=5).map(|d| sample(d, 30.0)).collect();
        samples.extend((60..=64).map(|d| sample(d, 10.0)));

        let avg = decay_weighted_average(&samples, DEFAULT_DECAY_RATE);
        assert!(avg > 25.0, "expected recency bias, got {avg}");
    }

    #[test]
    fn test_blend_follows_constant_long_series() {
        let samples: Vec<CleanedSample> = (1..=30).map(|d| sample(d, 20.0)).collect();
        let baseline = estimate_baseline(&samples, DEFAULT_DECAY_RATE);
        assert_relative_eq!(baseline, 20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_baseline_never_negative() {
        let samples: Vec<CleanedSample> = (1..=20)
            .map(|d| sample(d, if d % 2 == 0 { 0.0 } else { 1.0 }))
            .collect();
        assert!(estimate_baseline(&samples, DEFAULT_DECAY_RATE) >= 0.0);
    }
}
