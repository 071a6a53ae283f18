//! Self-learned seasonality factors.
//!
//! Each historical day is compared against a 30-day rolling mean of the
//! days strictly before it; the ratios are aggregated per weekday with a
//! median so single spikes cannot drag a weekday factor. Payday and
//! per-weather effects are then separated out of the residuals that remain
//! after the weekday correction, so the three factor families do not
//! double-count each other.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::calendar::{is_payday, HolidayCalendar, PAYDAY_FACTOR};
use crate::cleaning::CleanedSample;
use crate::stats::{mean, median};
use crate::weather::WeatherCondition;

/// Minimum history before any factor is learned.
const MIN_HISTORY: usize = 10;

/// Rolling-mean window, in days.
const ROLLING_WINDOW_DAYS: i64 = 30;

/// Prior days required inside the window before a ratio is taken.
const MIN_PRIOR_DAYS: usize = 5;

/// Clip bounds for raw weekday ratios.
const RAW_RATIO_CLIP: (f64, f64) = (0.1, 5.0);

/// Clip bounds for post-weekday residuals.
const RESIDUAL_CLIP: (f64, f64) = (0.2, 4.0);

/// Residual samples required to learn the payday factor.
const MIN_PAYDAY_SAMPLES: usize = 3;

/// Residual samples per condition required to learn a weather factor.
const MIN_WEATHER_SAMPLES: usize = 2;

/// Default payday factor when residual samples are too few.
const DEFAULT_PAYDAY_FACTOR: f64 = 1.1;

/// Learned seasonality factors for one (product, market) pair.
#[derive(Debug, Clone)]
pub struct SeasonalityFactors {
    /// Mean cleaned demand over the history used
    pub baseline: f64,
    /// Demand multipliers per weekday, Monday first
    pub weekday_factors: [f64; 7],
    /// Residual demand multipliers per weather condition
    pub weather_factors: HashMap<WeatherCondition, f64>,
    /// Residual payday multiplier
    pub payday_factor: f64,
    /// History points the factors were learned from
    pub data_points: usize,
    /// min(1, data_points / 30)
    pub confidence: f64,
}

impl Default for SeasonalityFactors {
    fn default() -> Self {
        Self {
            baseline: 0.0,
            weekday_factors: [1.0; 7],
            weather_factors: HashMap::new(),
            payday_factor: 1.0,
            data_points: 0,
            confidence: 0.0,
        }
    }
}

impl SeasonalityFactors {
    /// Learned weather residual factor; 1.0 for unseen conditions.
    pub fn weather_factor(&self, condition: WeatherCondition) -> f64 {
        self.weather_factors.get(&condition).copied().unwrap_or(1.0)
    }
}

/// Result of applying seasonality factors to a running forecast value.
#[derive(Debug, Clone)]
pub struct SeasonalityApplication {
    pub adjusted_forecast: f64,
    pub weekday_factor: f64,
    pub weather_factor: f64,
    /// Static calendar contribution (holiday/near-holiday/payday x month)
    pub calendar_factor: f64,
    /// Exact holiday name when one matched the target date
    pub holiday: Option<String>,
    /// Product of all applied multipliers
    pub combined_factor: f64,
}

/// Learn seasonality factors from a chronological cleaned series.
///
/// Fewer than 10 history points returns the neutral factor set (all weekday
/// factors 1.0, payday 1.0, confidence 0).
pub fn calculate_seasonality_factors(samples: &[CleanedSample]) -> SeasonalityFactors {
    let n = samples.len();
    if n < MIN_HISTORY {
        return SeasonalityFactors {
            baseline: mean(
                &samples
                    .iter()
                    .map(|s| s.cleaned_quantity)
                    .collect::<Vec<_>>(),
            ),
            data_points: n,
            ..SeasonalityFactors::default()
        };
    }

    let mut chronological: Vec<&CleanedSample> = samples.iter().collect();
    chronological.sort_by_key(|s| s.date);

    let by_date: HashMap<NaiveDate, f64> = chronological
        .iter()
        .map(|s| (s.date, s.cleaned_quantity))
        .collect();

    // Raw weekday ratios against the strictly-prior rolling mean
    let mut weekday_ratios: [Vec<f64>; 7] = Default::default();
    let mut residual_inputs: Vec<(&CleanedSample, f64)> = Vec::new();

    for &sample in &chronological {
        let Some(rolling) = rolling_mean_before(&by_date, sample.date) else {
            continue;
        };
        if rolling <= f64::EPSILON {
            continue;
        }

        let ratio = (sample.cleaned_quantity / rolling).clamp(RAW_RATIO_CLIP.0, RAW_RATIO_CLIP.1);
        let weekday = sample.date.weekday().num_days_from_monday() as usize;
        weekday_ratios[weekday].push(ratio);
        residual_inputs.push((sample, rolling));
    }

    let mut weekday_factors = [1.0f64; 7];
    for (weekday, ratios) in weekday_ratios.iter().enumerate() {
        if !ratios.is_empty() {
            weekday_factors[weekday] = median(ratios);
        }
    }

    // Residuals after the weekday correction carry the payday and weather
    // effects.
    let mut payday_residuals: Vec<f64> = Vec::new();
    let mut weather_residuals: HashMap<WeatherCondition, Vec<f64>> = HashMap::new();

    for (sample, rolling) in residual_inputs {
        let weekday = sample.date.weekday().num_days_from_monday() as usize;
        let expected = rolling * weekday_factors[weekday];
        if expected <= f64::EPSILON {
            continue;
        }

        let residual =
            (sample.cleaned_quantity / expected).clamp(RESIDUAL_CLIP.0, RESIDUAL_CLIP.1);

        if is_payday(sample.date) {
            payday_residuals.push(residual);
        }
        if let Some(condition) = sample.weather {
            weather_residuals.entry(condition).or_default().push(residual);
        }
    }

    let payday_factor = if payday_residuals.len() >= MIN_PAYDAY_SAMPLES {
        mean(&payday_residuals)
    } else {
        DEFAULT_PAYDAY_FACTOR
    };

    let weather_factors: HashMap<WeatherCondition, f64> = weather_residuals
        .into_iter()
        .filter(|(_, residuals)| residuals.len() >= MIN_WEATHER_SAMPLES)
        .map(|(condition, residuals)| (condition, mean(&residuals)))
        .collect();

    SeasonalityFactors {
        baseline: mean(
            &chronological
                .iter()
                .map(|s| s.cleaned_quantity)
                .collect::<Vec<_>>(),
        ),
        weekday_factors,
        weather_factors,
        payday_factor,
        data_points: n,
        confidence: (n as f64 / 30.0).min(1.0),
    }
}

/// Apply learned factors plus the static calendar to a running forecast.
///
/// A zero baseline stays zero. The payday slot of the calendar effect uses
/// the learned payday factor once factors exist, and the static default
/// before that.
pub fn apply_seasonality_factors(
    baseline: f64,
    factors: &SeasonalityFactors,
    target_date: NaiveDate,
    target_weather: Option<WeatherCondition>,
    calendar: &HolidayCalendar,
) -> SeasonalityApplication {
    let weekday = target_date.weekday().num_days_from_monday() as usize;
    let weekday_factor = factors.weekday_factors[weekday];
    let weather_factor = target_weather
        .map(|c| factors.weather_factor(c))
        .unwrap_or(1.0);

    let payday_factor = if factors.data_points >= MIN_HISTORY {
        factors.payday_factor
    } else {
        PAYDAY_FACTOR
    };
    let calendar_effect = calendar.effect_with_payday(target_date, payday_factor);

    let combined_factor = weekday_factor * weather_factor * calendar_effect.factor;
    let adjusted = (baseline * combined_factor).max(0.0);

    SeasonalityApplication {
        adjusted_forecast: if baseline <= 0.0 { 0.0 } else { adjusted },
        weekday_factor,
        weather_factor,
        calendar_factor: calendar_effect.factor,
        holiday: calendar_effect.holiday,
        combined_factor,
    }
}

/// Mean demand over the 30 days strictly before `date`.
///
/// Returns `None` with fewer than 5 prior days in the window.
fn rolling_mean_before(by_date: &HashMap<NaiveDate, f64>, date: NaiveDate) -> Option<f64> {
    let mut values = Vec::new();
    for offset in 1..=ROLLING_WINDOW_DAYS {
        let probe = date - Duration::days(offset);
        if let Some(&quantity) = by_date.get(&probe) {
            values.push(quantity);
        }
    }
    if values.len() < MIN_PRIOR_DAYS {
        None
    } else {
        Some(mean(&values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample(d: NaiveDate, quantity: f64) -> CleanedSample {
        CleanedSample {
            date: d,
            quantity,
            cleaned_quantity: quantity,
            days_ago: 0,
            is_outlier: false,
            is_special_event: false,
            weather: None,
        }
    }

    /// Daily history over consecutive mid-month stretches, avoiding paydays.
    fn flat_history(start: NaiveDate, days: usize, quantity: f64) -> Vec<CleanedSample> {
        (0..days)
            .map(|i| sample(start + Duration::days(i as i64), quantity))
            .collect()
    }

    #[test]
    fn test_thin_history_is_neutral() {
        let samples = flat_history(date(2025, 6, 6), 9, 20.0);
        let factors = calculate_seasonality_factors(&samples);
        assert_eq!(factors.weekday_factors, [1.0; 7]);
        assert_relative_eq!(factors.payday_factor, 1.0);
        assert_eq!(factors.confidence, 0.0);
        assert!(factors.weather_factors.is_empty());
        assert_eq!(factors.data_points, 9);
    }

    #[test]
    fn test_flat_history_learns_neutral_weekdays() {
        let samples = flat_history(date(2025, 6, 6), 18, 20.0);
        let factors = calculate_seasonality_factors(&samples);
        for factor in factors.weekday_factors {
            assert_relative_eq!(factor, 1.0, epsilon = 1e-9);
        }
        assert_relative_eq!(factors.baseline, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_elevated_weekday_detected() {
        // Saturdays sell double for six straight weeks
        let start = date(2025, 6, 2); // a Monday
        let samples: Vec<CleanedSample> = (0..42)
            .map(|i| {
                let d = start + Duration::days(i);
                let q = if d.weekday() == chrono::Weekday::Sat {
                    40.0
                } else {
                    20.0
                };
                sample(d, q)
            })
            .collect();

        let factors = calculate_seasonality_factors(&samples);
        let saturday = factors.weekday_factors[5];
        let tuesday = factors.weekday_factors[1];
        assert!(
            saturday > 1.3,
            "Saturday factor should be elevated, got {saturday}"
        );
        assert!(saturday > tuesday);
    }

    #[test]
    fn test_confidence_non_decreasing_in_sample_count() {
        let few = calculate_seasonality_factors(&flat_history(date(2025, 6, 6), 12, 20.0));
        let more = calculate_seasonality_factors(&flat_history(date(2025, 5, 6), 40, 20.0));
        assert!(few.confidence <= more.confidence);
        assert_relative_eq!(more.confidence, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_weather_residuals_need_two_samples() {
        let mut samples = flat_history(date(2025, 6, 2), 30, 20.0);
        // One rainy day only: no learned rain factor
        samples[20].weather = Some(WeatherCondition::Rain);
        let factors = calculate_seasonality_factors(&samples);
        assert!(!factors.weather_factors.contains_key(&WeatherCondition::Rain));

        // Two rainy days: factor learned
        samples[22].weather = Some(WeatherCondition::Rain);
        let factors = calculate_seasonality_factors(&samples);
        assert!(factors.weather_factors.contains_key(&WeatherCondition::Rain));
    }

    #[test]
    fn test_apply_zero_baseline_stays_zero() {
        let factors = calculate_seasonality_factors(&flat_history(date(2025, 6, 2), 30, 20.0));
        let calendar = HolidayCalendar::builtin();
        let result =
            apply_seasonality_factors(0.0, &factors, date(2025, 9, 13), None, &calendar);
        assert_eq!(result.adjusted_forecast, 0.0);
    }

    #[test]
    fn test_apply_combines_multiplicatively() {
        let mut factors = SeasonalityFactors {
            data_points: 30,
            confidence: 1.0,
            baseline: 20.0,
            ..SeasonalityFactors::default()
        };
        factors.weekday_factors[5] = 1.5; // Saturday
        factors
            .weather_factors
            .insert(WeatherCondition::Rain, 0.8);
        factors.payday_factor = 1.1;

        let calendar = HolidayCalendar::new();
        // 2025-09-13 is a mid-month Saturday (no payday, no holiday);
        // September month factor is 1.0
        let result = apply_seasonality_factors(
            20.0,
            &factors,
            date(2025, 9, 13),
            Some(WeatherCondition::Rain),
            &calendar,
        );
        assert_relative_eq!(result.weekday_factor, 1.5, epsilon = 1e-9);
        assert_relative_eq!(result.weather_factor, 0.8, epsilon = 1e-9);
        assert_relative_eq!(result.calendar_factor, 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.adjusted_forecast, 20.0 * 1.5 * 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_learned_payday_factor_used_on_paydays() {
        let mut factors = SeasonalityFactors {
            data_points: 30,
            confidence: 1.0,
            ..SeasonalityFactors::default()
        };
        factors.payday_factor = 1.4;

        let calendar = HolidayCalendar::new();
        // 2025-09-26 is a payday Friday; September month factor 1.0
        let result =
            apply_seasonality_factors(20.0, &factors, date(2025, 9, 26), None, &calendar);
        assert_relative_eq!(result.calendar_factor, 1.4, epsilon = 1e-9);
    }
}
