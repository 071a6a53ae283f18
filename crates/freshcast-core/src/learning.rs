//! Self-learning correction from realized forecast errors.
//!
//! The host keeps a log of what was forecast and what actually sold; this
//! module turns that log into a bias correction for the next forecast.
//! Suspected stockouts are uncensored first (a day that sold out tells us
//! demand was at least the stock, not equal to it), so the corrector does
//! not learn a false downward bias from unobserved excess demand.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::stats::{ewma, linear_slope, mean, std_dev};
use crate::types::{PlannedForecast, SaleRecord};
use crate::weather::WeatherCondition;

/// Error samples required before any correction is made.
pub const MIN_ERROR_SAMPLES: usize = 3;

/// EWMA smoothing factor over chronological errors.
const EWMA_ALPHA: f64 = 0.3;

/// Actual-to-forecast ratio above which a stockout is suspected.
const STOCKOUT_SUSPECT_RATIO: f64 = 0.95;

/// Inflation applied to a suspected-stockout actual.
const UNCENSOR_FACTOR: f64 = 1.25;

/// Samples per weekday bucket before the bucket contributes bias.
const MIN_WEEKDAY_BUCKET: usize = 2;

/// Trailing points used for the momentum slope.
const MOMENTUM_POINTS: usize = 5;

/// Adaptive gain step per consecutive same-sign error, and its cap.
const GAIN_STEP: f64 = 0.1;
const GAIN_CAP: f64 = 1.5;

/// Minimum samples for the mid-month and per-weekday patterns.
const MIN_PATTERN_SAMPLES: usize = 3;

/// Minimum samples for a weather+weekend pattern.
const MIN_WEATHER_PATTERN_SAMPLES: usize = 2;

/// One realized forecast error for a (product, market) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastErrorRecord {
    pub product_id: String,
    pub market_id: String,
    pub date: NaiveDate,
    pub forecast_qty: f64,
    /// Observed sales; a stockout censors true demand at the stock level
    pub actual_qty: f64,
    /// forecast - actual, as observed (positive = overforecast)
    pub error: f64,
    pub is_stockout: bool,
    pub weather: Option<WeatherCondition>,
}

/// Bias correction derived from the error history.
#[derive(Debug, Clone)]
pub struct BiasCorrection {
    /// EWMA of uncensored errors, chronological
    pub ewma_bias: f64,
    /// Mean uncensored error per weekday, Monday first; `None` below the
    /// per-bucket sample floor
    pub weekday_bias: [Option<f64>; 7],
    /// Least-squares slope of uncensored demand over the last 5 points
    pub momentum: f64,
    /// Sample standard deviation of uncensored demand
    pub volatility: f64,
    /// 1.0 plus 0.1 per trailing error agreeing with the EWMA sign
    pub adaptive_gain: f64,
    /// 0-100, discounted 20% when demand is highly volatile
    pub confidence: f64,
    pub sample_count: usize,
}

/// A recurring conditional deviation mined from the error log.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// Demand bump on days 14-16
    MidMonthBump,
    /// Deviation on weekends under a specific weather condition
    WeatherWeekend(WeatherCondition),
    /// Deviation concentrated on one weekday
    WeekdayDeviation(Weekday),
}

/// A detected pattern with its mean signed adjustment (positive = the
/// forecast should be raised when the pattern fires).
#[derive(Debug, Clone)]
pub struct DeviationPattern {
    pub kind: PatternKind,
    pub adjustment: f64,
    pub samples: usize,
    pub confidence: f64,
}

impl DeviationPattern {
    /// Whether this pattern's trigger matches a target date/weather.
    pub fn matches(&self, target: NaiveDate, weather: Option<WeatherCondition>) -> bool {
        match self.kind {
            PatternKind::MidMonthBump => (14..=16).contains(&target.day()),
            PatternKind::WeatherWeekend(condition) => {
                is_weekend(target) && weather == Some(condition)
            }
            PatternKind::WeekdayDeviation(weekday) => target.weekday() == weekday,
        }
    }
}

/// Outcome of applying a correction to a raw forecast.
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    pub corrected_quantity: u32,
    /// Average of the weekday bucket and the EWMA bias
    pub combined_bias: f64,
    pub gain_used: f64,
    /// Net adjustment from matched patterns
    pub pattern_adjustment: f64,
    /// Kinds of the patterns that fired
    pub applied_patterns: Vec<PatternKind>,
}

/// Join planned forecasts against realized sales into error records.
///
/// A plan's actual is the summed sale quantity for its (product, market,
/// date); days with no sales at all count as zero actual. A stockout is
/// suspected when the actual reaches 95% of the forecast.
pub fn compute_forecast_errors(
    planned: &[PlannedForecast],
    sales: &[SaleRecord],
) -> Vec<ForecastErrorRecord> {
    planned
        .iter()
        .map(|plan| {
            let mut actual = 0.0;
            let mut weather = plan.weather_forecast;
            for record in sales {
                if record.product_id == plan.product_id
                    && record.market_id == plan.market_id
                    && record.date == plan.forecast_for
                {
                    actual += record.quantity_sold.max(0.0);
                    if weather.is_none() {
                        weather = record.weather;
                    }
                }
            }

            let forecast = plan.optimal_quantity as f64;
            ForecastErrorRecord {
                product_id: plan.product_id.clone(),
                market_id: plan.market_id.clone(),
                date: plan.forecast_for,
                forecast_qty: forecast,
                actual_qty: actual,
                error: forecast - actual,
                is_stockout: forecast > 0.0 && actual >= STOCKOUT_SUSPECT_RATIO * forecast,
                weather,
            }
        })
        .collect()
}

/// Derive a bias correction from the error history.
///
/// Returns `None` with fewer than 3 samples; the correction step is then a
/// no-op.
pub fn compute_bias_correction(errors: &[ForecastErrorRecord]) -> Option<BiasCorrection> {
    if errors.len() < MIN_ERROR_SAMPLES {
        return None;
    }

    let mut chronological: Vec<&ForecastErrorRecord> = errors.iter().collect();
    chronological.sort_by_key(|e| e.date);

    let actuals: Vec<f64> = chronological.iter().map(|e| uncensored_actual(e)).collect();
    let errs: Vec<f64> = chronological
        .iter()
        .zip(actuals.iter())
        .map(|(e, &actual)| e.forecast_qty - actual)
        .collect();

    let ewma_bias = ewma(&errs, EWMA_ALPHA);

    let mut weekday_buckets: [Vec<f64>; 7] = Default::default();
    for (record, &err) in chronological.iter().zip(errs.iter()) {
        weekday_buckets[record.date.weekday().num_days_from_monday() as usize].push(err);
    }
    let mut weekday_bias: [Option<f64>; 7] = [None; 7];
    for (weekday, bucket) in weekday_buckets.iter().enumerate() {
        if bucket.len() >= MIN_WEEKDAY_BUCKET {
            weekday_bias[weekday] = Some(mean(bucket));
        }
    }

    let momentum_window = &actuals[actuals.len().saturating_sub(MOMENTUM_POINTS)..];
    let momentum = linear_slope(momentum_window);

    let volatility = std_dev(&actuals);

    // Trailing run of errors agreeing with the EWMA's sign
    let mut consecutive = 0usize;
    for &err in errs.iter().rev() {
        if err.signum() == ewma_bias.signum() && err != 0.0 {
            consecutive += 1;
        } else {
            break;
        }
    }
    let adaptive_gain = (1.0 + GAIN_STEP * consecutive as f64).min(GAIN_CAP);

    let mean_actual = mean(&actuals);
    let mut confidence = (errors.len() as f64 * 10.0).min(100.0);
    if volatility > 0.5 * mean_actual && mean_actual > 0.0 {
        confidence *= 0.8;
    }

    Some(BiasCorrection {
        ewma_bias,
        weekday_bias,
        momentum,
        volatility,
        adaptive_gain,
        confidence,
        sample_count: errors.len(),
    })
}

/// Mine the error log for recurring conditional deviations.
pub fn detect_patterns(errors: &[ForecastErrorRecord]) -> Vec<DeviationPattern> {
    let mut patterns = Vec::new();

    // Deviation = uncensored actual - forecast: positive means the forecast
    // ran short whenever the condition held.
    let deviation = |e: &ForecastErrorRecord| uncensored_actual(e) - e.forecast_qty;
    let mean_demand = mean(
        &errors
            .iter()
            .map(|e| uncensored_actual(e))
            .collect::<Vec<_>>(),
    );
    let significant = |adj: f64| adj.abs() > (0.1 * mean_demand).max(0.5);

    // Mid-month bump, days 14-16
    let mid_month: Vec<f64> = errors
        .iter()
        .filter(|e| (14..=16).contains(&e.date.day()))
        .map(deviation)
        .collect();
    if mid_month.len() >= MIN_PATTERN_SAMPLES {
        let adjustment = mean(&mid_month);
        if significant(adjustment) {
            patterns.push(DeviationPattern {
                kind: PatternKind::MidMonthBump,
                adjustment,
                samples: mid_month.len(),
                confidence: pattern_confidence(mid_month.len()),
            });
        }
    }

    // Weather + weekend combinations
    for condition in WeatherCondition::ALL {
        let matching: Vec<f64> = errors
            .iter()
            .filter(|e| is_weekend(e.date) && e.weather == Some(condition))
            .map(deviation)
            .collect();
        if matching.len() >= MIN_WEATHER_PATTERN_SAMPLES {
            let adjustment = mean(&matching);
            if significant(adjustment) {
                patterns.push(DeviationPattern {
                    kind: PatternKind::WeatherWeekend(condition),
                    adjustment,
                    samples: matching.len(),
                    confidence: pattern_confidence(matching.len()),
                });
            }
        }
    }

    // Per-weekday deviations
    for weekday in [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ] {
        let matching: Vec<f64> = errors
            .iter()
            .filter(|e| e.date.weekday() == weekday)
            .map(deviation)
            .collect();
        if matching.len() >= MIN_PATTERN_SAMPLES {
            let adjustment = mean(&matching);
            if significant(adjustment) {
                patterns.push(DeviationPattern {
                    kind: PatternKind::WeekdayDeviation(weekday),
                    adjustment,
                    samples: matching.len(),
                    confidence: pattern_confidence(matching.len()),
                });
            }
        }
    }

    patterns
}

/// Apply a bias correction and any matching patterns to a raw forecast.
///
/// combined_bias averages the target weekday's bucket with the EWMA bias
/// (EWMA alone when the bucket is under-sampled); the corrected quantity is
/// `max(0, round(raw - combined_bias * gain) + pattern adjustments)`.
pub fn apply_correction(
    raw_forecast: f64,
    correction: &BiasCorrection,
    patterns: &[DeviationPattern],
    target_date: NaiveDate,
    target_weather: Option<WeatherCondition>,
) -> CorrectionOutcome {
    let weekday = target_date.weekday().num_days_from_monday() as usize;
    let combined_bias = match correction.weekday_bias[weekday] {
        Some(bucket) => (bucket + correction.ewma_bias) / 2.0,
        None => correction.ewma_bias,
    };

    let mut corrected = raw_forecast - combined_bias * correction.adaptive_gain;

    let mut pattern_adjustment = 0.0;
    let mut applied = Vec::new();
    for pattern in patterns {
        if pattern.matches(target_date, target_weather) {
            pattern_adjustment += pattern.adjustment;
            applied.push(pattern.kind.clone());
        }
    }
    corrected += pattern_adjustment;

    CorrectionOutcome {
        corrected_quantity: corrected.round().max(0.0) as u32,
        combined_bias,
        gain_used: correction.adaptive_gain,
        pattern_adjustment,
        applied_patterns: applied,
    }
}

/// Actual demand estimate after stockout uncensoring.
fn uncensored_actual(record: &ForecastErrorRecord) -> f64 {
    if record.forecast_qty > 0.0
        && record.actual_qty >= STOCKOUT_SUSPECT_RATIO * record.forecast_qty
    {
        record.actual_qty * UNCENSOR_FACTOR
    } else {
        record.actual_qty
    }
}

fn pattern_confidence(samples: usize) -> f64 {
    ((samples as f64) / 6.0).min(1.0)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
