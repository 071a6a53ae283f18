//! Forecast orchestration.
//!
//! Sequences cleaning, baseline estimation, weather adjustment, calendar
//! and seasonality multipliers, market profiling, newsvendor optimization
//! and self-learning correction into one call. The call never fails:
//! degenerate input produces a conservative fallback carrying a tagged
//! reason, and every result ships with a per-stage breakdown and a
//! human-readable explanation trail so a low-confidence number is visibly
//! distinguishable from a well-supported one.

use chrono::{Datelike, NaiveDate};

use crate::baseline::{estimate_baseline, DEFAULT_DECAY_RATE};
use crate::calendar::{is_payday, HolidayCalendar};
use crate::cleaning::{clean_sales, CleanedSeries, CleaningOptions};
use crate::dist::DemandDistribution;
use crate::learning::{
    apply_correction, compute_bias_correction, detect_patterns, ForecastErrorRecord,
    MIN_ERROR_SAMPLES,
};
use crate::markets::{day_factor_or_default, payday_sensitivity_or_default, profile_market};
use crate::newsvendor::optimize;
use crate::seasonality::{apply_seasonality_factors, calculate_seasonality_factors};
use crate::stats::{coef_variation, std_dev};
use crate::types::{Coordinates, SaleRecord, UnitEconomics};
use crate::weather::{WeatherCondition, WeatherImpact};
use crate::weather_service::{CachedWeatherSource, DEFAULT_CONDITION};

/// Dispersion index (variance / mean) above which demand is modeled as
/// negative binomial instead of Poisson.
const OVERDISPERSION_INDEX: f64 = 1.5;

/// One forecast request.
#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub market_id: String,
    /// Day to produce for
    pub target_date: NaiveDate,
    /// "Today" from the caller's perspective; history is aged against this
    pub as_of: NaiveDate,
    pub economics: UnitEconomics,
    /// Explicit weather override; wins over the live service
    pub weather: Option<WeatherCondition>,
    /// Market position for the live weather fetch
    pub coordinates: Option<Coordinates>,
}

/// Tunables for the pipeline.
#[derive(Debug, Clone)]
pub struct ForecastOptions {
    /// History window fed to the cleaner
    pub lookback_days: u32,
    /// Baseline decay rate per day of age
    pub decay_rate: f64,
    /// Cleaned samples required before a real forecast is attempted
    pub min_samples: usize,
    /// Quantity recommended when falling back
    pub fallback_quantity: u32,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            lookback_days: 180,
            decay_rate: DEFAULT_DECAY_RATE,
            min_samples: 3,
            fallback_quantity: 10,
        }
    }
}

/// How much trust to place in a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    /// At least 30 cleaned days behind the number
    High,
    /// At least 10 cleaned days
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Why a fallback value was substituted.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    InsufficientData { needed: usize, got: usize },
    ComputationError(String),
}

/// Whether the pipeline ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastStatus {
    /// Every stage ran on real data
    Full,
    /// A conservative fixed value was substituted
    Fallback(FallbackReason),
}

/// One pipeline stage's effect on the running forecast value.
#[derive(Debug, Clone)]
pub struct StageAdjustment {
    pub stage: &'static str,
    pub before: f64,
    pub after: f64,
    pub note: String,
}

/// The forecast handed back to the host.
#[derive(Debug, Clone)]
pub struct ForecastOutput {
    pub product_id: String,
    pub market_id: String,
    pub target_date: NaiveDate,
    /// Units to produce
    pub optimal_quantity: u32,
    pub baseline_forecast: f64,
    pub weather_adjusted_forecast: f64,
    /// Fully adjusted demand mean fed to the optimizer
    pub lambda: f64,
    /// Critical ratio the quantity was optimized for
    pub service_level_target: f64,
    pub stockout_probability: f64,
    pub waste_probability: f64,
    /// 80% central interval on demand
    pub prediction_interval: (u32, u32),
    pub confidence: ConfidenceTier,
    pub economics: UnitEconomics,
    /// Weather condition the forecast assumed
    pub weather_used: WeatherCondition,
    pub stages: Vec<StageAdjustment>,
    pub explanations: Vec<String>,
    pub status: ForecastStatus,
}

impl ForecastOutput {
    /// Whether every stage ran on real data.
    pub fn success(&self) -> bool {
        matches!(self.status, ForecastStatus::Full)
    }
}

/// The forecasting engine.
///
/// Owns the holiday calendar and the optional live weather source; sales
/// history and the forecast-error log stay with the caller and are passed
/// per call, so batch forecasting over many products is just repeated
/// invocation.
pub struct ForecastEngine {
    calendar: HolidayCalendar,
    weather_source: Option<CachedWeatherSource>,
    options: ForecastOptions,
}

impl ForecastEngine {
    pub fn new(calendar: HolidayCalendar) -> Self {
        Self {
            calendar,
            weather_source: None,
            options: ForecastOptions::default(),
        }
    }

    /// Attach a live weather source.
    pub fn with_weather_source(mut self, source: CachedWeatherSource) -> Self {
        self.weather_source = Some(source);
        self
    }

    /// Override the default pipeline tunables.
    pub fn with_options(mut self, options: ForecastOptions) -> Self {
        self.options = options;
        self
    }

    /// Produce a forecast. Never returns an error: degenerate input yields
    /// a fallback output with `status` explaining why.
    pub fn forecast(
        &self,
        sales: &[SaleRecord],
        error_log: &[ForecastErrorRecord],
        request: &ForecastRequest,
    ) -> ForecastOutput {
        let mut stages = Vec::new();
        let mut explanations = Vec::new();

        // Stage 1: clean
        let cleaning = CleaningOptions {
            lookback_days: self.options.lookback_days,
            target_date: Some(request.target_date),
            holidays: &self.calendar,
        };
        let series = clean_sales(
            sales,
            &request.product_id,
            request.variant_id.as_deref(),
            &request.market_id,
            request.as_of,
            &cleaning,
        );

        explanations.push(format!(
            "cleaned {} days of history ({} outliers corrected, {} special-event days)",
            series.stats.count, series.stats.n_outliers, series.stats.n_special_events
        ));

        if series.stats.count < self.options.min_samples {
            explanations.push(format!(
                "insufficient history: need {} days, found {}; using fallback quantity {}",
                self.options.min_samples, series.stats.count, self.options.fallback_quantity
            ));
            return self.fallback(
                request,
                FallbackReason::InsufficientData {
                    needed: self.options.min_samples,
                    got: series.stats.count,
                },
                stages,
                explanations,
            );
        }

        // Stage 2: baseline
        let baseline = estimate_baseline(&series.samples, self.options.decay_rate);
        stages.push(StageAdjustment {
            stage: "baseline",
            before: 0.0,
            after: baseline,
            note: format!(
                "decay-weighted average over {} days",
                series.stats.count
            ),
        });
        explanations.push(format!("baseline demand {:.1} units/day", baseline));

        if !baseline.is_finite() {
            explanations.push("baseline computation produced a non-finite value".to_string());
            return self.fallback(
                request,
                FallbackReason::ComputationError("non-finite baseline".to_string()),
                stages,
                explanations,
            );
        }

        // Stage 3: weather adjustment
        let weather_used = self.resolve_weather(request, &mut explanations);
        let impact = WeatherImpact::learn(&series.samples);
        let weather_adjusted = impact.apply(baseline, weather_used);
        stages.push(StageAdjustment {
            stage: "weather",
            before: baseline,
            after: weather_adjusted,
            note: format!(
                "{} x{:.2} ({} ratios)",
                weather_used.as_str(),
                impact.ratio_for(weather_used),
                if impact.learned { "learned" } else { "static" }
            ),
        });
        explanations.push(format!(
            "weather {} applies x{:.2} -> {:.1}",
            weather_used.as_str(),
            impact.ratio_for(weather_used),
            weather_adjusted
        ));

        // Stage 4: calendar and learned seasonality
        let factors = calculate_seasonality_factors(&series.samples);
        let seasonal = apply_seasonality_factors(
            weather_adjusted,
            &factors,
            request.target_date,
            Some(weather_used),
            &self.calendar,
        );
        stages.push(StageAdjustment {
            stage: "seasonality",
            before: weather_adjusted,
            after: seasonal.adjusted_forecast,
            note: format!(
                "weekday x{:.2}, weather residual x{:.2}, calendar x{:.2}",
                seasonal.weekday_factor, seasonal.weather_factor, seasonal.calendar_factor
            ),
        });
        match &seasonal.holiday {
            Some(name) => explanations.push(format!(
                "calendar: {} applies, combined seasonality x{:.2} -> {:.1}",
                name, seasonal.combined_factor, seasonal.adjusted_forecast
            )),
            None => explanations.push(format!(
                "seasonality x{:.2} -> {:.1}",
                seasonal.combined_factor, seasonal.adjusted_forecast
            )),
        }

        // Stage 5: market profile
        let profile = profile_market(sales, &request.market_id);
        let weekday = request.target_date.weekday();
        let mut market_factor = day_factor_or_default(profile.as_ref(), weekday);
        let exact_holiday = self.calendar.contains(request.target_date);
        if is_payday(request.target_date) && !exact_holiday {
            market_factor *= payday_sensitivity_or_default(profile.as_ref());
        }
        let market_adjusted = (seasonal.adjusted_forecast * market_factor).max(0.0);
        stages.push(StageAdjustment {
            stage: "market",
            before: seasonal.adjusted_forecast,
            after: market_adjusted,
            note: match &profile {
                Some(p) => format!("{} profile x{:.2}", p.market_id, market_factor),
                None => format!("default market factors x{:.2}", market_factor),
            },
        });
        explanations.push(format!(
            "market {} x{:.2} -> {:.1}",
            request.market_id, market_factor, market_adjusted
        ));

        let lambda = market_adjusted;
        if !lambda.is_finite() {
            explanations.push("adjusted demand is non-finite".to_string());
            return self.fallback(
                request,
                FallbackReason::ComputationError("non-finite lambda".to_string()),
                stages,
                explanations,
            );
        }

        // Stage 6: newsvendor optimization
        let dist = match demand_distribution(lambda, &series) {
            Ok(dist) => dist,
            Err(e) => {
                explanations.push(format!("demand distribution: {e}"));
                return self.fallback(
                    request,
                    FallbackReason::ComputationError(e.to_string()),
                    stages,
                    explanations,
                );
            }
        };
        let result = match optimize(&dist, &request.economics) {
            Ok(result) => result,
            Err(e) => {
                explanations.push(format!("optimization: {e}"));
                return self.fallback(
                    request,
                    FallbackReason::ComputationError(e.to_string()),
                    stages,
                    explanations,
                );
            }
        };
        stages.push(StageAdjustment {
            stage: "newsvendor",
            before: lambda,
            after: result.optimal_quantity as f64,
            note: format!("service level {:.2}", result.critical_ratio),
        });
        explanations.push(format!(
            "newsvendor at service level {:.2} on lambda {:.1} -> {} units \
             (stockout {:.0}%, waste {:.0}%)",
            result.critical_ratio,
            lambda,
            result.optimal_quantity,
            result.stockout_probability * 100.0,
            result.waste_probability * 100.0
        ));

        // Stage 7: self-learning correction
        let own_errors: Vec<ForecastErrorRecord> = error_log
            .iter()
            .filter(|e| e.product_id == request.product_id && e.market_id == request.market_id)
            .cloned()
            .collect();

        let mut final_quantity = result.optimal_quantity;
        if own_errors.len() >= MIN_ERROR_SAMPLES {
            if let Some(correction) = compute_bias_correction(&own_errors) {
                let patterns = detect_patterns(&own_errors);
                let outcome = apply_correction(
                    result.optimal_quantity as f64,
                    &correction,
                    &patterns,
                    request.target_date,
                    Some(weather_used),
                );
                stages.push(StageAdjustment {
                    stage: "correction",
                    before: result.optimal_quantity as f64,
                    after: outcome.corrected_quantity as f64,
                    note: format!(
                        "bias {:.1} x{:.1} gain, {} patterns",
                        outcome.combined_bias,
                        outcome.gain_used,
                        outcome.applied_patterns.len()
                    ),
                });
                explanations.push(format!(
                    "learned correction from {} errors: bias {:.1}, gain {:.1} -> {} units",
                    correction.sample_count,
                    outcome.combined_bias,
                    outcome.gain_used,
                    outcome.corrected_quantity
                ));
                final_quantity = outcome.corrected_quantity;
            }
        } else {
            explanations.push(format!(
                "no correction: {} error samples on record (need {})",
                own_errors.len(),
                MIN_ERROR_SAMPLES
            ));
        }

        let confidence = confidence_tier(&series);

        ForecastOutput {
            product_id: request.product_id.clone(),
            market_id: request.market_id.clone(),
            target_date: request.target_date,
            optimal_quantity: final_quantity,
            baseline_forecast: baseline,
            weather_adjusted_forecast: weather_adjusted,
            lambda,
            service_level_target: result.critical_ratio,
            stockout_probability: result.stockout_probability,
            waste_probability: result.waste_probability,
            prediction_interval: result.prediction_interval,
            confidence,
            economics: request.economics,
            weather_used,
            stages,
            explanations,
            status: ForecastStatus::Full,
        }
    }

    /// Resolve the weather to forecast under: explicit override first, then
    /// the live source, then the deterministic default.
    fn resolve_weather(
        &self,
        request: &ForecastRequest,
        explanations: &mut Vec<String>,
    ) -> WeatherCondition {
        if let Some(condition) = request.weather {
            explanations.push(format!("weather override: {}", condition.as_str()));
            return condition;
        }

        if let (Some(source), Some(coords)) = (&self.weather_source, request.coordinates) {
            let condition = source.condition_for(request.as_of, request.target_date, coords);
            explanations.push(format!("weather service: {}", condition.as_str()));
            return condition;
        }

        explanations.push(format!(
            "no weather source; assuming {}",
            DEFAULT_CONDITION.as_str()
        ));
        DEFAULT_CONDITION
    }

    fn fallback(
        &self,
        request: &ForecastRequest,
        reason: FallbackReason,
        stages: Vec<StageAdjustment>,
        explanations: Vec<String>,
    ) -> ForecastOutput {
        ForecastOutput {
            product_id: request.product_id.clone(),
            market_id: request.market_id.clone(),
            target_date: request.target_date,
            optimal_quantity: self.options.fallback_quantity,
            baseline_forecast: 0.0,
            weather_adjusted_forecast: 0.0,
            lambda: 0.0,
            service_level_target: 0.5,
            stockout_probability: 0.0,
            waste_probability: 0.0,
            prediction_interval: (0, self.options.fallback_quantity),
            confidence: ConfidenceTier::Low,
            economics: request.economics,
            weather_used: request.weather.unwrap_or(DEFAULT_CONDITION),
            stages,
            explanations,
            status: ForecastStatus::Fallback(reason),
        }
    }
}

/// Pick the demand distribution for the optimizer.
///
/// The cleaned history's dispersion index carries over to the adjusted
/// mean: markedly overdispersed demand becomes a negative binomial with the
/// same index, anything else a plain Poisson.
fn demand_distribution(
    lambda: f64,
    series: &CleanedSeries,
) -> crate::error::Result<DemandDistribution> {
    let quantities = series.cleaned_quantities();
    let mean = series.stats.mean;
    let variance = std_dev(&quantities).powi(2);

    if mean > 0.0 && lambda > 0.0 {
        let index = variance / mean;
        if index > OVERDISPERSION_INDEX {
            return DemandDistribution::from_moments(lambda, lambda * index);
        }
    }
    DemandDistribution::poisson(lambda.max(0.0))
}

fn confidence_tier(series: &CleanedSeries) -> ConfidenceTier {
    let volatile = coef_variation(&series.cleaned_quantities()) > 1.0;
    match series.stats.count {
        n if n >= 30 && !volatile => ConfidenceTier::High,
        n if n >= 10 => ConfidenceTier::Medium,
        _ => ConfidenceTier::Low,
    }
}
