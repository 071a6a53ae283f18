//! Demand forecasting and production planning engine for perishable goods.
//!
//! Given read-only sales history, the engine recommends how many units to
//! produce for a target date, balancing stockout cost against waste cost
//! and adjusting for weather, calendar effects, per-market behavior and
//! realized forecast errors.

pub mod baseline;
pub mod calendar;
pub mod cleaning;
pub mod dist;
pub mod error;
pub mod forecast;
pub mod learning;
pub mod markets;
pub mod newsvendor;
pub mod seasonality;
pub mod stats;
pub mod types;
pub mod weather;
pub mod weather_service;

// Re-exports for convenience
pub use baseline::{decay_weighted_average, estimate_baseline, DEFAULT_DECAY_RATE};
pub use calendar::{is_payday, CalendarEffect, HolidayCalendar, HolidayEntry, PAYDAY_FACTOR};
pub use cleaning::{clean_sales, CleanStats, CleanedSample, CleanedSeries, CleaningOptions};
pub use dist::DemandDistribution;
pub use error::{ForecastError, Result};
pub use forecast::{
    ConfidenceTier, FallbackReason, ForecastEngine, ForecastOptions, ForecastOutput,
    ForecastRequest, ForecastStatus, StageAdjustment,
};
pub use learning::{
    apply_correction, compute_bias_correction, compute_forecast_errors, detect_patterns,
    BiasCorrection, CorrectionOutcome, DeviationPattern, ForecastErrorRecord, PatternKind,
    MIN_ERROR_SAMPLES,
};
pub use markets::{
    day_factor_or_default, payday_sensitivity_or_default, profile_market, MarketProfile,
    ReliabilityTier, TrafficTier, DEFAULT_DAY_FACTORS, DEFAULT_PAYDAY_SENSITIVITY,
};
pub use newsvendor::{
    critical_ratio, optimize, NewsvendorResult, CRITICAL_RATIO_MAX, CRITICAL_RATIO_MIN,
};
pub use seasonality::{
    apply_seasonality_factors, calculate_seasonality_factors, SeasonalityApplication,
    SeasonalityFactors,
};
pub use types::{Coordinates, PlannedForecast, SaleRecord, UnitEconomics, WeatherObservation};
pub use weather::{WeatherCondition, WeatherImpact};
pub use weather_service::{
    CachedWeatherSource, WeatherProvider, DEFAULT_CONDITION, FORECAST_HORIZON_DAYS,
};

#[cfg(feature = "weather-api")]
pub use weather_service::OpenMeteoClient;
