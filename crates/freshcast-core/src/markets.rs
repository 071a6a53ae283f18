//! Per-market behavior profiles.
//!
//! A market profile summarizes how an outlet trades: basket size, weekday
//! revenue shape, volatility, payday and bad-weather sensitivity, and its
//! top products. The orchestrator multiplies the day-of-week and payday
//! factors into the running forecast; the rest feeds reporting.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, Weekday};

use crate::calendar::is_payday;
use crate::stats::{coef_variation, mean};
use crate::types::SaleRecord;
use crate::weather::WeatherCondition;

/// Days of history for the high-reliability tier.
const HIGH_RELIABILITY_DAYS: usize = 30;

/// Days of history for the medium-reliability tier.
const MEDIUM_RELIABILITY_DAYS: usize = 14;

/// Average daily revenue thresholds for the traffic tiers.
const HIGH_TRAFFIC_REVENUE: f64 = 10_000.0;
const MEDIUM_TRAFFIC_REVENUE: f64 = 3_000.0;

/// Payday/non-payday day counts needed to learn payday sensitivity.
const MIN_PAYDAY_DAYS: usize = 3;

/// Default payday sensitivity when a market has too little history.
pub const DEFAULT_PAYDAY_SENSITIVITY: f64 = 1.2;

/// Generic day-of-week multipliers for markets without a profile,
/// Monday first. Weekends run hotter.
pub const DEFAULT_DAY_FACTORS: [f64; 7] = [0.95, 0.9, 0.9, 0.95, 1.1, 1.25, 1.15];

/// Number of top products kept per market.
const TOP_PRODUCTS: usize = 5;

/// How much history backs a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReliabilityTier {
    /// At least 30 distinct trading days
    High,
    /// At least 14 distinct trading days
    Medium,
    Low,
}

/// Market size by average daily revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficTier {
    High,
    Medium,
    Low,
}

/// Behavioral profile of a single market.
#[derive(Debug, Clone)]
pub struct MarketProfile {
    pub market_id: String,
    /// Distinct trading days observed
    pub days_observed: usize,
    /// Individual sale records observed
    pub transaction_count: usize,
    /// Total quantity / transaction count
    pub avg_basket_size: f64,
    /// Total revenue / transaction count
    pub avg_transaction_value: f64,
    /// Average daily revenue across trading days
    pub avg_daily_revenue: f64,
    /// Day average revenue / overall daily average, Monday first
    pub day_of_week_factors: [f64; 7],
    /// Bad-weather (rain/storm) revenue relative to the rest; 1.0 = immune
    pub weather_sensitivity: f64,
    /// Payday revenue relative to ordinary days
    pub payday_sensitivity: f64,
    /// Top products by total quantity, best first
    pub top_products: Vec<(String, f64)>,
    /// Coefficient of variation of daily revenue
    pub volatility: f64,
    pub reliability: ReliabilityTier,
    pub traffic: TrafficTier,
}

impl MarketProfile {
    /// Day-of-week multiplier for a target weekday.
    pub fn day_factor(&self, weekday: Weekday) -> f64 {
        self.day_of_week_factors[weekday.num_days_from_monday() as usize]
    }
}

/// Day-of-week multiplier with the generic fallback for unprofiled markets.
pub fn day_factor_or_default(profile: Option<&MarketProfile>, weekday: Weekday) -> f64 {
    match profile {
        Some(p) => p.day_factor(weekday),
        None => DEFAULT_DAY_FACTORS[weekday.num_days_from_monday() as usize],
    }
}

/// Payday-sensitivity multiplier with the generic default.
pub fn payday_sensitivity_or_default(profile: Option<&MarketProfile>) -> f64 {
    profile
        .map(|p| p.payday_sensitivity)
        .unwrap_or(DEFAULT_PAYDAY_SENSITIVITY)
}

/// Build a market profile from every sale recorded at that market.
///
/// Returns `None` when the market has no sales at all.
pub fn profile_market(sales: &[SaleRecord], market_id: &str) -> Option<MarketProfile> {
    let records: Vec<&SaleRecord> = sales.iter().filter(|r| r.market_id == market_id).collect();
    if records.is_empty() {
        return None;
    }

    let transaction_count = records.len();
    let total_quantity: f64 = records.iter().map(|r| r.quantity_sold).sum();
    let total_revenue: f64 = records.iter().map(|r| r.revenue()).sum();

    // Daily revenue series
    let mut daily_revenue: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut daily_weather: HashMap<NaiveDate, WeatherCondition> = HashMap::new();
    for record in &records {
        *daily_revenue.entry(record.date).or_insert(0.0) += record.revenue();
        if let Some(weather) = record.weather {
            daily_weather.entry(record.date).or_insert(weather);
        }
    }

    let days_observed = daily_revenue.len();
    let revenues: Vec<f64> = daily_revenue.values().copied().collect();
    let avg_daily_revenue = mean(&revenues);

    // Day-of-week revenue shape
    let mut by_weekday: [Vec<f64>; 7] = Default::default();
    for (date, revenue) in &daily_revenue {
        by_weekday[date.weekday().num_days_from_monday() as usize].push(*revenue);
    }
    let mut day_of_week_factors = [1.0f64; 7];
    if avg_daily_revenue > f64::EPSILON {
        for (weekday, day_revenues) in by_weekday.iter().enumerate() {
            if !day_revenues.is_empty() {
                day_of_week_factors[weekday] = mean(day_revenues) / avg_daily_revenue;
            }
        }
    }

    // Bad-weather sensitivity from tagged days
    let mut bad_weather_revenue = Vec::new();
    let mut fair_weather_revenue = Vec::new();
    for (date, revenue) in &daily_revenue {
        match daily_weather.get(date) {
            Some(WeatherCondition::Rain) | Some(WeatherCondition::Storm) => {
                bad_weather_revenue.push(*revenue)
            }
            Some(_) => fair_weather_revenue.push(*revenue),
            None => {}
        }
    }
    let weather_sensitivity = if bad_weather_revenue.len() >= 2 && fair_weather_revenue.len() >= 2 {
        let fair = mean(&fair_weather_revenue);
        if fair > f64::EPSILON {
            mean(&bad_weather_revenue) / fair
        } else {
            1.0
        }
    } else {
        1.0
    };

    // Payday sensitivity
    let mut payday_revenue = Vec::new();
    let mut ordinary_revenue = Vec::new();
    for (date, revenue) in &daily_revenue {
        if is_payday(*date) {
            payday_revenue.push(*revenue);
        } else {
            ordinary_revenue.push(*revenue);
        }
    }
    let payday_sensitivity = if payday_revenue.len() >= MIN_PAYDAY_DAYS
        && ordinary_revenue.len() >= MIN_PAYDAY_DAYS
    {
        let ordinary = mean(&ordinary_revenue);
        if ordinary > f64::EPSILON {
            mean(&payday_revenue) / ordinary
        } else {
            DEFAULT_PAYDAY_SENSITIVITY
        }
    } else {
        DEFAULT_PAYDAY_SENSITIVITY
    };

    // Top products by quantity
    let mut product_quantities: HashMap<&str, f64> = HashMap::new();
    for record in &records {
        *product_quantities.entry(record.product_id.as_str()).or_insert(0.0) +=
            record.quantity_sold;
    }
    let mut top_products: Vec<(String, f64)> = product_quantities
        .into_iter()
        .map(|(id, qty)| (id.to_string(), qty))
        .collect();
    top_products.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    top_products.truncate(TOP_PRODUCTS);

    let reliability = if days_observed >= HIGH_RELIABILITY_DAYS {
        ReliabilityTier::High
    } else if days_observed >= MEDIUM_RELIABILITY_DAYS {
        ReliabilityTier::Medium
    } else {
        ReliabilityTier::Low
    };

    let traffic = if avg_daily_revenue >= HIGH_TRAFFIC_REVENUE {
        TrafficTier::High
    } else if avg_daily_revenue >= MEDIUM_TRAFFIC_REVENUE {
        TrafficTier::Medium
    } else {
        TrafficTier::Low
    };

    Some(MarketProfile {
        market_id: market_id.to_string(),
        days_observed,
        transaction_count,
        avg_basket_size: total_quantity / transaction_count as f64,
        avg_transaction_value: total_revenue / transaction_count as f64,
        avg_daily_revenue,
        day_of_week_factors,
        weather_sensitivity,
        payday_sensitivity,
        top_products,
        volatility: coef_variation(&revenues),
        reliability,
        traffic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(d: NaiveDate, product: &str, quantity: f64, price: f64) -> SaleRecord {
        SaleRecord {
            date: d,
            product_id: product.into(),
            variant_id: None,
            market_id: "riverside".into(),
            quantity_sold: quantity,
            unit_price: price,
            unit_cost: price * 0.4,
            waste_qty: None,
            weather: None,
        }
    }

    #[test]
    fn test_unknown_market_has_no_profile() {
        assert!(profile_market(&[], "riverside").is_none());
        let sales = vec![record(date(2025, 6, 10), "croissant", 5.0, 30.0)];
        assert!(profile_market(&sales, "station").is_none());
    }

    #[test]
    fn test_basket_and_transaction_value() {
        let sales = vec![
            record(date(2025, 6, 10), "croissant", 4.0, 30.0),
            record(date(2025, 6, 10), "baguette", 2.0, 45.0),
        ];
        let profile = profile_market(&sales, "riverside").unwrap();
        assert_eq!(profile.transaction_count, 2);
        assert_relative_eq!(profile.avg_basket_size, 3.0, epsilon = 1e-10);
        // (120 + 90) / 2
        assert_relative_eq!(profile.avg_transaction_value, 105.0, epsilon = 1e-10);
    }

    #[test]
    fn test_day_of_week_factors_sum_to_shape() {
        // 4 weeks: Saturdays sell double
        let start = date(2025, 6, 2); // Monday
        let sales: Vec<SaleRecord> = (0..28)
            .map(|i| {
                let d = start + Duration::days(i);
                let qty = if d.weekday() == Weekday::Sat { 40.0 } else { 20.0 };
                record(d, "croissant", qty, 30.0)
            })
            .collect();

        let profile = profile_market(&sales, "riverside").unwrap();
        assert!(profile.day_factor(Weekday::Sat) > 1.5);
        assert!(profile.day_factor(Weekday::Tue) < 1.0);
    }

    #[test]
    fn test_reliability_tiers() {
        let start = date(2025, 6, 2);
        let make = |days: i64| -> Vec<SaleRecord> {
            (0..days)
                .map(|i| record(start + Duration::days(i), "croissant", 10.0, 30.0))
                .collect()
        };

        let low = profile_market(&make(7), "riverside").unwrap();
        assert_eq!(low.reliability, ReliabilityTier::Low);

        let medium = profile_market(&make(20), "riverside").unwrap();
        assert_eq!(medium.reliability, ReliabilityTier::Medium);

        let high = profile_market(&make(35), "riverside").unwrap();
        assert_eq!(high.reliability, ReliabilityTier::High);
    }

    #[test]
    fn test_volatility_zero_for_steady_market() {
        let start = date(2025, 6, 2);
        let sales: Vec<SaleRecord> = (0..14)
            .map(|i| record(start + Duration::days(i), "croissant", 10.0, 30.0))
            .collect();
        let profile = profile_market(&sales, "riverside").unwrap();
        assert_relative_eq!(profile.volatility, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_top_products_ranked_by_quantity() {
        let d = date(2025, 6, 10);
        let sales = vec![
            record(d, "croissant", 10.0, 30.0),
            record(d, "baguette", 25.0, 45.0),
            record(d, "danish", 5.0, 35.0),
        ];
        let profile = profile_market(&sales, "riverside").unwrap();
        assert_eq!(profile.top_products[0].0, "baguette");
        assert_eq!(profile.top_products.len(), 3);
    }

    #[test]
    fn test_payday_sensitivity_learned() {
        // Ordinary days sell 100, payday-window days sell 150
        let sales: Vec<SaleRecord> = (1..=30)
            .map(|day| {
                let d = date(2025, 6, day);
                let qty = if is_payday(d) { 15.0 } else { 10.0 };
                record(d, "croissant", qty, 10.0)
            })
            .collect();
        let profile = profile_market(&sales, "riverside").unwrap();
        assert_relative_eq!(profile.payday_sensitivity, 1.5, epsilon = 1e-10);
    }

    #[test]
    fn test_defaults_for_unprofiled_market() {
        assert_relative_eq!(
            day_factor_or_default(None, Weekday::Sat),
            1.25,
            epsilon = 1e-10
        );
        assert_relative_eq!(
            payday_sensitivity_or_default(None),
            DEFAULT_PAYDAY_SENSITIVITY,
            epsilon = 1e-10
        );
    }
}
