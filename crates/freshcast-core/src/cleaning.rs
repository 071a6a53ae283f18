//! Sales history cleaning.
//!
//! Filters raw sale records down to the target product/market, stamps each
//! day with its age, and corrects IQR outliers. Payday and holiday dates are
//! exempt from outlier correction: a spike on a special-event day is signal,
//! not noise. Zero matching records is a defined empty result, not an error,
//! so callers can treat thin markets as "insufficient data".

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::calendar::{is_payday, HolidayCalendar};
use crate::stats::{mean, quartiles};
use crate::types::SaleRecord;
use crate::weather::WeatherCondition;

/// Minimum non-special samples before the IQR is built from them alone.
const MIN_NON_SPECIAL_FOR_IQR: usize = 3;

/// One day of demand after cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedSample {
    pub date: NaiveDate,
    /// Raw daily quantity, retained for audit
    pub quantity: f64,
    /// Outlier-corrected quantity used by all downstream stages
    pub cleaned_quantity: f64,
    /// Age of the observation relative to `as_of`
    pub days_ago: i64,
    pub is_outlier: bool,
    /// Payday-window or holiday date
    pub is_special_event: bool,
    /// Weather recorded for that day, when any record carried one
    pub weather: Option<WeatherCondition>,
}

/// Aggregate statistics over a cleaned series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CleanStats {
    pub count: usize,
    /// Mean of cleaned quantities
    pub mean: f64,
    /// Median of the fence-building population
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub n_outliers: usize,
    pub n_special_events: usize,
}

/// Cleaned daily demand series for one (product, market) pair.
#[derive(Debug, Clone, Default)]
pub struct CleanedSeries {
    /// All cleaned samples, oldest first
    pub samples: Vec<CleanedSample>,
    /// Subset sharing the target date's weekday (empty without a target date)
    pub same_weekday: Vec<CleanedSample>,
    pub stats: CleanStats,
}

impl CleanedSeries {
    /// Whether any samples survived filtering.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Cleaned quantities, oldest first.
    pub fn cleaned_quantities(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.cleaned_quantity).collect()
    }
}

/// Options for a cleaning pass.
#[derive(Debug, Clone)]
pub struct CleaningOptions<'a> {
    /// How far back to look, in days
    pub lookback_days: u32,
    /// Day the forecast targets; enables the same-weekday subset
    pub target_date: Option<NaiveDate>,
    /// Holiday table for special-event exemption
    pub holidays: &'a HolidayCalendar,
}

impl<'a> CleaningOptions<'a> {
    /// Default 180-day lookback.
    pub fn new(holidays: &'a HolidayCalendar) -> Self {
        Self {
            lookback_days: 180,
            target_date: None,
            holidays,
        }
    }
}

/// Clean the sales history for one product/variant/market.
///
/// Records are aggregated per day (a day's demand is the sum over its
/// transactions), stamped with `days_ago` relative to `as_of`, and outlier
/// corrected. A day is a real outlier only when it falls outside the Tukey
/// fences AND is not a special event; its cleaned quantity is the median of
/// the fence-building population while the raw value is retained.
pub fn clean_sales(
    sales: &[SaleRecord],
    product_id: &str,
    variant_id: Option<&str>,
    market_id: &str,
    as_of: NaiveDate,
    options: &CleaningOptions,
) -> CleanedSeries {
    // Aggregate matching transactions into daily demand
    let mut daily: BTreeMap<NaiveDate, (f64, Option<WeatherCondition>)> = BTreeMap::new();
    for record in sales {
        if record.product_id != product_id || record.market_id != market_id {
            continue;
        }
        if let Some(variant) = variant_id {
            if record.variant_id.as_deref() != Some(variant) {
                continue;
            }
        }

        let days_ago = (as_of - record.date).num_days();
        if days_ago < 0 || days_ago > options.lookback_days as i64 {
            continue;
        }

        let entry = daily.entry(record.date).or_insert((0.0, None));
        entry.0 += record.quantity_sold.max(0.0);
        if entry.1.is_none() {
            entry.1 = record.weather;
        }
    }

    if daily.is_empty() {
        return CleanedSeries::default();
    }

    let mut samples: Vec<CleanedSample> = daily
        .into_iter()
        .map(|(date, (quantity, weather))| CleanedSample {
            date,
            quantity,
            cleaned_quantity: quantity,
            days_ago: (as_of - date).num_days(),
            is_outlier: false,
            is_special_event: is_payday(date) || options.holidays.contains(date),
            weather,
        })
        .collect();

    // Fences from ordinary days only; special-event spikes would widen them
    let non_special: Vec<f64> = samples
        .iter()
        .filter(|s| !s.is_special_event)
        .map(|s| s.quantity)
        .collect();
    let fence_population: Vec<f64> = if non_special.len() >= MIN_NON_SPECIAL_FOR_IQR {
        non_special
    } else {
        samples.iter().map(|s| s.quantity).collect()
    };

    let q = quartiles(&fence_population);
    let (lower, upper) = q.fences();

    let mut n_outliers = 0;
    for sample in &mut samples {
        if !sample.is_special_event && (sample.quantity < lower || sample.quantity > upper) {
            sample.is_outlier = true;
            sample.cleaned_quantity = q.median;
            n_outliers += 1;
        }
    }

    let same_weekday = match options.target_date {
        Some(target) => {
            let weekday = target.weekday();
            samples
                .iter()
                .filter(|s| s.date.weekday() == weekday)
                .cloned()
                .collect()
        }
        None => Vec::new(),
    };

    let cleaned: Vec<f64> = samples.iter().map(|s| s.cleaned_quantity).collect();
    let stats = CleanStats {
        count: samples.len(),
        mean: mean(&cleaned),
        median: q.median,
        q1: q.q1,
        q3: q.q3,
        iqr: q.iqr(),
        n_outliers,
        n_special_events: samples.iter().filter(|s| s.is_special_event).count(),
    };

    CleanedSeries {
        samples,
        same_weekday,
        stats,
    }
}
