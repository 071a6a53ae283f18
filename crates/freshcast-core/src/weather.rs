//! Weather impact on demand.
//!
//! Ratios are learned empirically from the cleaned history when enough
//! weather-tagged samples exist, and fall back to a static table otherwise.
//! The static storm ratio of 0.05 encodes the business rule that production
//! for storm days is close to zero.

use std::collections::HashMap;
use std::str::FromStr;

use crate::cleaning::CleanedSample;
use crate::error::ForecastError;

/// Minimum weather-tagged samples before learned ratios replace the table.
const MIN_LEARNED_TOTAL: usize = 5;

/// Minimum samples per condition for a learned per-condition ratio.
const MIN_LEARNED_PER_CONDITION: usize = 2;

/// Weather condition buckets used across the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WeatherCondition {
    #[default]
    Sunny,
    Cloudy,
    Rain,
    Storm,
}

impl WeatherCondition {
    /// All conditions, in fair-to-severe order.
    pub const ALL: [WeatherCondition; 4] = [
        WeatherCondition::Sunny,
        WeatherCondition::Cloudy,
        WeatherCondition::Rain,
        WeatherCondition::Storm,
    ];

    /// Get the string representation of the condition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sunny => "sunny",
            Self::Cloudy => "cloudy",
            Self::Rain => "rain",
            Self::Storm => "storm",
        }
    }

    /// Static fallback impact ratio for this condition.
    pub fn default_ratio(&self) -> f64 {
        match self {
            Self::Sunny => 1.0,
            Self::Cloudy => 0.90,
            Self::Rain => 0.60,
            Self::Storm => 0.05,
        }
    }

    /// Map a WMO weather code (as reported by weather APIs) to a condition.
    pub fn from_wmo_code(code: u32) -> Self {
        match code {
            0..=1 => Self::Sunny,
            2..=48 => Self::Cloudy,
            51..=82 => Self::Rain,
            _ => Self::Storm,
        }
    }
}

impl FromStr for WeatherCondition {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sunny" | "clear" => Ok(Self::Sunny),
            "cloudy" | "overcast" | "partly_cloudy" => Ok(Self::Cloudy),
            "rain" | "rainy" | "drizzle" | "showers" => Ok(Self::Rain),
            "storm" | "stormy" | "thunderstorm" => Ok(Self::Storm),
            _ => Err(ForecastError::InvalidInput(format!(
                "Unknown weather condition: {s}"
            ))),
        }
    }
}

/// Per-condition demand impact ratios, normalized so the baseline condition
/// is exactly 1.0.
#[derive(Debug, Clone)]
pub struct WeatherImpact {
    ratios: HashMap<WeatherCondition, f64>,
    /// Condition the ratios are normalized against
    pub baseline_condition: WeatherCondition,
    /// Whether the ratios were learned from history (vs the static table)
    pub learned: bool,
    /// Number of weather-tagged samples behind the learned ratios
    pub samples: usize,
}

impl WeatherImpact {
    /// The static fallback table.
    pub fn static_table() -> Self {
        let ratios = WeatherCondition::ALL
            .iter()
            .map(|c| (*c, c.default_ratio()))
            .collect();
        Self {
            ratios,
            baseline_condition: WeatherCondition::Sunny,
            learned: false,
            samples: 0,
        }
    }

    /// Learn impact ratios from cleaned samples.
    ///
    /// Conditions with fewer than 2 tagged samples keep their static ratio.
    /// With fewer than 5 tagged samples overall, or no usable baseline
    /// condition, the static table is returned unchanged.
    pub fn learn(samples: &[CleanedSample]) -> Self {
        let mut by_condition: HashMap<WeatherCondition, Vec<f64>> = HashMap::new();
        for sample in samples {
            if let Some(condition) = sample.weather {
                by_condition
                    .entry(condition)
                    .or_default()
                    .push(sample.cleaned_quantity);
            }
        }

        let total: usize = by_condition.values().map(Vec::len).sum();
        if total < MIN_LEARNED_TOTAL {
            return Self::static_table();
        }

        // Normalize against sunny, or the most frequent condition if sunny
        // was never observed.
        let baseline_condition = if by_condition.contains_key(&WeatherCondition::Sunny) {
            WeatherCondition::Sunny
        } else {
            match by_condition.iter().max_by_key(|(_, v)| v.len()) {
                Some((condition, _)) => *condition,
                None => return Self::static_table(),
            }
        };

        let baseline_mean = condition_mean(&by_condition, baseline_condition);
        if baseline_mean <= f64::EPSILON {
            return Self::static_table();
        }

        let mut ratios: HashMap<WeatherCondition, f64> = WeatherCondition::ALL
            .iter()
            .map(|c| (*c, c.default_ratio()))
            .collect();
        for (condition, quantities) in &by_condition {
            if quantities.len() >= MIN_LEARNED_PER_CONDITION {
                let ratio = condition_mean(&by_condition, *condition) / baseline_mean;
                ratios.insert(*condition, ratio.max(0.0));
            }
        }
        // The normalization anchor is 1.0 by definition, never an estimate.
        ratios.insert(baseline_condition, 1.0);

        Self {
            ratios,
            baseline_condition,
            learned: true,
            samples: total,
        }
    }

    /// Impact ratio for a condition; 1.0 when unknown.
    pub fn ratio_for(&self, condition: WeatherCondition) -> f64 {
        self.ratios.get(&condition).copied().unwrap_or(1.0)
    }

    /// Apply the impact to a baseline forecast.
    pub fn apply(&self, baseline: f64, condition: WeatherCondition) -> f64 {
        (baseline * self.ratio_for(condition)).max(0.0)
    }
}

fn condition_mean(
    by_condition: &HashMap<WeatherCondition, Vec<f64>>,
    condition: WeatherCondition,
) -> f64 {
    by_condition
        .get(&condition)
        .map(|v| v.iter().sum::<f64>() / v.len() as f64)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn sample(quantity: f64, weather: Option<WeatherCondition>) -> CleanedSample {
        CleanedSample {
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            quantity,
            cleaned_quantity: quantity,
            days_ago: 1,
            is_outlier: false,
            is_special_event: false,
            weather,
        }
    }

    #[test]
    fn test_condition_parsing() {
        assert_eq!(
            "Sunny".parse::<WeatherCondition>().unwrap(),
            WeatherCondition::Sunny
        );
        assert_eq!(
            "thunderstorm".parse::<WeatherCondition>().unwrap(),
            WeatherCondition::Storm
        );
        assert!("hail of frogs".parse::<WeatherCondition>().is_err());
    }

    #[test]
    fn test_static_table_matches_business_rules() {
        let impact = WeatherImpact::static_table();
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Sunny), 1.0);
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Cloudy), 0.90);
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Rain), 0.60);
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Storm), 0.05);
    }

    #[test]
    fn test_sparse_data_falls_back_to_static() {
        let samples = vec![
            sample(20.0, Some(WeatherCondition::Sunny)),
            sample(10.0, Some(WeatherCondition::Rain)),
            sample(22.0, None),
        ];
        let impact = WeatherImpact::learn(&samples);
        assert!(!impact.learned);
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Rain), 0.60);
    }

    #[test]
    fn test_learned_ratios_normalized_to_sunny() {
        let mut samples = Vec::new();
        for _ in 0..4 {
            samples.push(sample(20.0, Some(WeatherCondition::Sunny)));
        }
        for _ in 0..3 {
            samples.push(sample(10.0, Some(WeatherCondition::Rain)));
        }
        let impact = WeatherImpact::learn(&samples);
        assert!(impact.learned);
        assert_eq!(impact.baseline_condition, WeatherCondition::Sunny);
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Sunny), 1.0);
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Rain), 0.5);
        // Never observed: keeps the static value
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Storm), 0.05);
    }

    #[test]
    fn test_most_frequent_condition_anchors_when_sunny_absent() {
        let mut samples = Vec::new();
        for _ in 0..4 {
            samples.push(sample(16.0, Some(WeatherCondition::Cloudy)));
        }
        for _ in 0..2 {
            samples.push(sample(8.0, Some(WeatherCondition::Rain)));
        }
        let impact = WeatherImpact::learn(&samples);
        assert!(impact.learned);
        assert_eq!(impact.baseline_condition, WeatherCondition::Cloudy);
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Cloudy), 1.0);
        assert_relative_eq!(impact.ratio_for(WeatherCondition::Rain), 0.5);
    }

    #[test]
    fn test_apply_clamps_non_negative() {
        let impact = WeatherImpact::static_table();
        assert_relative_eq!(impact.apply(100.0, WeatherCondition::Storm), 5.0);
        assert_relative_eq!(impact.apply(-10.0, WeatherCondition::Sunny), 0.0);
    }
}
