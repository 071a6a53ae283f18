//! Live weather source for the orchestrator.
//!
//! This is the only place the pipeline may block: one HTTP fetch bounded by
//! a hard 5-second timeout, behind an injected in-process cache keyed by
//! (date, location). Failures never reach the caller; the deterministic
//! sunny default stands in, so a forecast is always produced.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{Coordinates, WeatherObservation};
use crate::weather::WeatherCondition;

/// Days ahead a weather request is considered answerable.
pub const FORECAST_HORIZON_DAYS: i64 = 16;

/// Fallback condition when no observation can be resolved.
pub const DEFAULT_CONDITION: WeatherCondition = WeatherCondition::Sunny;

#[cfg(feature = "weather-api")]
const FETCH_TIMEOUT_SECS: u64 = 5;

/// Source of daily weather observations.
pub trait WeatherProvider {
    /// Fetch the observation for one date and location.
    fn fetch(&self, date: NaiveDate, coords: Coordinates) -> Result<WeatherObservation>;
}

/// Caching wrapper around a provider.
///
/// The cache lives on the instance, not in module state, so tests and hosts
/// can reset it by dropping or clearing the source.
pub struct CachedWeatherSource {
    provider: Box<dyn WeatherProvider + Send + Sync>,
    cache: Mutex<HashMap<(NaiveDate, String), WeatherObservation>>,
}

impl CachedWeatherSource {
    pub fn new(provider: Box<dyn WeatherProvider + Send + Sync>) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the observation for a target date, best effort.
    ///
    /// Out-of-horizon targets are not fetched at all. A provider failure
    /// returns `None`; the caller substitutes the default condition.
    pub fn observation_for(
        &self,
        as_of: NaiveDate,
        target: NaiveDate,
        coords: Coordinates,
    ) -> Option<WeatherObservation> {
        let lead = (target - as_of).num_days();
        if !(0..=FORECAST_HORIZON_DAYS).contains(&lead) {
            return None;
        }

        let key = (target, location_key(coords));
        if let Some(hit) = self.cache.lock().ok()?.get(&key) {
            return Some(hit.clone());
        }

        let observation = self.provider.fetch(target, coords).ok()?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, observation.clone());
        }
        Some(observation)
    }

    /// Resolve just the condition, falling back to sunny.
    pub fn condition_for(
        &self,
        as_of: NaiveDate,
        target: NaiveDate,
        coords: Coordinates,
    ) -> WeatherCondition {
        self.observation_for(as_of, target, coords)
            .map(|o| o.condition)
            .unwrap_or(DEFAULT_CONDITION)
    }

    /// Drop all cached observations.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Number of cached observations.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Cache key for a coordinate pair; 4 decimals is ~11 m of precision.
fn location_key(coords: Coordinates) -> String {
    format!("{:.4},{:.4}", coords.latitude, coords.longitude)
}

/// Open-Meteo daily forecast client.
#[cfg(feature = "weather-api")]
pub struct OpenMeteoClient {
    agent: ureq::Agent,
    base_url: String,
}

#[cfg(feature = "weather-api")]
impl OpenMeteoClient {
    pub fn new() -> Self {
        Self::with_base_url("https://api.open-meteo.com/v1/forecast")
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build();
        Self {
            agent,
            base_url: base_url.to_string(),
        }
    }
}

#[cfg(feature = "weather-api")]
impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "weather-api")]
impl WeatherProvider for OpenMeteoClient {
    fn fetch(&self, date: NaiveDate, coords: Coordinates) -> Result<WeatherObservation> {
        use crate::error::ForecastError;

        let day = date.format("%Y-%m-%d");
        let url = format!(
            "{}?latitude={:.4}&longitude={:.4}\
             &daily=weathercode,temperature_2m_max,precipitation_sum\
             &start_date={day}&end_date={day}&timezone=UTC",
            self.base_url, coords.latitude, coords.longitude
        );

        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| ForecastError::WeatherUnavailable(e.to_string()))?;
        let body: serde_json::Value = response
            .into_json()
            .map_err(|e| ForecastError::WeatherUnavailable(e.to_string()))?;

        let daily = body
            .get("daily")
            .ok_or_else(|| ForecastError::WeatherUnavailable("missing daily block".into()))?;

        let first = |field: &str| -> Option<f64> {
            daily.get(field)?.as_array()?.first()?.as_f64()
        };

        let code = first("weathercode").ok_or_else(|| {
            ForecastError::WeatherUnavailable("missing weathercode".into())
        })? as u32;

        Ok(WeatherObservation {
            condition: WeatherCondition::from_wmo_code(code),
            temperature: first("temperature_2m_max").unwrap_or(0.0),
            precipitation: first("precipitation_sum").unwrap_or(0.0),
            humidity: first("relative_humidity_2m_max").unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedProvider {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl WeatherProvider for ScriptedProvider {
        fn fetch(&self, _date: NaiveDate, _coords: Coordinates) -> Result<WeatherObservation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ForecastError::WeatherUnavailable("scripted failure".into()));
            }
            Ok(WeatherObservation {
                condition: WeatherCondition::Rain,
                temperature: 24.0,
                precipitation: 6.5,
                humidity: 85.0,
            })
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const BANGKOK: Coordinates = Coordinates {
        latitude: 13.7563,
        longitude: 100.5018,
    };

    #[test]
    fn test_second_lookup_hits_cache() {
        let source = CachedWeatherSource::new(Box::new(ScriptedProvider::new(false)));
        let as_of = date(2025, 6, 1);
        let target = date(2025, 6, 3);

        let first = source.condition_for(as_of, target, BANGKOK);
        let second = source.condition_for(as_of, target, BANGKOK);
        assert_eq!(first, WeatherCondition::Rain);
        assert_eq!(second, WeatherCondition::Rain);
        assert_eq!(source.cached_count(), 1);
    }

    #[test]
    fn test_provider_failure_falls_back_to_sunny() {
        let source = CachedWeatherSource::new(Box::new(ScriptedProvider::new(true)));
        let condition = source.condition_for(date(2025, 6, 1), date(2025, 6, 3), BANGKOK);
        assert_eq!(condition, DEFAULT_CONDITION);
        assert_eq!(source.cached_count(), 0);
    }

    #[test]
    fn test_out_of_horizon_is_not_fetched() {
        let provider = Box::new(ScriptedProvider::new(false));
        let source = CachedWeatherSource::new(provider);
        let as_of = date(2025, 6, 1);

        // 20 days ahead: beyond the 16-day horizon
        let condition = source.condition_for(as_of, date(2025, 6, 21), BANGKOK);
        assert_eq!(condition, DEFAULT_CONDITION);

        // The past is equally out of scope
        let condition = source.condition_for(as_of, date(2025, 5, 20), BANGKOK);
        assert_eq!(condition, DEFAULT_CONDITION);

        assert_eq!(source.cached_count(), 0);
    }

    #[test]
    fn test_clear_resets_cache() {
        let source = CachedWeatherSource::new(Box::new(ScriptedProvider::new(false)));
        let as_of = date(2025, 6, 1);
        source.condition_for(as_of, date(2025, 6, 2), BANGKOK);
        source.condition_for(as_of, date(2025, 6, 3), BANGKOK);
        assert_eq!(source.cached_count(), 2);

        source.clear();
        assert_eq!(source.cached_count(), 0);
    }

    #[test]
    fn test_distinct_locations_cached_separately() {
        let source = CachedWeatherSource::new(Box::new(ScriptedProvider::new(false)));
        let as_of = date(2025, 6, 1);
        let chiang_mai = Coordinates {
            latitude: 18.7883,
            longitude: 98.9853,
        };
        source.condition_for(as_of, date(2025, 6, 2), BANGKOK);
        source.condition_for(as_of, date(2025, 6, 2), chiang_mai);
        assert_eq!(source.cached_count(), 2);
    }
}
