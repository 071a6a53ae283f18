//! Static domain calendar: holidays, month seasonality and payday windows.
//!
//! The holiday table is configuration data, not code: a builtin default set
//! ships with the crate and hosts can load their own table from JSON at
//! startup. Entries are indexed by ISO date.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{ForecastError, Result};

/// Demand multiplier applied on payday-window days with no exact holiday.
pub const PAYDAY_FACTOR: f64 = 1.20;

/// Share of a holiday's effect applied on near-holiday days (±2 days).
const NEAR_HOLIDAY_STRENGTH: f64 = 0.3;

/// Month-of-year demand multipliers, January first.
///
/// School-break months run below 1.0; the festive year-end runs above.
const MONTH_FACTORS: [f64; 12] = [
    0.95, 1.0, 1.0, 1.05, 1.0, 0.9, 0.85, 0.9, 1.0, 1.05, 1.1, 1.2,
];

/// A named holiday with its demand multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct HolidayEntry {
    pub name: String,
    /// Demand multiplier for the exact date. Major travel holidays sit well
    /// below 1.0 (everyone leaves town); festive evenings sit above.
    pub factor: f64,
}

/// Calendar effect resolved for a single date.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEffect {
    /// Combined multiplier (holiday-or-payday x month)
    pub factor: f64,
    /// Exact holiday name when one matched
    pub holiday: Option<String>,
    /// Whether the near-holiday decay was applied instead of an exact match
    pub near_holiday: bool,
    /// Whether the payday factor was applied
    pub payday_applied: bool,
}

/// Holiday/festival table indexed by ISO date.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    entries: HashMap<NaiveDate, HolidayEntry>,
}

/// Whether a date falls in the payday window (month end or start).
pub fn is_payday(date: NaiveDate) -> bool {
    let day = date.day();
    day >= 25 || day <= 5
}

impl HolidayCalendar {
    /// Empty calendar (month seasonality and paydays still apply).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builtin multi-year default table.
    ///
    /// Covers the recurring major dates; hosts with richer regional
    /// calendars load their own via [`HolidayCalendar::from_json`].
    pub fn builtin() -> Self {
        let mut cal = Self::new();
        for year in 2023..=2027 {
            // Major travel holidays: markets empty out
            cal.add(date(year, 1, 1), "New Year's Day", 0.4);
            cal.add(date(year, 4, 13), "Songkran", 0.3);
            cal.add(date(year, 4, 14), "Songkran", 0.3);
            cal.add(date(year, 4, 15), "Songkran", 0.35);
            cal.add(date(year, 12, 25), "Christmas Day", 0.6);

            // Festive evenings: elevated demand
            cal.add(date(year, 2, 14), "Valentine's Day", 1.3);
            cal.add(date(year, 11, 15), "Loy Krathong", 1.4);
            cal.add(date(year, 12, 24), "Christmas Eve", 1.3);
            cal.add(date(year, 12, 31), "New Year's Eve", 1.5);
        }
        cal
    }

    /// Load a calendar from a JSON array of
    /// `{"date": "YYYY-MM-DD", "name": ..., "factor": ...}` objects.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ForecastError::InvalidInput(format!("holiday JSON: {e}")))?;

        let entries = parsed.as_array().ok_or_else(|| {
            ForecastError::InvalidInput("holiday JSON must be an array".to_string())
        })?;

        let mut cal = Self::new();
        for entry in entries {
            let date_str = entry
                .get("date")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ForecastError::InvalidInput("holiday entry missing date".into()))?;
            let parsed_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                ForecastError::InvalidInput(format!("holiday date '{date_str}': {e}"))
            })?;
            let name = entry
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("holiday");
            let factor = entry.get("factor").and_then(|v| v.as_f64()).ok_or_else(|| {
                ForecastError::InvalidInput(format!("holiday '{name}' missing factor"))
            })?;
            cal.add(parsed_date, name, factor);
        }
        Ok(cal)
    }

    /// Add or replace an entry.
    pub fn add(&mut self, date: NaiveDate, name: &str, factor: f64) {
        self.entries.insert(
            date,
            HolidayEntry {
                name: name.to_string(),
                factor: factor.max(0.0),
            },
        );
    }

    /// Whether the date has an exact holiday entry.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.entries.contains_key(&date)
    }

    /// Exact entry for a date, if any.
    pub fn get(&self, date: NaiveDate) -> Option<&HolidayEntry> {
        self.entries.get(&date)
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the combined calendar effect for a date.
    ///
    /// Exact holiday match wins and suppresses the payday factor. With no
    /// exact match, a holiday within ±2 days contributes 30% of its effect,
    /// and the payday factor applies on payday-window days. The month
    /// seasonality multiplier always applies.
    pub fn effect_for(&self, target: NaiveDate) -> CalendarEffect {
        self.effect_with_payday(target, PAYDAY_FACTOR)
    }

    /// Same as [`HolidayCalendar::effect_for`] with a caller-supplied payday
    /// multiplier, so a learned payday factor can stand in for the default.
    pub fn effect_with_payday(&self, target: NaiveDate, payday_factor: f64) -> CalendarEffect {
        let month_factor = MONTH_FACTORS[target.month0() as usize];

        if let Some(entry) = self.entries.get(&target) {
            return CalendarEffect {
                factor: entry.factor * month_factor,
                holiday: Some(entry.name.clone()),
                near_holiday: false,
                payday_applied: false,
            };
        }

        let mut factor = 1.0;
        let mut near_holiday = false;

        // Nearest holiday within ±2 days, at reduced strength
        for offset in [-2i64, -1, 1, 2] {
            let probe = target + Duration::days(offset);
            if let Some(entry) = self.entries.get(&probe) {
                factor *= 1.0 + NEAR_HOLIDAY_STRENGTH * (entry.factor - 1.0);
                near_holiday = true;
                break;
            }
        }

        let payday_applied = is_payday(target);
        if payday_applied {
            factor *= payday_factor;
        }

        CalendarEffect {
            factor: factor * month_factor,
            holiday: None,
            near_holiday,
            payday_applied,
        }
    }
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("static calendar date is valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_payday_window() {
        assert!(is_payday(date(2025, 1, 25)));
        assert!(is_payday(date(2025, 1, 31)));
        assert!(is_payday(date(2025, 2, 1)));
        assert!(is_payday(date(2025, 2, 5)));
        assert!(!is_payday(date(2025, 2, 6)));
        assert!(!is_payday(date(2025, 2, 15)));
    }

    #[test]
    fn test_exact_holiday_suppresses_payday() {
        let cal = HolidayCalendar::builtin();
        // New Year's Eve is both a holiday and in the payday window
        let effect = cal.effect_for(date(2025, 12, 31));
        assert!(effect.holiday.is_some());
        assert!(!effect.payday_applied);
        // December month factor 1.2, NYE factor 1.5
        assert_relative_eq!(effect.factor, 1.5 * 1.2, epsilon = 1e-10);
    }

    #[test]
    fn test_near_holiday_decay() {
        let mut cal = HolidayCalendar::new();
        cal.add(date(2025, 6, 10), "Festival", 1.5);

        let effect = cal.effect_for(date(2025, 6, 11));
        assert!(effect.near_holiday);
        assert!(effect.holiday.is_none());
        // 30% of the +0.5 effect, June month factor 0.9
        assert_relative_eq!(effect.factor, 1.15 * 0.9, epsilon = 1e-10);

        // Out of range: plain month factor
        let effect = cal.effect_for(date(2025, 6, 14));
        assert!(!effect.near_holiday);
        assert_relative_eq!(effect.factor, 0.9, epsilon = 1e-10);
    }

    #[test]
    fn test_payday_factor_applied_off_holiday() {
        let cal = HolidayCalendar::new();
        let effect = cal.effect_for(date(2025, 3, 28));
        assert!(effect.payday_applied);
        assert_relative_eq!(effect.factor, PAYDAY_FACTOR, epsilon = 1e-10);
    }

    #[test]
    fn test_from_json_round_trip() {
        let json = r#"[
            {"date": "2025-04-13", "name": "Songkran", "factor": 0.3},
            {"date": "2025-11-15", "name": "Loy Krathong", "factor": 1.4}
        ]"#;
        let cal = HolidayCalendar::from_json(json).unwrap();
        assert_eq!(cal.len(), 2);
        assert_eq!(cal.get(date(2025, 4, 13)).unwrap().name, "Songkran");
        assert_relative_eq!(cal.get(date(2025, 11, 15)).unwrap().factor, 1.4);

        assert!(HolidayCalendar::from_json("{}").is_err());
        assert!(HolidayCalendar::from_json(r#"[{"name": "x", "factor": 1.0}]"#).is_err());
    }
}
