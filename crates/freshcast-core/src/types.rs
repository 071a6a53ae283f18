//! Boundary records exchanged with the host application.
//!
//! Sales history, catalog economics and planned-forecast entries are owned
//! and persisted by the host; the engine only ever reads them.

use chrono::NaiveDate;

use crate::weather::WeatherCondition;

/// A single historical sale, as recorded by the host's sales ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    /// Day the sale happened
    pub date: NaiveDate,
    /// Product identifier
    pub product_id: String,
    /// Optional variant identifier (size, flavor, ...)
    pub variant_id: Option<String>,
    /// Market/outlet identifier
    pub market_id: String,
    /// Units sold
    pub quantity_sold: f64,
    /// Selling price per unit at the time of sale
    pub unit_price: f64,
    /// Production cost per unit at the time of sale
    pub unit_cost: f64,
    /// Units produced but discarded that day, if tracked
    pub waste_qty: Option<f64>,
    /// Weather condition recorded for that day, if tracked
    pub weather: Option<WeatherCondition>,
}

impl SaleRecord {
    /// Revenue contributed by this record.
    pub fn revenue(&self) -> f64 {
        self.quantity_sold * self.unit_price
    }
}

/// Unit economics for the target product, from the host's catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitEconomics {
    /// Selling price per unit
    pub selling_price: f64,
    /// Production cost per unit
    pub unit_cost: f64,
    /// Disposal cost per unsold unit (default 0)
    pub disposal_cost: f64,
}

impl UnitEconomics {
    /// Economics with no disposal cost.
    pub fn new(selling_price: f64, unit_cost: f64) -> Self {
        Self {
            selling_price,
            unit_cost,
            disposal_cost: 0.0,
        }
    }
}

/// A previously issued forecast, kept by the host so realized sales can be
/// joined against it once actuals are known.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedForecast {
    pub product_id: String,
    pub market_id: String,
    /// Day the forecast was made for
    pub forecast_for: NaiveDate,
    /// Quantity the engine recommended
    pub optimal_quantity: u32,
    /// Weather the forecast assumed, if any
    pub weather_forecast: Option<WeatherCondition>,
}

/// Geographic position of a market, for the live weather fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A single day's weather as returned by the weather service.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObservation {
    pub condition: WeatherCondition,
    /// Mean temperature in degrees Celsius
    pub temperature: f64,
    /// Precipitation sum in millimetres
    pub precipitation: f64,
    /// Relative humidity percentage
    pub humidity: f64,
}
