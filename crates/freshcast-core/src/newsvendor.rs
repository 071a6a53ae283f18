//! Newsvendor production-quantity optimization.
//!
//! Balances the margin lost to a stockout against the cost of an unsold
//! perishable unit. The critical ratio is clamped to [0.10, 0.90]: high
//! margins would otherwise push the service level so close to 1.0 that the
//! recommendation overshoots what a perishable product can absorb.

use crate::dist::DemandDistribution;
use crate::error::Result;
use crate::types::UnitEconomics;

/// Critical-ratio clamp bounds.
pub const CRITICAL_RATIO_MIN: f64 = 0.10;
pub const CRITICAL_RATIO_MAX: f64 = 0.90;

/// z-score for the 80% prediction interval reported with results.
const INTERVAL_Z: f64 = 1.28;

/// Optimization result for one demand distribution.
#[derive(Debug, Clone)]
pub struct NewsvendorResult {
    /// Smallest quantity whose CDF reaches the critical ratio
    pub optimal_quantity: u32,
    /// Target service level after clamping
    pub critical_ratio: f64,
    /// P(demand > Q*)
    pub stockout_probability: f64,
    /// P(demand <= Q* - 1): at least one unit left over
    pub waste_probability: f64,
    /// 80% central prediction interval on demand
    pub prediction_interval: (u32, u32),
    /// Mean of the demand distribution
    pub mean_demand: f64,
}

/// Critical ratio CR = Cu / (Cu + Co), clamped to [0.10, 0.90].
///
/// Cu = selling_price - unit_cost (margin lost per stocked-out unit),
/// Co = unit_cost + disposal_cost (cost per unsold unit). Degenerate
/// economics (Cu + Co <= 0) default to 0.5 instead of dividing by zero.
pub fn critical_ratio(econ: &UnitEconomics) -> f64 {
    let underage = econ.selling_price - econ.unit_cost;
    let overage = econ.unit_cost + econ.disposal_cost;
    let denominator = underage + overage;

    let ratio = if denominator <= 0.0 {
        0.5
    } else {
        underage / denominator
    };

    ratio.clamp(CRITICAL_RATIO_MIN, CRITICAL_RATIO_MAX)
}

/// Find the optimal production quantity for a demand distribution.
///
/// Q* is the smallest non-negative integer with CDF(Q*) >= CR, found by a
/// linear scan bounded at ceil(2 * mean) + 5. When the mean exceeds 5 the
/// result is additionally clamped to 1.5 * mean, so a heavy distribution
/// tail cannot push a perishable batch into pathological overproduction.
pub fn optimize(dist: &DemandDistribution, econ: &UnitEconomics) -> Result<NewsvendorResult> {
    let ratio = critical_ratio(econ);
    let mean = dist.mean();

    let scan_cap = (2.0 * mean).ceil() as u32 + 5;
    let mut optimal = scan_cap;
    let mut cumulative = 0.0;
    for k in 0..=scan_cap {
        cumulative += dist.pmf(k);
        if cumulative >= ratio {
            optimal = k;
            break;
        }
    }

    if mean > 5.0 {
        let clamp = (1.5 * mean).round() as u32;
        optimal = optimal.min(clamp);
    }

    let stockout_probability = (1.0 - dist.cdf(optimal)).max(0.0);
    let waste_probability = if optimal == 0 {
        0.0
    } else {
        dist.cdf(optimal - 1)
    };

    Ok(NewsvendorResult {
        optimal_quantity: optimal,
        critical_ratio: ratio,
        stockout_probability,
        waste_probability,
        prediction_interval: dist.prediction_interval(INTERVAL_Z),
        mean_demand: mean,
    })
}
