//! Discrete demand distributions for the newsvendor optimization.
//!
//! PMF/CDF are computed directly in log space so large counts do not
//! overflow; `ln_gamma` comes from statrs. The CDF is an exact running PMF
//! sum, which is what the optimizer's linear quantile scan needs anyway.

use statrs::function::gamma::ln_gamma;

use crate::error::{ForecastError, Result};

/// Demand distribution used as the newsvendor input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DemandDistribution {
    /// Poisson demand with mean `lambda`.
    Poisson { lambda: f64 },
    /// Negative binomial demand counting failures before `r` successes with
    /// success probability `p`. Used when demand is overdispersed
    /// (variance > mean).
    NegativeBinomial { r: f64, p: f64 },
}

impl DemandDistribution {
    /// Poisson distribution with the given mean.
    pub fn poisson(lambda: f64) -> Result<Self> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(ForecastError::InvalidParameter {
                param: "lambda".into(),
                value: format!("{lambda}"),
                reason: "must be finite and non-negative".into(),
            });
        }
        Ok(Self::Poisson { lambda })
    }

    /// Negative binomial distribution parameterized directly by (r, p).
    pub fn negative_binomial(r: f64, p: f64) -> Result<Self> {
        if !r.is_finite() || r <= 0.0 {
            return Err(ForecastError::InvalidParameter {
                param: "r".into(),
                value: format!("{r}"),
                reason: "must be finite and positive".into(),
            });
        }
        if !(0.0..=1.0).contains(&p) || p <= 0.0 {
            return Err(ForecastError::InvalidParameter {
                param: "p".into(),
                value: format!("{p}"),
                reason: "must be in (0, 1]".into(),
            });
        }
        Ok(Self::NegativeBinomial { r, p })
    }

    /// Negative binomial fitted from a mean/variance pair.
    ///
    /// Falls back to Poisson when the variance does not exceed the mean
    /// (no overdispersion to model).
    pub fn from_moments(mean: f64, variance: f64) -> Result<Self> {
        if variance > mean && mean > 0.0 {
            let p = mean / variance;
            let r = mean * mean / (variance - mean);
            Self::negative_binomial(r, p)
        } else {
            Self::poisson(mean.max(0.0))
        }
    }

    /// Distribution mean.
    pub fn mean(&self) -> f64 {
        match *self {
            Self::Poisson { lambda } => lambda,
            Self::NegativeBinomial { r, p } => r * (1.0 - p) / p,
        }
    }

    /// Distribution variance.
    pub fn variance(&self) -> f64 {
        match *self {
            Self::Poisson { lambda } => lambda,
            Self::NegativeBinomial { r, p } => r * (1.0 - p) / (p * p),
        }
    }

    /// Distribution standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Probability mass at `k`.
    pub fn pmf(&self, k: u32) -> f64 {
        let kf = k as f64;
        match *self {
            Self::Poisson { lambda } => {
                if lambda <= 0.0 {
                    return if k == 0 { 1.0 } else { 0.0 };
                }
                (kf * lambda.ln() - lambda - ln_gamma(kf + 1.0)).exp()
            }
            Self::NegativeBinomial { r, p } => {
                if p >= 1.0 {
                    return if k == 0 { 1.0 } else { 0.0 };
                }
                let ln_pmf = ln_gamma(kf + r) - ln_gamma(r) - ln_gamma(kf + 1.0)
                    + r * p.ln()
                    + kf * (1.0 - p).ln();
                ln_pmf.exp()
            }
        }
    }

    /// Cumulative probability P(X <= k), as a running PMF sum.
    pub fn cdf(&self, k: u32) -> f64 {
        let sum: f64 = (0..=k).map(|i| self.pmf(i)).sum();
        sum.min(1.0)
    }

    /// Central prediction interval at the given z-score, floored at zero.
    ///
    /// z = 1.28 gives the 80% interval used in forecast output.
    pub fn prediction_interval(&self, z: f64) -> (u32, u32) {
        let mean = self.mean();
        let sigma = self.std_dev();
        let lower = (mean - z * sigma).floor().max(0.0) as u32;
        let upper = (mean + z * sigma).ceil().max(0.0) as u32;
        (lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use statrs::distribution::{Discrete, DiscreteCDF, NegativeBinomial, Poisson};

    #[test]
    fn test_poisson_pmf_matches_statrs() {
        for &lambda in &[0.5, 2.0, 10.0, 20.0, 75.0] {
            let ours = DemandDistribution::poisson(lambda).unwrap();
            let theirs = Poisson::new(lambda).unwrap();
            for k in 0u32..120 {
                assert_relative_eq!(
                    ours.pmf(k),
                    theirs.pmf(k as u64),
                    epsilon = 1e-9,
                    max_relative = 1e-9
                );
            }
        }
    }

    #[test]
    fn test_poisson_cdf_matches_statrs() {
        for &lambda in &[1.0, 5.0, 20.0] {
            let ours = DemandDistribution::poisson(lambda).unwrap();
            let theirs = Poisson::new(lambda).unwrap();
            for k in 0u32..80 {
                assert_relative_eq!(ours.cdf(k), theirs.cdf(k as u64), epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_negative_binomial_pmf_matches_statrs() {
        let ours = DemandDistribution::negative_binomial(4.0, 0.25).unwrap();
        let theirs = NegativeBinomial::new(4.0, 0.25).unwrap();
        for k in 0u32..60 {
            assert_relative_eq!(
                ours.pmf(k),
                theirs.pmf(k as u64),
                epsilon = 1e-9,
                max_relative = 1e-9
            );
        }
    }

    #[test]
    fn test_from_moments_picks_family() {
        // Variance equal to mean: Poisson
        let d = DemandDistribution::from_moments(10.0, 10.0).unwrap();
        assert!(matches!(d, DemandDistribution::Poisson { .. }));

        // Overdispersed: negative binomial reproducing both moments
        let d = DemandDistribution::from_moments(10.0, 25.0).unwrap();
        assert!(matches!(d, DemandDistribution::NegativeBinomial { .. }));
        assert_relative_eq!(d.mean(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(d.variance(), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_lambda_is_point_mass() {
        let d = DemandDistribution::poisson(0.0).unwrap();
        assert_relative_eq!(d.pmf(0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(d.pmf(3), 0.0, epsilon = 1e-12);
        assert_relative_eq!(d.cdf(0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cdf_is_monotone_and_bounded() {
        let d = DemandDistribution::poisson(12.5).unwrap();
        let mut prev = 0.0;
        for k in 0u32..60 {
            let c = d.cdf(k);
            assert!(c >= prev);
            assert!(c <= 1.0);
            prev = c;
        }
        assert!(prev > 0.999999);
    }

    #[test]
    fn test_prediction_interval_80() {
        let d = DemandDistribution::poisson(20.0).unwrap();
        let (lower, upper) = d.prediction_interval(1.28);
        // sigma = sqrt(20) ~ 4.472; 20 - 1.28*4.472 ~ 14.27 -> 14
        assert_eq!(lower, 14);
        // 20 + 1.28*4.472 ~ 25.72 -> 26
        assert_eq!(upper, 26);

        // Small lambda never yields a negative bound
        let d = DemandDistribution::poisson(0.5).unwrap();
        let (lower, _) = d.prediction_interval(1.28);
        assert_eq!(lower, 0);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(DemandDistribution::poisson(-1.0).is_err());
        assert!(DemandDistribution::poisson(f64::NAN).is_err());
        assert!(DemandDistribution::negative_binomial(0.0, 0.5).is_err());
        assert!(DemandDistribution::negative_binomial(2.0, 0.0).is_err());
        assert!(DemandDistribution::negative_binomial(2.0, 1.5).is_err());
    }
}
