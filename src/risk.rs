use crate::covariance::CovarianceMatrix;
use crate::error::OptimizerError;
use crate::frontier::portfolio_return;
use crate::types::RiskMetrics;
use serde::{Deserialize, Serialize};

/// Tail probability used for VaR and CVaR.
pub const VAR_ALPHA: f64 = 0.05;

/// Derives the risk profile of `weights` from annual statistics and the
/// daily return history of each asset.
pub fn calculate_risk_metrics(
    weights: &[f64],
    expected_returns: &[f64],
    covariance: &CovarianceMatrix,
    daily_returns: &[&[f64]],
    risk_free_rate: f64,
) -> Result<RiskMetrics, OptimizerError> {
    let n = weights.len();
    for (context, actual) in [
        ("expected returns", expected_returns.len()),
        ("covariance matrix", covariance.len()),
        ("return history", daily_returns.len()),
    ] {
        if actual != n {
            return Err(OptimizerError::DimensionMismatch { context, expected: n, actual });
        }
    }

    let expected_return = portfolio_return(weights, expected_returns);
    let volatility = covariance.portfolio_volatility(weights);
    let sharpe_ratio = sharpe_ratio(expected_return, volatility, risk_free_rate);
    let max_drawdown = max_drawdown(weights, daily_returns);
    let value_at_risk = value_at_risk(expected_return, volatility, VAR_ALPHA);
    let conditional_value_at_risk = conditional_value_at_risk(expected_return, volatility, VAR_ALPHA);

    Ok(RiskMetrics {
        expected_return,
        volatility,
        sharpe_ratio,
        max_drawdown,
        value_at_risk,
        conditional_value_at_risk,
    })
}

pub fn sharpe_ratio(expected_return: f64, volatility: f64, risk_free_rate: f64) -> f64 {
    if volatility > 1e-12 {
        (expected_return - risk_free_rate) / volatility
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline of the weighted portfolio, replayed over
/// the most recent days common to every asset. Returned as a fraction.
pub fn max_drawdown(weights: &[f64], daily_returns: &[&[f64]]) -> f64 {
    let days = daily_returns.iter().map(|r| r.len()).min().unwrap_or(0);
    let mut value = 1.0;
    let mut peak = 1.0;
    let mut worst = 0.0;

    for t in 0..days {
        let day_return: f64 = weights
            .iter()
            .zip(daily_returns.iter())
            .map(|(w, r)| w * r[r.len() - days + t])
            .sum();
        value *= 1.0 + day_return;
        if value > peak {
            peak = value;
        } else if peak > 0.0 {
            worst = f64::max(worst, (peak - value) / peak);
        }
    }

    worst
}

/// Parametric VaR: the `alpha` quantile of a normal return distribution.
pub fn value_at_risk(expected_return: f64, volatility: f64, alpha: f64) -> f64 {
    expected_return + inverse_normal_cdf(alpha) * volatility
}

/// Parametric CVaR: mean return in the `alpha` tail of a normal distribution.
pub fn conditional_value_at_risk(expected_return: f64, volatility: f64, alpha: f64) -> f64 {
    let z = inverse_normal_cdf(alpha);
    expected_return - (normal_pdf(z) / alpha) * volatility
}

pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Inverse standard-normal CDF (Acklam's rational approximation, relative
/// error below 1.2e-9). Returns ±∞ at the boundaries.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Presentation view of [`RiskMetrics`]: rates in percent, everything
/// rounded to two decimals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub expected_return_pct: f64,
    pub volatility_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub value_at_risk_pct: f64,
    pub conditional_value_at_risk_pct: f64,
}

impl RiskMetrics {
    pub fn report(&self) -> RiskReport {
        RiskReport {
            expected_return_pct: round2(self.expected_return * 100.0),
            volatility_pct: round2(self.volatility * 100.0),
            sharpe_ratio: round2(self.sharpe_ratio),
            max_drawdown_pct: round2(self.max_drawdown * 100.0),
            value_at_risk_pct: round2(self.value_at_risk * 100.0),
            conditional_value_at_risk_pct: round2(self.conditional_value_at_risk * 100.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal(vols: &[f64]) -> CovarianceMatrix {
        let n = vols.len();
        let corr = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        CovarianceMatrix::from_volatilities((0..n).map(|i| i.to_string()).collect(), vols, corr)
            .unwrap()
    }

    #[test]
    fn test_inverse_normal_known_quantiles() {
        assert!((inverse_normal_cdf(0.05) + 1.644853627).abs() < 1e-8);
        assert!((inverse_normal_cdf(0.975) - 1.959963985).abs() < 1e-8);
        assert!(inverse_normal_cdf(0.5).abs() < 1e-12);
        assert!((inverse_normal_cdf(0.001) + 3.090232306).abs() < 1e-7);
        assert_eq!(inverse_normal_cdf(0.0), f64::NEG_INFINITY);
        assert_eq!(inverse_normal_cdf(1.0), f64::INFINITY);
    }

    #[test]
    fn test_var_and_cvar() {
        let var = value_at_risk(0.08, 0.15, 0.05);
        assert!((var - (0.08 - 1.644853627 * 0.15)).abs() < 1e-8);
        let cvar = conditional_value_at_risk(0.08, 0.15, 0.05);
        // φ(1.6449)/0.05 ≈ 2.0627
        assert!((cvar - (0.08 - 2.062713 * 0.15)).abs() < 1e-5);
        assert!(cvar < var, "CVaR should be worse than VaR");
    }

    #[test]
    fn test_max_drawdown_replay() {
        let a = [0.10, -0.20, 0.05, 0.10];
        let dd = max_drawdown(&[1.0], &[&a[..]]);
        // peak 1.1 -> trough 0.88
        assert!((dd - 0.2).abs() < 1e-12);

        let up = [0.01, 0.02, 0.03];
        assert_eq!(max_drawdown(&[1.0], &[&up[..]]), 0.0);
        let empty: &[f64] = &[];
        assert_eq!(max_drawdown(&[1.0], &[empty]), 0.0);
    }

    #[test]
    fn test_max_drawdown_uses_common_tail() {
        let long = [-0.5, 0.0, -0.10];
        let short = [0.0, -0.10];
        let dd = max_drawdown(&[0.5, 0.5], &[&long[..], &short[..]]);
        assert!((dd - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_zero_volatility_portfolio_has_zero_sharpe() {
        let cov = diagonal(&[0.0, 0.0]);
        let flat = [0.0; 10];
        let metrics =
            calculate_risk_metrics(&[0.5, 0.5], &[0.05, 0.03], &cov, &[&flat[..], &flat[..]], 0.02).unwrap();
        assert_eq!(metrics.volatility, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert!(metrics.value_at_risk.is_finite());
        assert!(metrics.conditional_value_at_risk.is_finite());
        assert!((metrics.expected_return - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_metrics_for_single_asset() {
        let cov = diagonal(&[0.2]);
        let history = [0.01, -0.02, 0.015];
        let metrics = calculate_risk_metrics(&[1.0], &[0.1], &cov, &[&history[..]], 0.02).unwrap();
        assert!((metrics.volatility - 0.2).abs() < 1e-12);
        assert!((metrics.sharpe_ratio - 0.4).abs() < 1e-12);
        assert!(metrics.max_drawdown > 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let cov = diagonal(&[0.2, 0.1]);
        let h = [0.0; 3];
        assert!(matches!(
            calculate_risk_metrics(&[1.0], &[0.1], &cov, &[&h[..]], 0.02),
            Err(OptimizerError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_report_rounds_to_percent() {
        let m = RiskMetrics {
            expected_return: 0.081234,
            volatility: 0.15678,
            sharpe_ratio: 0.39549,
            max_drawdown: 0.2,
            value_at_risk: -0.176651,
            conditional_value_at_risk: -0.2281,
        };
        let r = m.report();
        assert_eq!(r.expected_return_pct, 8.12);
        assert_eq!(r.volatility_pct, 15.68);
        assert_eq!(r.sharpe_ratio, 0.40);
        assert_eq!(r.value_at_risk_pct, -17.67);
        assert_eq!(r.conditional_value_at_risk_pct, -22.81);
    }
}
