// ──────────────────────────────────────────────────────────────────────────────
// Efficient Frontier
// ──────────────────────────────────────────────────────────────────────────────
//
// Long-only minimum-variance weights for a sweep of target returns.
//
//   * one asset:  the frontier is a single point holding 100% of it
//   * two assets: exact closed form on the return constraint
//   * N assets:   Sharpe-score weighting nudged toward the target return
//
// The N-asset path approximates mean-variance optimization; every point it
// yields still satisfies sum(w) = 1 and w >= 0, and the frontier is sorted
// ascending by sqrt(wᵗΣw).

use crate::covariance::CovarianceMatrix;
use crate::error::OptimizerError;
use crate::types::{EfficientFrontier, FrontierPoint, RiskTolerance};
use tracing::debug;

/// Points with risk above `target * RISK_BAND_SLACK` are never selected.
const RISK_BAND_SLACK: f64 = 1.1;

/// Score penalty per unit of risk over target.
const OVERSHOOT_PENALTY: f64 = 10.0;

pub struct FrontierBuilder<'a> {
    expected_returns: &'a [f64],
    covariance: &'a CovarianceMatrix,
    risk_free_rate: f64,
    points: usize,
}

impl<'a> FrontierBuilder<'a> {
    pub fn new(
        expected_returns: &'a [f64],
        covariance: &'a CovarianceMatrix,
        risk_free_rate: f64,
        points: usize,
    ) -> Result<Self, OptimizerError> {
        if expected_returns.is_empty() {
            return Err(OptimizerError::Internal(
                "cannot build a frontier over zero assets".to_string(),
            ));
        }
        if covariance.len() != expected_returns.len() {
            return Err(OptimizerError::DimensionMismatch {
                context: "covariance matrix",
                expected: expected_returns.len(),
                actual: covariance.len(),
            });
        }
        Ok(Self {
            expected_returns,
            covariance,
            risk_free_rate,
            points: points.max(2),
        })
    }

    pub fn build(&self) -> EfficientFrontier {
        let n = self.expected_returns.len();
        let min_ret = self.expected_returns.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ret = self.expected_returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let targets: Vec<f64> = if n == 1 || (max_ret - min_ret).abs() < 1e-12 {
            vec![min_ret]
        } else {
            let step = (max_ret - min_ret) / (self.points - 1) as f64;
            (0..self.points).map(|k| min_ret + step * k as f64).collect()
        };

        let mut points: Vec<FrontierPoint> = targets
            .iter()
            .map(|&target| self.point(self.weights_for_target(target)))
            .collect();
        points.sort_by(|a, b| a.risk.total_cmp(&b.risk));

        debug!(
            "Built frontier: {} points over {} assets, return range [{:.4}, {:.4}]",
            points.len(),
            n,
            min_ret,
            max_ret
        );

        EfficientFrontier {
            symbols: self.covariance.symbols.clone(),
            points,
        }
    }

    pub fn point(&self, weights: Vec<f64>) -> FrontierPoint {
        FrontierPoint {
            risk: self.covariance.portfolio_volatility(&weights),
            expected_return: portfolio_return(&weights, self.expected_returns),
            weights,
        }
    }

    /// Long-only weights whose return approximates `target`.
    pub fn weights_for_target(&self, target: f64) -> Vec<f64> {
        match self.expected_returns.len() {
            1 => vec![1.0],
            2 => self.two_asset_weights(target),
            _ => self.heuristic_weights(target),
        }
    }

    fn two_asset_weights(&self, target: f64) -> Vec<f64> {
        let (r1, r2) = (self.expected_returns[0], self.expected_returns[1]);
        let w1 = if (r1 - r2).abs() < 1e-12 {
            let v1 = self.covariance.values[0][0];
            let v2 = self.covariance.values[1][1];
            let c12 = self.covariance.values[0][1];
            let denom = v1 + v2 - 2.0 * c12;
            if denom.abs() < 1e-15 { 0.5 } else { (v2 - c12) / denom }
        } else {
            (target - r2) / (r1 - r2)
        };
        let w1 = w1.clamp(0.0, 1.0);
        vec![w1, 1.0 - w1]
    }

    fn heuristic_weights(&self, target: f64) -> Vec<f64> {
        let base = self.sharpe_score_weights();
        let current = portfolio_return(&base, self.expected_returns);
        if current.abs() < 1e-12 {
            return base;
        }

        let adjustment = (target - current) / current;
        let nudged: Vec<f64> = base
            .iter()
            .zip(self.expected_returns.iter())
            .map(|(&w, &r)| (w * (1.0 + adjustment * (r / current))).max(0.0))
            .collect();

        normalize(nudged).unwrap_or(base)
    }

    /// Weights proportional to each asset's positive excess-return-per-risk.
    fn sharpe_score_weights(&self) -> Vec<f64> {
        let scores: Vec<f64> = self
            .expected_returns
            .iter()
            .enumerate()
            .map(|(i, &r)| {
                let vol = self.covariance.volatility(i);
                if vol > 1e-12 {
                    ((r - self.risk_free_rate) / vol).max(0.0)
                } else {
                    0.0
                }
            })
            .collect();

        let n = scores.len();
        normalize(scores).unwrap_or_else(|| vec![1.0 / n as f64; n])
    }
}

pub fn portfolio_return(weights: &[f64], means: &[f64]) -> f64 {
    weights.iter().zip(means.iter()).map(|(w, r)| w * r).sum()
}

/// Scales to sum 1; `None` when the sum is not positive.
fn normalize(mut weights: Vec<f64>) -> Option<Vec<f64>> {
    let sum: f64 = weights.iter().sum();
    if !(sum > 1e-12 && sum.is_finite()) {
        return None;
    }
    weights.iter_mut().for_each(|w| *w /= sum);
    Some(weights)
}

/// Picks the frontier point that best fits `tolerance`: the highest
/// penalized Sharpe among points inside the risk band, else the lowest-risk
/// point.
pub fn select_portfolio<'f>(
    frontier: &'f EfficientFrontier,
    tolerance: RiskTolerance,
    risk_free_rate: f64,
) -> Result<&'f FrontierPoint, OptimizerError> {
    let target = tolerance.target_volatility();
    let ceiling = target * RISK_BAND_SLACK;

    let mut best: Option<(&FrontierPoint, f64)> = None;
    for point in frontier.points.iter().filter(|p| p.risk <= ceiling) {
        let penalty = (point.risk - target).max(0.0) * OVERSHOOT_PENALTY;
        let score = point.sharpe(risk_free_rate) - penalty;
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((point, score));
        }
    }

    match best {
        Some((point, score)) => {
            debug!(
                "Selected frontier point risk={:.4} return={:.4} score={:.4} for {}",
                point.risk, point.expected_return, score, tolerance
            );
            Ok(point)
        }
        None => frontier
            .points
            .iter()
            .min_by(|a, b| a.risk.total_cmp(&b.risk))
            .inspect(|p| {
                debug!(
                    "No frontier point within {:.0}% band for {}; using lowest risk {:.4}",
                    ceiling * 100.0,
                    tolerance,
                    p.risk
                )
            })
            .ok_or_else(|| OptimizerError::Internal("efficient frontier is empty".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uncorrelated(vols: &[f64]) -> CovarianceMatrix {
        let n = vols.len();
        let symbols = (0..n).map(|i| format!("A{}", i)).collect();
        let corr = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        CovarianceMatrix::from_volatilities(symbols, vols, corr).unwrap()
    }

    fn assert_valid_weights(w: &[f64]) {
        let sum: f64 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "Weights should sum to 1.0, got {}", sum);
        assert!(w.iter().all(|&v| (0.0..=1.0).contains(&v)), "Weights out of [0,1]: {:?}", w);
    }

    #[test]
    fn test_two_asset_closed_form_midpoint() {
        let returns = [0.10, 0.05];
        let cov = uncorrelated(&[0.15, 0.05]);
        let builder = FrontierBuilder::new(&returns, &cov, 0.02, 100).unwrap();
        let w = builder.weights_for_target(0.075);
        assert!((w[0] - 0.5).abs() < 1e-9);
        assert!((w[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_two_asset_target_outside_range_is_clipped() {
        let returns = [0.10, 0.05];
        let cov = uncorrelated(&[0.15, 0.05]);
        let builder = FrontierBuilder::new(&returns, &cov, 0.02, 100).unwrap();
        assert_eq!(builder.weights_for_target(0.5), vec![1.0, 0.0]);
        assert_eq!(builder.weights_for_target(-0.5), vec![0.0, 1.0]);
    }

    #[test]
    fn test_two_asset_equal_returns_uses_min_variance() {
        let returns = [0.08, 0.08];
        let cov = uncorrelated(&[0.20, 0.10]);
        let builder = FrontierBuilder::new(&returns, &cov, 0.02, 100).unwrap();
        let w = builder.weights_for_target(0.08);
        // σ2² / (σ1² + σ2²) = 0.01 / 0.05
        assert!((w[0] - 0.2).abs() < 1e-12);
        let frontier = builder.build();
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_single_asset_frontier_degenerates() {
        let returns = [0.09];
        let cov = uncorrelated(&[0.18]);
        let frontier = FrontierBuilder::new(&returns, &cov, 0.02, 100).unwrap().build();
        assert_eq!(frontier.len(), 1);
        let p = &frontier.points[0];
        assert_eq!(p.weights, vec![1.0]);
        assert!((p.risk - 0.18).abs() < 1e-12);
        assert!((p.expected_return - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_frontier_sorted_and_weights_valid() {
        let returns = [0.12, 0.07, 0.04, 0.10];
        let cov = uncorrelated(&[0.25, 0.12, 0.05, 0.20]);
        let frontier = FrontierBuilder::new(&returns, &cov, 0.02, 100).unwrap().build();
        assert_eq!(frontier.len(), 100);
        for pair in frontier.points.windows(2) {
            assert!(pair[0].risk <= pair[1].risk, "Frontier must be ascending by risk");
        }
        for p in &frontier.points {
            assert_valid_weights(&p.weights);
        }
    }

    #[test]
    fn test_heuristic_moves_toward_target() {
        let returns = [0.12, 0.07, 0.04];
        let cov = uncorrelated(&[0.25, 0.12, 0.05]);
        let builder = FrontierBuilder::new(&returns, &cov, 0.02, 100).unwrap();
        let low = builder.point(builder.weights_for_target(0.04));
        let high = builder.point(builder.weights_for_target(0.12));
        assert!(high.expected_return > low.expected_return);
        assert_valid_weights(&low.weights);
        assert_valid_weights(&high.weights);
    }

    #[test]
    fn test_heuristic_all_scores_zero_gives_equal_weights() {
        // Nothing beats the risk-free rate.
        let returns = [0.01, 0.015, 0.005];
        let cov = uncorrelated(&[0.1, 0.2, 0.3]);
        let builder = FrontierBuilder::new(&returns, &cov, 0.02, 10).unwrap();
        let base = builder.sharpe_score_weights();
        assert!(base.iter().all(|w| (w - 1.0 / 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_random_portfolios_have_non_negative_risk() {
        use rand::SeedableRng;
        use rand_distr::{Distribution, Exp1};
        let cov = uncorrelated(&[0.25, 0.12, 0.05, 0.2]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let raw: Vec<f64> = (0..4).map(|_| Exp1.sample(&mut rng)).collect();
            let w = normalize(raw).unwrap();
            assert_valid_weights(&w);
            assert!(cov.portfolio_variance(&w) >= 0.0);
        }
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let cov = uncorrelated(&[0.1, 0.2]);
        assert!(matches!(
            FrontierBuilder::new(&[0.1], &cov, 0.02, 10),
            Err(OptimizerError::DimensionMismatch { .. })
        ));
    }

    fn frontier_of(points: &[(f64, f64)]) -> EfficientFrontier {
        EfficientFrontier {
            symbols: vec!["A".into()],
            points: points
                .iter()
                .map(|&(risk, ret)| FrontierPoint { risk, expected_return: ret, weights: vec![1.0] })
                .collect(),
        }
    }

    #[test]
    fn test_selector_prefers_best_sharpe_inside_band() {
        let frontier = frontier_of(&[(0.05, 0.04), (0.10, 0.09), (0.15, 0.11), (0.30, 0.20)]);
        let chosen = select_portfolio(&frontier, RiskTolerance::Moderate, 0.02).unwrap();
        // Sharpe: 0.4, 0.7, 0.6; the 0.30 point is outside the 17.6% band.
        assert_eq!(chosen.risk, 0.10);
    }

    #[test]
    fn test_selector_penalizes_overshoot() {
        // 0.17 overshoots the moderate 0.16 target by 0.01 => penalty 0.1.
        let frontier = frontier_of(&[(0.15, 0.110), (0.17, 0.125)]);
        let chosen = select_portfolio(&frontier, RiskTolerance::Moderate, 0.02).unwrap();
        // Sharpe 0.6 vs 0.6176 - 0.1
        assert_eq!(chosen.risk, 0.15);
    }

    #[test]
    fn test_selector_falls_back_to_lowest_risk() {
        let frontier = frontier_of(&[(0.40, 0.20), (0.50, 0.25)]);
        let chosen = select_portfolio(&frontier, RiskTolerance::Conservative, 0.02).unwrap();
        assert_eq!(chosen.risk, 0.40);
    }

    #[test]
    fn test_selector_empty_frontier_is_error() {
        let frontier = EfficientFrontier::default();
        assert!(select_portfolio(&frontier, RiskTolerance::Moderate, 0.02).is_err());
    }
}
