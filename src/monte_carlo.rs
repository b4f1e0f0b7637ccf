//! Monte Carlo forward simulation for portfolio projection.
//!
//! Correlated daily returns are generated from independent standard normals
//! through the Cholesky factor of the annualized covariance matrix, and the
//! weighted portfolio value is compounded over the horizon. Scenarios run in
//! parallel via Rayon.
//!
//! Cost is O(scenarios × days × assets²): each simulated day performs one
//! lower-triangular matrix-vector product. Callers size their timeouts from
//! that bound; 1000 × 252 × 10² is roughly 25M multiply-adds.

use crate::covariance::CovarianceMatrix;
use crate::error::OptimizerError;
use crate::returns::fill_standard_normals;
use crate::types::SimulationResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

/// Lower-triangular `L` with `A = L·Lᵀ` for a symmetric positive
/// semi-definite `A`. Negative residual pivots are clamped to zero and a zero
/// pivot zeroes the rest of its column, so near-singular input never fails.
pub fn cholesky(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[i][k] * l[j][k];
            }

            if i == j {
                l[i][j] = (matrix[i][i] - sum).max(0.0).sqrt();
            } else if l[j][j] > 0.0 {
                l[i][j] = (matrix[i][j] - sum) / l[j][j];
            } else {
                l[i][j] = 0.0;
            }
        }
    }

    l
}

/// Simulates a fixed-weight portfolio over one horizon.
pub struct MonteCarloSimulator<'a> {
    covariance: &'a CovarianceMatrix,
    expected_returns: &'a [f64],
    weights: &'a [f64],
    scenarios: usize,
    trading_days: usize,
}

impl<'a> MonteCarloSimulator<'a> {
    pub fn new(
        covariance: &'a CovarianceMatrix,
        expected_returns: &'a [f64],
        weights: &'a [f64],
        scenarios: usize,
        trading_days: usize,
    ) -> Result<Self, OptimizerError> {
        let n = covariance.len();
        if expected_returns.len() != n {
            return Err(OptimizerError::DimensionMismatch {
                context: "expected returns",
                expected: n,
                actual: expected_returns.len(),
            });
        }
        if weights.len() != n {
            return Err(OptimizerError::DimensionMismatch {
                context: "weights",
                expected: n,
                actual: weights.len(),
            });
        }
        if scenarios == 0 || trading_days == 0 {
            return Err(OptimizerError::Internal(format!(
                "simulation needs at least one scenario and one day (got {} x {})",
                scenarios, trading_days
            )));
        }
        Ok(Self {
            covariance,
            expected_returns,
            weights,
            scenarios,
            trading_days,
        })
    }

    /// Runs every scenario from `initial_value`.
    ///
    /// One sub-stream seed per scenario is drawn from `rng` up front, in
    /// scenario order, and each scenario then owns a `StdRng` built from its
    /// seed. Output is therefore identical for identical `rng` state no
    /// matter how Rayon schedules the work.
    pub fn simulate<R: Rng + ?Sized>(&self, initial_value: f64, rng: &mut R) -> SimulationResult {
        let n = self.covariance.len();
        let chol = cholesky(&self.covariance.values);
        let days = self.trading_days as f64;

        let daily_drift: Vec<f64> = self.expected_returns.iter().map(|r| r / days).collect();
        let annual_vol: Vec<f64> = (0..n).map(|i| self.covariance.volatility(i)).collect();
        let daily_vol: Vec<f64> = (0..n)
            .map(|i| (self.covariance.variance(i) / days).sqrt())
            .collect();

        let seeds: Vec<u64> = (0..self.scenarios).map(|_| rng.next_u64()).collect();

        let mut final_values: Vec<f64> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut scenario_rng = StdRng::seed_from_u64(seed);
                let mut z = vec![0.0; n];
                let mut value = initial_value;

                for _ in 0..self.trading_days {
                    fill_standard_normals(&mut scenario_rng, &mut z);

                    let mut portfolio_return = 0.0;
                    for i in 0..n {
                        let correlated: f64 = (0..=i).map(|k| chol[i][k] * z[k]).sum();
                        let unit_shock = if annual_vol[i] > 0.0 {
                            correlated / annual_vol[i]
                        } else {
                            0.0
                        };
                        let asset_return = daily_drift[i] + unit_shock * daily_vol[i];
                        portfolio_return += self.weights[i] * asset_return;
                    }

                    value = (value * (1.0 + portfolio_return)).max(0.0);
                }

                value
            })
            .collect();

        final_values.sort_by(f64::total_cmp);
        let result = summarize(final_values, initial_value);

        debug!(
            "Monte Carlo: {} scenarios x {} days, mean={:.2}, p5={:.2}, p95={:.2}, success={:.3}",
            result.scenarios,
            self.trading_days,
            result.mean,
            result.percentile_5,
            result.percentile_95,
            result.success_rate
        );

        result
    }
}

/// Value at `floor(p × S)` in an ascending slice, clamped to the last index.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn summarize(final_values: Vec<f64>, initial_value: f64) -> SimulationResult {
    let s = final_values.len();
    let mean = final_values.iter().sum::<f64>() / s.max(1) as f64;
    let successes = final_values.iter().filter(|&&v| v > initial_value).count();

    SimulationResult {
        scenarios: s,
        initial_value,
        mean,
        success_rate: successes as f64 / s.max(1) as f64,
        percentile_5: percentile(&final_values, 0.05),
        percentile_25: percentile(&final_values, 0.25),
        percentile_50: percentile(&final_values, 0.50),
        percentile_75: percentile(&final_values, 0.75),
        percentile_95: percentile(&final_values, 0.95),
        final_values,
    }
}
