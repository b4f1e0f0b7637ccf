// ──────────────────────────────────────────────────────────────────────────────
// Optimization pipeline
// ──────────────────────────────────────────────────────────────────────────────
//
//   holdings ─► market data (fan-out, synthetic fallback)
//            ─► covariance ─► efficient frontier ─► tolerance selection
//            ─► risk metrics, Monte Carlo, rebalance deltas ─► report
//
// Nothing here outlives a single call to `optimize`.

use crate::config::OptimizerConfig;
use crate::covariance::CovarianceMatrix;
use crate::data::{PriceSource, load_asset_series};
use crate::error::OptimizerError;
use crate::frontier::{FrontierBuilder, select_portfolio};
use crate::monte_carlo::MonteCarloSimulator;
use crate::rebalance;
use crate::returns::AssetSeries;
use crate::risk::{calculate_risk_metrics, sharpe_ratio};
use crate::types::{AssetStatistics, OptimizationReport, OptimizationRequest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::info;

pub struct PortfolioOptimizer {
    config: OptimizerConfig,
    price_source: Arc<dyn PriceSource>,
}

impl PortfolioOptimizer {
    pub fn new(config: OptimizerConfig, price_source: Arc<dyn PriceSource>) -> Self {
        Self { config, price_source }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Runs the full pipeline with randomness seeded from `config.seed`.
    pub async fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizationReport, OptimizerError> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.optimize_with_rng(request, &mut rng).await
    }

    /// Runs the full pipeline drawing all randomness from `rng`.
    pub async fn optimize_with_rng<R: Rng + Send + ?Sized>(
        &self,
        request: &OptimizationRequest,
        rng: &mut R,
    ) -> Result<OptimizationReport, OptimizerError> {
        request.validate()?;

        info!(
            "Optimizing {} holdings (total value {:.2}, tolerance {})",
            request.holdings.len(),
            request.total_value,
            request.risk_tolerance
        );

        let series =
            load_asset_series(self.price_source.as_ref(), &request.holdings, &self.config, rng).await;
        let simulation_seed = rng.next_u64();

        let config = self.config.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || {
            let mut sim_rng = StdRng::seed_from_u64(simulation_seed);
            analyze(&config, &request, &series, &mut sim_rng)
        })
        .await
        .map_err(|e| OptimizerError::Internal(format!("optimization task failed: {}", e)))?
    }
}

/// The synchronous numeric pipeline over already-loaded series, one per
/// holding and in holding order.
pub fn analyze<R: Rng + ?Sized>(
    config: &OptimizerConfig,
    request: &OptimizationRequest,
    series: &[AssetSeries],
    rng: &mut R,
) -> Result<OptimizationReport, OptimizerError> {
    request.validate()?;
    if series.len() != request.holdings.len() {
        return Err(OptimizerError::DimensionMismatch {
            context: "asset series",
            expected: request.holdings.len(),
            actual: series.len(),
        });
    }

    let days = config.trading_days;
    let rf = config.risk_free_rate;

    let expected_returns: Vec<f64> = series.iter().map(|s| s.annual_return(days)).collect();
    let covariance = CovarianceMatrix::estimate(series, days)?;

    let frontier = FrontierBuilder::new(&expected_returns, &covariance, rf, config.frontier_points)?.build();
    let selected = select_portfolio(&frontier, request.risk_tolerance, rf)?.clone();
    check_weights(&selected.weights)?;
    let optimal_weights = frontier.weights_of(&selected);

    info!(
        "Selected allocation: return={:.2}% risk={:.2}% over {} frontier points",
        selected.expected_return * 100.0,
        selected.risk * 100.0,
        frontier.len()
    );

    let history: Vec<&[f64]> = series.iter().map(|s| s.returns.as_slice()).collect();
    let risk_metrics = calculate_risk_metrics(&selected.weights, &expected_returns, &covariance, &history, rf)?;

    let monte_carlo_results = MonteCarloSimulator::new(
        &covariance,
        &expected_returns,
        &selected.weights,
        config.scenarios,
        days,
    )?
    .simulate(request.total_value, rng);

    let current = rebalance::current_weights(&request.holdings, request.total_value);
    let rebalance_recommendations = rebalance::recommend(&current, &optimal_weights, request.total_value);

    let asset_statistics = series
        .iter()
        .zip(expected_returns.iter())
        .enumerate()
        .map(|(i, (s, &annual_return))| {
            let annual_volatility = covariance.volatility(i);
            AssetStatistics {
                symbol: s.symbol.clone(),
                current_price: s.current_price(),
                annual_return,
                annual_volatility,
                sharpe: sharpe_ratio(annual_return, annual_volatility, rf),
                source: s.source,
            }
        })
        .collect();

    let synthetic_symbols = series
        .iter()
        .filter(|s| s.is_synthetic())
        .map(|s| s.symbol.clone())
        .collect();

    Ok(OptimizationReport {
        optimal_weights,
        efficient_frontier: frontier,
        risk_metrics,
        monte_carlo_results,
        rebalance_recommendations,
        risk_tolerance: request.risk_tolerance,
        asset_statistics,
        correlation_matrix: covariance.correlation,
        synthetic_symbols,
        generated_at: chrono::Utc::now(),
    })
}

/// Rejects weights that break the fully-invested long-only contract.
fn check_weights(weights: &[f64]) -> Result<(), OptimizerError> {
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > 1e-6 {
        return Err(OptimizerError::Internal(format!("selected weights sum to {}", sum)));
    }
    if let Some(w) = weights.iter().find(|w| !(0.0..=1.0).contains(*w)) {
        return Err(OptimizerError::Internal(format!("selected weight {} outside [0, 1]", w)));
    }
    Ok(())
}
