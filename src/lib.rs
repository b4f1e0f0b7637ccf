//! Mean-variance portfolio optimization with Monte Carlo projection.
//!
//! [`PortfolioOptimizer`] takes a set of holdings and a risk tolerance, loads
//! price history through a [`PriceSource`] (falling back to synthetic GBM
//! history per symbol), and returns an [`OptimizationReport`] with the
//! efficient frontier, the selected allocation, its risk metrics, simulated
//! outcomes and the trades needed to get there.

pub mod config;
pub mod covariance;
pub mod data;
pub mod error;
pub mod frontier;
pub mod monte_carlo;
pub mod optimizer;
pub mod rebalance;
pub mod report;
pub mod returns;
pub mod risk;
pub mod types;

pub use config::OptimizerConfig;
pub use data::{PriceSource, StaticPriceSource, YahooPriceSource};
pub use error::{OptimizerError, PriceSourceError};
pub use optimizer::PortfolioOptimizer;
pub use types::{
    Action, EfficientFrontier, FrontierPoint, Holding, OptimizationReport, OptimizationRequest,
    RebalanceAction, RiskMetrics, RiskTolerance, SimulationResult,
};
