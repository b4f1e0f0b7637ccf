use crate::error::OptimizerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Symbol → fraction of the portfolio.
pub type Weights = BTreeMap<String, f64>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
    pub average_cost: f64,
}

impl Holding {
    pub fn new(symbol: impl Into<String>, quantity: f64, average_cost: f64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            average_cost,
        }
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.average_cost
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
    VeryAggressive,
}

impl RiskTolerance {
    /// Annualized volatility the selector aims for.
    pub fn target_volatility(self) -> f64 {
        match self {
            Self::Conservative => 0.12,
            Self::Moderate => 0.16,
            Self::Aggressive => 0.22,
            Self::VeryAggressive => 0.30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
            Self::VeryAggressive => "very_aggressive",
        }
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTolerance {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "conservative" => Ok(Self::Conservative),
            "moderate" => Ok(Self::Moderate),
            "aggressive" => Ok(Self::Aggressive),
            "very_aggressive" => Ok(Self::VeryAggressive),
            other => Err(OptimizerError::invalid(format!(
                "unknown risk tolerance '{}' (expected conservative | moderate | aggressive | very_aggressive)",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    pub holdings: Vec<Holding>,
    pub total_value: f64,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
}

impl OptimizationRequest {
    /// Rejects requests the engine cannot start on. Runs before any fetch or
    /// computation.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.holdings.is_empty() {
            return Err(OptimizerError::invalid("holdings must not be empty"));
        }
        if !(self.total_value.is_finite() && self.total_value > 0.0) {
            return Err(OptimizerError::invalid(format!(
                "totalValue must be positive, got {}",
                self.total_value
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for h in &self.holdings {
            if h.symbol.trim().is_empty() {
                return Err(OptimizerError::invalid("holding symbol must not be empty"));
            }
            if !(h.quantity.is_finite() && h.quantity > 0.0) {
                return Err(OptimizerError::invalid(format!(
                    "quantity for {} must be positive, got {}",
                    h.symbol, h.quantity
                )));
            }
            if !(h.average_cost.is_finite() && h.average_cost > 0.0) {
                return Err(OptimizerError::invalid(format!(
                    "averageCost for {} must be positive, got {}",
                    h.symbol, h.average_cost
                )));
            }
            if !seen.insert(h.symbol.trim().to_uppercase()) {
                return Err(OptimizerError::invalid(format!(
                    "duplicate holding for {}",
                    h.symbol
                )));
            }
        }
        Ok(())
    }

    pub fn symbols(&self) -> Vec<String> {
        self.holdings
            .iter()
            .map(|h| h.symbol.trim().to_uppercase())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierPoint {
    pub risk: f64,
    #[serde(rename = "return")]
    pub expected_return: f64,
    /// Indexed by [`EfficientFrontier::symbols`].
    pub weights: Vec<f64>,
}

impl FrontierPoint {
    pub fn sharpe(&self, risk_free_rate: f64) -> f64 {
        if self.risk > 1e-12 {
            (self.expected_return - risk_free_rate) / self.risk
        } else {
            0.0
        }
    }
}

/// Frontier points ascending by risk, over a fixed asset ordering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficientFrontier {
    pub symbols: Vec<String>,
    pub points: Vec<FrontierPoint>,
}

impl EfficientFrontier {
    pub fn weights_of(&self, point: &FrontierPoint) -> Weights {
        self.symbols
            .iter()
            .cloned()
            .zip(point.weights.iter().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub scenarios: usize,
    pub initial_value: f64,
    /// Terminal portfolio values, ascending.
    pub final_values: Vec<f64>,
    pub mean: f64,
    pub success_rate: f64,
    pub percentile_5: f64,
    pub percentile_25: f64,
    pub percentile_50: f64,
    pub percentile_75: f64,
    pub percentile_95: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub value_at_risk: f64,
    pub conditional_value_at_risk: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("BUY"),
            Self::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceAction {
    pub symbol: String,
    pub current_weight: f64,
    pub target_weight: f64,
    pub action: Action,
    pub amount: f64,
}

/// Where an asset's price history came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSource {
    History,
    Synthetic,
}

/// Per-asset annualized statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatistics {
    pub symbol: String,
    pub current_price: f64,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub sharpe: f64,
    pub source: SeriesSource,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub optimal_weights: Weights,
    pub efficient_frontier: EfficientFrontier,
    pub risk_metrics: RiskMetrics,
    pub monte_carlo_results: SimulationResult,
    pub rebalance_recommendations: Vec<RebalanceAction>,
    pub risk_tolerance: RiskTolerance,
    pub asset_statistics: Vec<AssetStatistics>,
    pub correlation_matrix: Vec<Vec<f64>>,
    pub synthetic_symbols: Vec<String>,
    pub generated_at: DateTime<Utc>,
}
