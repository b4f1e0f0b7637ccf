//! Price series and return modelling.
//!
//! Real price history is preferred; when it is missing, a synthetic year of
//! closes is generated backward from the current price under Geometric
//! Brownian Motion so the rest of the pipeline always has data to work with.

use crate::config::{AssetProfile, TRADING_DAYS};
use crate::error::OptimizerError;
use crate::types::SeriesSource;
use rand::Rng;

/// Chronological closes for one symbol plus their simple returns.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetSeries {
    pub symbol: String,
    pub prices: Vec<f64>,
    pub returns: Vec<f64>,
    pub source: SeriesSource,
}

impl AssetSeries {
    pub fn from_prices(
        symbol: impl Into<String>,
        prices: Vec<f64>,
        source: SeriesSource,
    ) -> Result<Self, OptimizerError> {
        let symbol = symbol.into();
        if prices.len() < 2 {
            return Err(OptimizerError::invalid(format!(
                "{}: price series needs at least 2 points, got {}",
                symbol,
                prices.len()
            )));
        }
        if prices.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return Err(OptimizerError::invalid(format!(
                "{}: price series contains non-positive or non-finite values",
                symbol
            )));
        }
        let returns = simple_returns(&prices);
        Ok(Self { symbol, prices, returns, source })
    }

    pub fn current_price(&self) -> f64 {
        // from_prices guarantees at least two points
        self.prices[self.prices.len() - 1]
    }

    /// Mean daily simple return scaled to a year of `trading_days`.
    pub fn annual_return(&self, trading_days: usize) -> f64 {
        mean(&self.returns) * trading_days as f64
    }

    /// Sample standard deviation of daily returns scaled to a year.
    pub fn annual_volatility(&self, trading_days: usize) -> f64 {
        sample_variance(&self.returns).sqrt() * (trading_days as f64).sqrt()
    }

    pub fn is_synthetic(&self) -> bool {
        self.source == SeriesSource::Synthetic
    }
}

pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with the N−1 denominator; 0 for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n as f64 - 1.0)
}

/// One standard-normal draw via the Box–Muller transform.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // 1 - U keeps u1 in (0, 1] so ln() stays finite
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Fills `out` with independent standard-normal draws.
pub fn fill_standard_normals<R: Rng + ?Sized>(rng: &mut R, out: &mut [f64]) {
    for z in out.iter_mut() {
        *z = standard_normal(rng);
    }
}

/// Generates `length` closes ending exactly at `current_price`, walking
/// backward one trading day at a time under GBM with the given profile.
pub fn synthetic_prices<R: Rng + ?Sized>(
    current_price: f64,
    profile: AssetProfile,
    length: usize,
    rng: &mut R,
) -> Vec<f64> {
    let length = length.max(2);
    let dt = 1.0 / TRADING_DAYS as f64;
    let drift = (profile.drift - 0.5 * profile.volatility * profile.volatility) * dt;
    let diffusion = profile.volatility * dt.sqrt();

    let mut prices = vec![0.0; length];
    prices[length - 1] = current_price;
    for t in (1..length).rev() {
        let step = drift + diffusion * standard_normal(rng);
        prices[t - 1] = prices[t] / step.exp();
    }
    prices
}

/// Synthetic fallback series for `symbol`. Never fails for a positive price.
pub fn synthetic_series<R: Rng + ?Sized>(
    symbol: &str,
    current_price: f64,
    profile: AssetProfile,
    length: usize,
    rng: &mut R,
) -> AssetSeries {
    let prices = synthetic_prices(current_price, profile, length, rng);
    let returns = simple_returns(&prices);
    AssetSeries {
        symbol: symbol.to_string(),
        prices,
        returns,
        source: SeriesSource::Synthetic,
    }
}
