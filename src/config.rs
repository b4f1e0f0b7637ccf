use rayon::ThreadPoolBuilder;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

/// Annual trading days used for annualization and the simulation horizon.
pub const TRADING_DAYS: usize = 252;

/// Risk-free annual rate (approx. T-bill yield) used in Sharpe calculations.
pub const RISK_FREE_RATE: f64 = 0.02;

/// Number of Monte Carlo scenarios per optimization.
pub const DEFAULT_SCENARIOS: usize = 1000;

/// Number of target returns swept when building the efficient frontier.
pub const FRONTIER_POINTS: usize = 100;

/// Length of a synthetic price history (one trading year of closes).
pub const HISTORY_LENGTH: usize = 252;

/// Maximum number of symbols fetched concurrently from the price source.
pub const FETCH_CONCURRENCY: usize = 4;

/// Per-symbol deadline for the price source.
pub const FETCH_TIMEOUT_SECS: u64 = 10;

/// Seed used when the caller does not pin one.
pub const DEFAULT_SEED: u64 = 42;

/// Volatility/drift assumed for symbols missing from [`ASSET_PROFILES`].
pub const DEFAULT_PROFILE: AssetProfile = AssetProfile {
    volatility: 0.30,
    drift: 0.10,
};

/// Annualized volatility and drift assumptions for synthetic history.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AssetProfile {
    pub volatility: f64,
    pub drift: f64,
}

pub const ASSET_PROFILES: &[(&str, AssetProfile)] = &[
    ("AAPL", AssetProfile { volatility: 0.25, drift: 0.12 }),
    ("MSFT", AssetProfile { volatility: 0.22, drift: 0.11 }),
    ("GOOGL", AssetProfile { volatility: 0.27, drift: 0.10 }),
    ("AMZN", AssetProfile { volatility: 0.30, drift: 0.13 }),
    ("META", AssetProfile { volatility: 0.35, drift: 0.12 }),
    ("NVDA", AssetProfile { volatility: 0.45, drift: 0.20 }),
    ("TSLA", AssetProfile { volatility: 0.55, drift: 0.15 }),
    ("SPY", AssetProfile { volatility: 0.16, drift: 0.08 }),
    ("QQQ", AssetProfile { volatility: 0.20, drift: 0.10 }),
    ("VTI", AssetProfile { volatility: 0.17, drift: 0.08 }),
    ("BND", AssetProfile { volatility: 0.05, drift: 0.03 }),
    ("TLT", AssetProfile { volatility: 0.15, drift: 0.03 }),
    ("GLD", AssetProfile { volatility: 0.15, drift: 0.05 }),
    ("BTC-USD", AssetProfile { volatility: 0.65, drift: 0.25 }),
];

/// Looks up the volatility/drift assumption for `symbol` (case-insensitive).
pub fn asset_profile(symbol: &str) -> AssetProfile {
    ASSET_PROFILES
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
        .map(|(_, p)| *p)
        .unwrap_or(DEFAULT_PROFILE)
}

/// Immutable engine settings, fixed at construction of the optimizer.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
    pub scenarios: usize,
    pub trading_days: usize,
    pub risk_free_rate: f64,
    pub frontier_points: usize,
    pub history_length: usize,
    pub fetch_concurrency: usize,
    pub fetch_timeout: Duration,
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            scenarios: DEFAULT_SCENARIOS,
            trading_days: TRADING_DAYS,
            risk_free_rate: RISK_FREE_RATE,
            frontier_points: FRONTIER_POINTS,
            history_length: HISTORY_LENGTH,
            fetch_concurrency: FETCH_CONCURRENCY,
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            seed: DEFAULT_SEED,
        }
    }
}

impl OptimizerConfig {
    /// Builds a config from `PORTFOLIO_*` environment variables, falling back
    /// to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            scenarios: env_parse("PORTFOLIO_SCENARIOS")
                .map(|v: usize| v.clamp(1, 1_000_000))
                .unwrap_or(defaults.scenarios),
            trading_days: env_parse("PORTFOLIO_TRADING_DAYS")
                .map(|v: usize| v.clamp(1, 366))
                .unwrap_or(defaults.trading_days),
            risk_free_rate: env_parse("PORTFOLIO_RISK_FREE_RATE")
                .map(|v: f64| v.clamp(-0.05, 0.25))
                .unwrap_or(defaults.risk_free_rate),
            frontier_points: env_parse("PORTFOLIO_FRONTIER_POINTS")
                .map(|v: usize| v.clamp(2, 10_000))
                .unwrap_or(defaults.frontier_points),
            history_length: env_parse("PORTFOLIO_HISTORY_LENGTH")
                .map(|v: usize| v.clamp(2, 5_000))
                .unwrap_or(defaults.history_length),
            fetch_concurrency: env_parse("PORTFOLIO_FETCH_CONCURRENCY")
                .map(|v: usize| v.clamp(1, 64))
                .unwrap_or(defaults.fetch_concurrency),
            fetch_timeout: env_parse("PORTFOLIO_FETCH_TIMEOUT_SECS")
                .map(|v: u64| Duration::from_secs(v.clamp(1, 300)))
                .unwrap_or(defaults.fetch_timeout),
            seed: env_parse("PORTFOLIO_SEED").unwrap_or(defaults.seed),
        }
    }

    pub fn with_scenarios(mut self, scenarios: usize) -> Self {
        self.scenarios = scenarios.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={} (not a valid value); using default", key, trimmed);
            None
        }
    }
}

pub fn init_cpu_parallelism() {
    RAYON_INIT.get_or_init(|| {
        let num_threads = num_cpus::get().max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!(
                "Initialized Rayon thread pool with {} threads (all logical CPU cores)",
                num_threads
            ),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_lookup_is_case_insensitive() {
        assert_eq!(asset_profile("aapl"), asset_profile("AAPL"));
        assert_eq!(asset_profile("AAPL").volatility, 0.25);
    }

    #[test]
    fn test_unknown_symbol_uses_default_profile() {
        assert_eq!(asset_profile("ZZZZ"), DEFAULT_PROFILE);
    }

    #[test]
    fn test_builder_overrides() {
        let cfg = OptimizerConfig::default().with_scenarios(0).with_seed(7);
        assert_eq!(cfg.scenarios, 1);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.trading_days, TRADING_DAYS);
    }
}
