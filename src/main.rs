use anyhow::{Context, Result};
use clap::Parser;
use portfolio_optimizer::config::{self, OptimizerConfig};
use portfolio_optimizer::{
    Holding, OptimizationRequest, PortfolioOptimizer, PriceSource, RiskTolerance, StaticPriceSource,
    YahooPriceSource, report,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Portfolio optimizer: efficient frontier, risk metrics and Monte Carlo projection",
    after_help = "EXAMPLES:
    # Optimize a three-asset portfolio against live Yahoo prices
    cargo run --release -- --holdings AAPL:10:150,MSFT:5:300,BND:20:75

    # Aggressive profile, offline (synthetic history), JSON output
    cargo run --release -- --holdings NVDA:4:450,SPY:10:420 --risk-tolerance aggressive --offline --json"
)]
struct Args {
    /// Holdings as SYMBOL:QUANTITY:AVERAGE_COST, comma-separated
    #[arg(long, required = true, value_delimiter = ',', value_parser = parse_holding)]
    holdings: Vec<Holding>,

    /// Total portfolio value (default: sum of quantity × average cost)
    #[arg(long)]
    total_value: Option<f64>,

    /// conservative | moderate | aggressive | very_aggressive
    #[arg(long, default_value = "moderate")]
    risk_tolerance: String,

    /// Number of Monte Carlo scenarios (overrides PORTFOLIO_SCENARIOS)
    #[arg(long)]
    scenarios: Option<usize>,

    /// RNG seed (overrides PORTFOLIO_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Skip network access; price every holding at its average cost
    #[arg(long)]
    offline: bool,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_holding(raw: &str) -> Result<Holding, String> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    let [symbol, quantity, cost] = parts.as_slice() else {
        return Err(format!("expected SYMBOL:QUANTITY:AVERAGE_COST, got '{}'", raw));
    };
    let quantity: f64 = quantity
        .trim()
        .parse()
        .map_err(|_| format!("invalid quantity in '{}'", raw))?;
    let cost: f64 = cost
        .trim()
        .parse()
        .map_err(|_| format!("invalid average cost in '{}'", raw))?;
    Ok(Holding::new(symbol.trim().to_uppercase(), quantity, cost))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("portfolio_optimizer=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    config::init_cpu_parallelism();
    let args = Args::parse();

    let risk_tolerance: RiskTolerance = args.risk_tolerance.parse()?;
    let total_value = args
        .total_value
        .unwrap_or_else(|| args.holdings.iter().map(Holding::cost_basis).sum());

    let mut cfg = OptimizerConfig::from_env();
    if let Some(scenarios) = args.scenarios {
        cfg = cfg.with_scenarios(scenarios);
    }
    if let Some(seed) = args.seed {
        cfg = cfg.with_seed(seed);
    }

    let source: Arc<dyn PriceSource> = if args.offline {
        Arc::new(StaticPriceSource::from_holdings(&args.holdings))
    } else {
        Arc::new(YahooPriceSource::new()?)
    };
    info!("Using {} price source, seed {}", source.name(), cfg.seed);

    let request = OptimizationRequest {
        holdings: args.holdings,
        total_value,
        risk_tolerance,
    };

    let optimizer = PortfolioOptimizer::new(cfg, source);
    let result = optimizer
        .optimize(&request)
        .await
        .context("Portfolio optimization failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        report::print_report(&result);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_holding() {
        let h = parse_holding(" aapl:10:150.5 ").unwrap();
        assert_eq!(h.symbol, "AAPL");
        assert_eq!(h.quantity, 10.0);
        assert_eq!(h.average_cost, 150.5);
    }

    #[test]
    fn test_parse_holding_rejects_malformed() {
        assert!(parse_holding("AAPL:10").is_err());
        assert!(parse_holding("AAPL:ten:150").is_err());
        assert!(parse_holding("AAPL:10:150:1").is_err());
    }

    #[test]
    fn test_cli_parses_holdings_list() {
        let args = Args::try_parse_from([
            "portfolio-optimizer",
            "--holdings",
            "AAPL:10:150,MSFT:5:300",
            "--offline",
        ])
        .unwrap();
        assert_eq!(args.holdings.len(), 2);
        assert_eq!(args.holdings[1].symbol, "MSFT");
        assert!(args.offline);
        assert_eq!(args.risk_tolerance, "moderate");
    }
}
