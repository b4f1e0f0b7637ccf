use crate::types::OptimizationReport;
use std::fmt::Write;

const RULE: &str = "╠════════════════════════════════════════════════════════════════╣";

/// Renders the boxed terminal summary of an optimization run.
pub fn render(report: &OptimizationReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, report);
    out
}

pub fn print_report(report: &OptimizationReport) {
    print!("{}", render(report));
}

fn write_report(out: &mut String, report: &OptimizationReport) -> std::fmt::Result {
    let risk = report.risk_metrics.report();
    let mc = &report.monte_carlo_results;

    writeln!(out, "\n╔════════════════════════════════════════════════════════════════╗")?;
    writeln!(out, "║  Portfolio Optimization ({:<16})                     ║", report.risk_tolerance.as_str())?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "║  Expected Annual Return : {:>+8.2}%                            ║", risk.expected_return_pct)?;
    writeln!(out, "║  Annual Volatility      : {:>8.2}%                            ║", risk.volatility_pct)?;
    writeln!(out, "║  Sharpe Ratio           : {:>8.2}                             ║", risk.sharpe_ratio)?;
    writeln!(out, "║  Max Drawdown           : {:>8.2}%                            ║", risk.max_drawdown_pct)?;
    writeln!(out, "║  VaR (95%)              : {:>+8.2}%                            ║", risk.value_at_risk_pct)?;
    writeln!(out, "║  CVaR (95%)             : {:>+8.2}%                            ║", risk.conditional_value_at_risk_pct)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "║  Symbol     Target   E[Ann.Ret]  Ann.Vol  Sharpe      Price    ║")?;
    writeln!(out, "{}", RULE)?;

    let mut sorted: Vec<(&String, &f64)> = report.optimal_weights.iter().collect();
    sorted.sort_by(|a, b| b.1.total_cmp(a.1));

    for (symbol, weight) in sorted {
        if let Some(stats) = report.asset_statistics.iter().find(|s| &s.symbol == symbol) {
            let marker = if report.synthetic_symbols.contains(symbol) { "*" } else { " " };
            writeln!(
                out,
                "║  {:<8}{} {:>7.2}%   {:>+7.2}%  {:>6.2}%  {:>6.2}  ${:>9.2}  ║",
                symbol,
                marker,
                weight * 100.0,
                stats.annual_return * 100.0,
                stats.annual_volatility * 100.0,
                stats.sharpe,
                stats.current_price
            )?;
        }
    }

    writeln!(out, "{}", RULE)?;
    writeln!(
        out,
        "║  Monte Carlo ({:>5} scenarios) from ${:<14.2}              ║",
        mc.scenarios, mc.initial_value
    )?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "║  Mean          : ${:>14.2}                                ║", mc.mean)?;
    writeln!(out, "║  5th pct       : ${:>14.2}                                ║", mc.percentile_5)?;
    writeln!(out, "║  Median        : ${:>14.2}                                ║", mc.percentile_50)?;
    writeln!(out, "║  95th pct      : ${:>14.2}                                ║", mc.percentile_95)?;
    writeln!(out, "║  Success rate  : {:>14.2}%                                ║", mc.success_rate * 100.0)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "║                      Rebalancing Actions                       ║")?;
    writeln!(out, "{}", RULE)?;

    if report.rebalance_recommendations.is_empty() {
        writeln!(out, "║  Portfolio is within 1% of target; no trades needed.           ║")?;
    }
    for action in &report.rebalance_recommendations {
        writeln!(
            out,
            "║  {:<4} {:<8} {:>6.2}% → {:>6.2}%   ${:>12.2}                ║",
            action.action.to_string(),
            action.symbol,
            action.current_weight * 100.0,
            action.target_weight * 100.0,
            action.amount
        )?;
    }

    writeln!(out, "╚════════════════════════════════════════════════════════════════╝")?;

    if !report.synthetic_symbols.is_empty() {
        writeln!(
            out,
            "  * synthetic history (no market data): {}",
            report.synthetic_symbols.join(", ")
        )?;
    }

    Ok(())
}
