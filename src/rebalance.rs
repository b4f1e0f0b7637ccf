use crate::types::{Action, Holding, RebalanceAction, Weights};

/// Weight changes at or below this fraction are not worth trading.
pub const REBALANCE_THRESHOLD: f64 = 0.01;

/// Current allocation by cost basis: `quantity × averageCost / totalValue`.
pub fn current_weights(holdings: &[Holding], total_value: f64) -> Weights {
    let mut weights = Weights::new();
    for h in holdings {
        *weights.entry(h.symbol.trim().to_uppercase()).or_insert(0.0) += h.cost_basis() / total_value;
    }
    weights
}

/// Buy/sell actions that move `current` to `target`, largest change first.
/// Symbols missing from either side count as weight 0 there.
pub fn recommend(current: &Weights, target: &Weights, total_value: f64) -> Vec<RebalanceAction> {
    let mut symbols: Vec<&String> = current.keys().chain(target.keys()).collect();
    symbols.sort();
    symbols.dedup();

    let mut actions: Vec<RebalanceAction> = symbols
        .into_iter()
        .filter_map(|symbol| {
            let current_weight = current.get(symbol).copied().unwrap_or(0.0);
            let target_weight = target.get(symbol).copied().unwrap_or(0.0);
            let delta = target_weight - current_weight;
            if delta.abs() <= REBALANCE_THRESHOLD {
                return None;
            }
            Some(RebalanceAction {
                symbol: symbol.clone(),
                current_weight,
                target_weight,
                action: if delta > 0.0 { Action::Buy } else { Action::Sell },
                amount: delta.abs() * total_value,
            })
        })
        .collect();

    actions.sort_by(|a, b| {
        let da = (a.target_weight - a.current_weight).abs();
        let db = (b.target_weight - b.current_weight).abs();
        db.total_cmp(&da)
    });
    actions
}
