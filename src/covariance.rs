use crate::error::OptimizerError;
use crate::returns::{AssetSeries, mean};
use serde::Serialize;

/// Annualized covariance over a fixed asset ordering, with the matching
/// correlation matrix.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CovarianceMatrix {
    pub symbols: Vec<String>,
    pub values: Vec<Vec<f64>>,
    pub correlation: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    /// Estimates pairwise covariance from each series' returns. Every pair is
    /// truncated to the shorter of the two return series (most recent
    /// observations kept) before the sample statistics are taken.
    pub fn estimate(series: &[AssetSeries], trading_days: usize) -> Result<Self, OptimizerError> {
        if series.is_empty() {
            return Err(OptimizerError::Internal(
                "cannot estimate covariance of zero assets".to_string(),
            ));
        }
        let n = series.len();
        let annualize = trading_days as f64;
        let mut values = vec![vec![0.0; n]; n];
        let mut correlation = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in i..n {
                let (a, b) = aligned_tail(&series[i].returns, &series[j].returns);
                let (cov, corr) = pair_statistics(a, b);
                let annual = if i == j { cov.max(0.0) } else { cov } * annualize;
                values[i][j] = annual;
                values[j][i] = annual;
                let corr = if i == j { 1.0 } else { corr };
                correlation[i][j] = corr;
                correlation[j][i] = corr;
            }
        }

        Ok(Self {
            symbols: series.iter().map(|s| s.symbol.clone()).collect(),
            values,
            correlation,
        })
    }

    /// Builds a matrix from annual volatilities and a correlation matrix.
    pub fn from_volatilities(
        symbols: Vec<String>,
        volatilities: &[f64],
        correlation: Vec<Vec<f64>>,
    ) -> Result<Self, OptimizerError> {
        let n = symbols.len();
        if volatilities.len() != n {
            return Err(OptimizerError::DimensionMismatch {
                context: "volatilities",
                expected: n,
                actual: volatilities.len(),
            });
        }
        if correlation.len() != n || correlation.iter().any(|row| row.len() != n) {
            return Err(OptimizerError::DimensionMismatch {
                context: "correlation matrix",
                expected: n,
                actual: correlation.len(),
            });
        }
        let values = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| correlation[i][j] * volatilities[i] * volatilities[j])
                    .collect()
            })
            .collect();
        Ok(Self { symbols, values, correlation })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn variance(&self, i: usize) -> f64 {
        self.values[i][i].max(0.0)
    }

    pub fn volatility(&self, i: usize) -> f64 {
        self.variance(i).sqrt()
    }

    /// wᵗΣw, clamped at zero against rounding. `weights` must match the
    /// matrix dimension; callers check this before building portfolios.
    pub fn portfolio_variance(&self, weights: &[f64]) -> f64 {
        debug_assert_eq!(weights.len(), self.values.len(), "weights do not match covariance dimension");
        let n = self.values.len();
        let mut var = 0.0;
        for i in 0..n {
            for j in 0..n {
                var += weights[i] * weights[j] * self.values[i][j];
            }
        }
        var.max(0.0)
    }

    pub fn portfolio_volatility(&self, weights: &[f64]) -> f64 {
        self.portfolio_variance(weights).sqrt()
    }
}

/// The last `min(len_a, len_b)` observations of both slices.
fn aligned_tail<'a>(a: &'a [f64], b: &'a [f64]) -> (&'a [f64], &'a [f64]) {
    let len = a.len().min(b.len());
    (&a[a.len() - len..], &b[b.len() - len..])
}

/// Sample covariance (N−1) and Pearson correlation of two equal-length slices.
fn pair_statistics(a: &[f64], b: &[f64]) -> (f64, f64) {
    let len = a.len();
    if len < 2 {
        return (0.0, 0.0);
    }
    let ma = mean(a);
    let mb = mean(b);
    let mut cross = 0.0;
    let mut sa = 0.0;
    let mut sb = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - ma;
        let dy = y - mb;
        cross += dx * dy;
        sa += dx * dx;
        sb += dy * dy;
    }
    let cov = cross / (len as f64 - 1.0);
    let denom = (sa * sb).sqrt();
    let corr = if denom > 1e-300 { (cross / denom).clamp(-1.0, 1.0) } else { 0.0 };
    (cov, corr)
}
