use crate::config::{OptimizerConfig, asset_profile};
use crate::error::PriceSourceError;
use crate::returns::{AssetSeries, synthetic_series};
use crate::types::{Holding, SeriesSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Market-data collaborator consumed by the optimizer.
///
/// Implementations report failures as [`PriceSourceError`]; the optimizer
/// absorbs them per symbol and substitutes synthetic history.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<f64, PriceSourceError>;

    /// Up to `days` chronological daily closes, most recent last.
    async fn price_history(&self, symbol: &str, _days: usize) -> Result<Vec<f64>, PriceSourceError> {
        Err(PriceSourceError::Unavailable {
            symbol: symbol.to_string(),
            reason: "price history not supported by this source".to_string(),
        })
    }

    fn name(&self) -> &'static str;
}

// ──────────────────────────────────────────────────────────────────────────────
// Yahoo Finance
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    #[serde(default)]
    result: Option<Vec<YahooResult>>,
    #[serde(default)]
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
struct YahooError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Price source backed by the public Yahoo Finance chart endpoint.
pub struct YahooPriceSource {
    client: reqwest::Client,
    max_attempts: usize,
}

impl YahooPriceSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build Yahoo HTTP client")?;
        Ok(Self { client, max_attempts: 3 })
    }

    fn range_for_days(days: usize) -> &'static str {
        match days {
            0..=21 => "1mo",
            22..=126 => "6mo",
            127..=252 => "1y",
            253..=504 => "2y",
            _ => "5y",
        }
    }

    async fn fetch_closes(&self, symbol: &str, range: &str, interval: &str) -> Result<Vec<f64>> {
        let urls = [
            format!(
                "https://query1.finance.yahoo.com/v8/finance/chart/{}?interval={}&range={}",
                symbol, interval, range
            ),
            format!(
                "https://query2.finance.yahoo.com/v8/finance/chart/{}?interval={}&range={}",
                symbol, interval, range
            ),
        ];

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=self.max_attempts {
            for url in &urls {
                let response = match self.client.get(url).send().await {
                    Ok(resp) => resp,
                    Err(error) => {
                        last_error = Some(error.into());
                        continue;
                    }
                };

                match response.json::<YahooChartResponse>().await {
                    Ok(parsed) => {
                        if let Some(err) = parsed.chart.error {
                            return Err(anyhow::anyhow!(
                                "Yahoo error for {}: {} ({})",
                                symbol,
                                err.code.unwrap_or_default(),
                                err.description.unwrap_or_default()
                            ));
                        }
                        let closes: Vec<f64> = parsed
                            .chart
                            .result
                            .and_then(|r| r.into_iter().next())
                            .and_then(|r| r.indicators.quote.into_iter().next())
                            .map(|q| q.close.into_iter().flatten().filter(|c| *c > 0.0).collect())
                            .unwrap_or_default();
                        if closes.is_empty() {
                            return Err(anyhow::anyhow!("No chart result for {}", symbol));
                        }
                        return Ok(closes);
                    }
                    Err(error) => {
                        last_error = Some(error.into());
                    }
                }
            }

            if attempt < self.max_attempts {
                warn!(
                    "Yahoo fetch failed for {} (attempt {}/{}), retrying...",
                    symbol, attempt, self.max_attempts
                );
                tokio::time::sleep(Duration::from_millis(700)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Failed to fetch Yahoo chart for {}", symbol)))
            .with_context(|| format!("after {} attempts", self.max_attempts))
    }
}

fn classify(symbol: &str, error: anyhow::Error) -> PriceSourceError {
    let reason = format!("{:#}", error);
    if reason.contains("Not Found") || reason.contains("No chart result") {
        PriceSourceError::NotFound { symbol: symbol.to_string() }
    } else {
        PriceSourceError::Unavailable { symbol: symbol.to_string(), reason }
    }
}

#[async_trait]
impl PriceSource for YahooPriceSource {
    async fn current_price(&self, symbol: &str) -> Result<f64, PriceSourceError> {
        let closes = self
            .fetch_closes(symbol, "1d", "1m")
            .await
            .map_err(|e| classify(symbol, e))?;
        closes
            .last()
            .copied()
            .ok_or_else(|| PriceSourceError::NotFound { symbol: symbol.to_string() })
    }

    async fn price_history(&self, symbol: &str, days: usize) -> Result<Vec<f64>, PriceSourceError> {
        let mut closes = self
            .fetch_closes(symbol, Self::range_for_days(days), "1d")
            .await
            .map_err(|e| classify(symbol, e))?;
        if closes.len() > days {
            closes.drain(..closes.len() - days);
        }
        Ok(closes)
    }

    fn name(&self) -> &'static str {
        "yahoo"
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// In-memory source
// ──────────────────────────────────────────────────────────────────────────────

/// Fixed prices (and optional histories) keyed by upper-case symbol.
#[derive(Clone, Debug, Default)]
pub struct StaticPriceSource {
    prices: HashMap<String, f64>,
    histories: HashMap<String, Vec<f64>>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.to_uppercase(), price);
        self
    }

    /// Registers a history; its last close also becomes the current price.
    pub fn with_history(mut self, symbol: &str, closes: Vec<f64>) -> Self {
        if let Some(&last) = closes.last() {
            self.prices.insert(symbol.to_uppercase(), last);
        }
        self.histories.insert(symbol.to_uppercase(), closes);
        self
    }

    /// Prices every holding at its average cost.
    pub fn from_holdings(holdings: &[Holding]) -> Self {
        holdings
            .iter()
            .fold(Self::new(), |src, h| src.with_price(&h.symbol, h.average_cost))
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn current_price(&self, symbol: &str) -> Result<f64, PriceSourceError> {
        self.prices
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| PriceSourceError::NotFound { symbol: symbol.to_string() })
    }

    async fn price_history(&self, symbol: &str, days: usize) -> Result<Vec<f64>, PriceSourceError> {
        let closes = self.histories.get(&symbol.to_uppercase()).ok_or_else(|| {
            PriceSourceError::Unavailable {
                symbol: symbol.to_string(),
                reason: "no history registered".to_string(),
            }
        })?;
        let start = closes.len().saturating_sub(days);
        Ok(closes[start..].to_vec())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Fan-out loader
// ──────────────────────────────────────────────────────────────────────────────

/// Loads one [`AssetSeries`] per holding, in holding order.
///
/// Symbols are fetched concurrently (at most `config.fetch_concurrency` in
/// flight, each bounded by `config.fetch_timeout`). Any symbol whose history
/// cannot be fetched gets a synthetic series instead; this never fails.
/// Synthetic draws use one sub-stream seed per holding taken from `rng`
/// before any request is issued, so completion order does not matter.
pub async fn load_asset_series<R: Rng + Send + ?Sized>(
    source: &dyn PriceSource,
    holdings: &[Holding],
    config: &OptimizerConfig,
    rng: &mut R,
) -> Vec<AssetSeries> {
    let seeds: Vec<u64> = holdings.iter().map(|_| rng.next_u64()).collect();

    info!(
        "Fetching market data for {} symbols from {} (concurrency={}, timeout={:?})",
        holdings.len(),
        source.name(),
        config.fetch_concurrency,
        config.fetch_timeout
    );

    let mut loaded: Vec<(usize, AssetSeries)> = stream::iter(holdings.iter().zip(seeds).enumerate())
        .map(|(idx, (holding, seed))| async move {
            (idx, load_one(source, holding, config, seed).await)
        })
        .buffer_unordered(config.fetch_concurrency.max(1))
        .collect()
        .await;

    loaded.sort_by_key(|(idx, _)| *idx);
    loaded.into_iter().map(|(_, series)| series).collect()
}

async fn load_one(
    source: &dyn PriceSource,
    holding: &Holding,
    config: &OptimizerConfig,
    seed: u64,
) -> AssetSeries {
    let symbol = holding.symbol.trim().to_uppercase();
    // One budget per symbol, shared by the history and price requests.
    let deadline = Instant::now() + config.fetch_timeout;

    match with_deadline(&symbol, deadline, source.price_history(&symbol, config.history_length)).await {
        Ok(closes) => match AssetSeries::from_prices(symbol.clone(), closes, SeriesSource::History) {
            Ok(series) => {
                debug!("{}: using {} days of real history", symbol, series.prices.len());
                return series;
            }
            Err(e) => warn!("{}: unusable history ({}); falling back to synthetic series", symbol, e),
        },
        Err(e) => warn!("{}: {}; falling back to synthetic series", symbol, e),
    }

    let current_price = match with_deadline(&symbol, deadline, source.current_price(&symbol)).await {
        Ok(price) if price.is_finite() && price > 0.0 => price,
        Ok(price) => {
            warn!("{}: invalid current price {}; anchoring at average cost", symbol, price);
            holding.average_cost
        }
        Err(e) => {
            warn!("{}: {}; anchoring synthetic series at average cost", symbol, e);
            holding.average_cost
        }
    };

    let mut rng = StdRng::seed_from_u64(seed);
    synthetic_series(
        &symbol,
        current_price,
        asset_profile(&symbol),
        config.history_length,
        &mut rng,
    )
}

async fn with_deadline<T, F>(symbol: &str, deadline: Instant, fut: F) -> Result<T, PriceSourceError>
where
    F: std::future::Future<Output = Result<T, PriceSourceError>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(PriceSourceError::Unavailable {
            symbol: symbol.to_string(),
            reason: "fetch deadline exceeded".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every request; counts calls.
    struct DownSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceSource for DownSource {
        async fn current_price(&self, symbol: &str) -> Result<f64, PriceSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PriceSourceError::Unavailable {
                symbol: symbol.to_string(),
                reason: "offline".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    /// Never answers for one symbol.
    struct HangingSource {
        inner: StaticPriceSource,
        hang_on: &'static str,
    }

    #[async_trait]
    impl PriceSource for HangingSource {
        async fn current_price(&self, symbol: &str) -> Result<f64, PriceSourceError> {
            if symbol == self.hang_on {
                std::future::pending::<()>().await;
            }
            self.inner.current_price(symbol).await
        }

        async fn price_history(&self, symbol: &str, days: usize) -> Result<Vec<f64>, PriceSourceError> {
            if symbol == self.hang_on {
                std::future::pending::<()>().await;
            }
            self.inner.price_history(symbol, days).await
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    fn fast_config() -> OptimizerConfig {
        OptimizerConfig {
            fetch_timeout: Duration::from_millis(50),
            history_length: 30,
            ..OptimizerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_real_history_is_preferred() {
        let source = StaticPriceSource::new()
            .with_history("AAPL", vec![100.0, 101.0, 99.0, 102.0])
            .with_price("MSFT", 300.0);
        let holdings = vec![Holding::new("AAPL", 1.0, 90.0), Holding::new("msft", 1.0, 250.0)];
        let mut rng = StdRng::seed_from_u64(1);

        let series = load_asset_series(&source, &holdings, &fast_config(), &mut rng).await;

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].symbol, "AAPL");
        assert_eq!(series[0].source, SeriesSource::History);
        assert_eq!(series[0].prices, vec![100.0, 101.0, 99.0, 102.0]);
        assert_eq!(series[1].symbol, "MSFT");
        assert_eq!(series[1].source, SeriesSource::Synthetic);
        assert_eq!(series[1].prices.len(), 30);
        assert_eq!(series[1].current_price(), 300.0);
    }

    #[tokio::test]
    async fn test_failed_source_falls_back_to_average_cost() {
        let source = DownSource { calls: AtomicUsize::new(0) };
        let holdings = vec![Holding::new("AAA", 2.0, 40.0), Holding::new("BBB", 1.0, 80.0)];
        let mut rng = StdRng::seed_from_u64(2);

        let series = load_asset_series(&source, &holdings, &fast_config(), &mut rng).await;

        assert_eq!(series.len(), 2);
        assert!(series.iter().all(|s| s.is_synthetic()));
        assert_eq!(series[0].current_price(), 40.0);
        assert_eq!(series[1].current_price(), 80.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_symbol_does_not_block_others() {
        let source = HangingSource {
            inner: StaticPriceSource::new().with_history("FAST", vec![10.0, 11.0, 12.0]),
            hang_on: "SLOW",
        };
        let holdings = vec![Holding::new("SLOW", 1.0, 5.0), Holding::new("FAST", 1.0, 10.0)];
        let mut rng = StdRng::seed_from_u64(3);

        let series = load_asset_series(&source, &holdings, &fast_config(), &mut rng).await;

        assert_eq!(series[0].symbol, "SLOW");
        assert!(series[0].is_synthetic());
        assert_eq!(series[0].current_price(), 5.0);
        assert_eq!(series[1].source, SeriesSource::History);
    }

    #[tokio::test]
    async fn test_hanging_symbol_shares_one_deadline() {
        let source = HangingSource {
            inner: StaticPriceSource::new(),
            hang_on: "SLOW",
        };
        let holdings = vec![Holding::new("SLOW", 1.0, 5.0)];
        let config = OptimizerConfig {
            fetch_timeout: Duration::from_millis(200),
            ..fast_config()
        };
        let started = std::time::Instant::now();

        let series = load_asset_series(&source, &holdings, &config, &mut StdRng::seed_from_u64(4)).await;

        let elapsed = started.elapsed();
        assert!(series[0].is_synthetic());
        assert!(elapsed >= Duration::from_millis(200));
        // Both calls hang; a separate timeout each would take ~400ms.
        assert!(elapsed < Duration::from_millis(350), "fallback took {:?}", elapsed);
    }

    #[test]
    fn test_yahoo_client_builds() {
        let source = YahooPriceSource::new().unwrap();
        assert_eq!(source.name(), "yahoo");
        assert_eq!(source.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_synthetic_fallback_is_seed_stable() {
        let source = StaticPriceSource::new().with_price("XYZ", 42.0);
        let holdings = vec![Holding::new("XYZ", 1.0, 40.0)];
        let a = load_asset_series(&source, &holdings, &fast_config(), &mut StdRng::seed_from_u64(9)).await;
        let b = load_asset_series(&source, &holdings, &fast_config(), &mut StdRng::seed_from_u64(9)).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_static_source_history_window() {
        let source = StaticPriceSource::new().with_history("ABC", vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(source.price_history("abc", 3).await.unwrap(), vec![3.0, 4.0, 5.0]);
        assert_eq!(source.current_price("ABC").await.unwrap(), 5.0);
        assert!(matches!(
            source.current_price("NOPE").await,
            Err(PriceSourceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_yahoo_range_mapping() {
        assert_eq!(YahooPriceSource::range_for_days(10), "1mo");
        assert_eq!(YahooPriceSource::range_for_days(252), "1y");
        assert_eq!(YahooPriceSource::range_for_days(400), "2y");
        assert_eq!(YahooPriceSource::range_for_days(2000), "5y");
    }

    #[test]
    fn test_yahoo_payload_parsing() {
        let json = r#"{"chart":{"result":[{"indicators":{"quote":[{"close":[1.0,null,2.5]}]}}],"error":null}}"#;
        let parsed: YahooChartResponse = serde_json::from_str(json).unwrap();
        let closes: Vec<f64> = parsed.chart.result.unwrap()[0].indicators.quote[0]
            .close
            .iter()
            .flatten()
            .copied()
            .collect();
        assert_eq!(closes, vec![1.0, 2.5]);

        let missing = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let parsed: YahooChartResponse = serde_json::from_str(missing).unwrap();
        assert!(parsed.chart.result.is_none());
        assert_eq!(parsed.chart.error.unwrap().code.as_deref(), Some("Not Found"));
    }
}
