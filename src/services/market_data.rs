//! Rate-limited, cached, retrying wrapper over a synchronous vendor SDK.
//! Ground truth: `original_source/services/market_data.py`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::cache::{build_key, ServiceCache};
use crate::config::MarketDataConfig;
use crate::domain::{AssetType, MarketCapTier, PriceBar, Quote};
use crate::error::DomainError;
use crate::ports::QuoteProvider;
use crate::rate_limiter::RateLimiter;

const SOURCE: &str = "yfinance";
pub const MIN_OHLCV_ROWS: usize = 100;
pub const DEFAULT_PERIOD: &str = "1y";

/// Minimal vendor-info snapshot; the richer `domain::TickerInfo` (with
/// universe bookkeeping fields) is assembled by the universe service.
#[derive(Debug, Clone)]
pub struct TickerInfoSnapshot {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub market_cap_tier: MarketCapTier,
    pub asset_type: AssetType,
}

fn classify_market_cap(market_cap: Option<f64>) -> MarketCapTier {
    match market_cap {
        Some(cap) if cap >= 200e9 => MarketCapTier::Mega,
        Some(cap) if cap >= 10e9 => MarketCapTier::Large,
        Some(cap) if cap >= 2e9 => MarketCapTier::Mid,
        Some(cap) if cap >= 300e6 => MarketCapTier::Small,
        Some(_) => MarketCapTier::Micro,
        None => MarketCapTier::Unknown,
    }
}

pub struct MarketDataService {
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<ServiceCache>,
    provider: Arc<dyn QuoteProvider>,
    config: MarketDataConfig,
}

impl MarketDataService {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ServiceCache>,
        provider: Arc<dyn QuoteProvider>,
        config: MarketDataConfig,
    ) -> Self {
        Self {
            rate_limiter,
            cache,
            provider,
            config,
        }
    }

    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.timeout_seconds)
    }

    pub async fn fetch_ohlcv(
        &self,
        symbol: &str,
        period: &str,
    ) -> Result<Vec<PriceBar>, DomainError> {
        let cache_key = build_key(SOURCE, "ohlcv", &format!("{symbol}:{period}"));
        if let Some(cached) = self.cache.get_json::<Vec<SerializedBar>>(&cache_key).await {
            return Ok(cached.into_iter().filter_map(|b| b.into_price_bar().ok()).collect());
        }

        let provider = self.provider.clone();
        let symbol_owned = symbol.to_string();
        let period_owned = period.to_string();
        let timeout = self.timeout();
        let raw_bars = self
            .rate_limiter
            .execute(symbol, SOURCE, || {
                let provider = provider.clone();
                let symbol_owned = symbol_owned.clone();
                let period_owned = period_owned.clone();
                async move {
                    match tokio::time::timeout(timeout, provider.history(&symbol_owned, &period_owned)).await {
                        Ok(result) => result,
                        Err(_) => Err(DomainError::DataSourceUnavailable {
                            ticker: symbol_owned.clone(),
                            source_name: SOURCE.to_string(),
                            detail: "history() timed out".to_string(),
                            cause: None,
                        }),
                    }
                }
            })
            .await?;

        if raw_bars.is_empty() {
            return Err(DomainError::TickerNotFound {
                ticker: symbol.to_string(),
                source_name: SOURCE.to_string(),
            });
        }
        if raw_bars.len() < MIN_OHLCV_ROWS {
            return Err(DomainError::InsufficientData {
                ticker: symbol.to_string(),
                source_name: SOURCE.to_string(),
                detail: format!("got {} rows, need >= {MIN_OHLCV_ROWS}", raw_bars.len()),
            });
        }

        let mut bars = Vec::with_capacity(raw_bars.len());
        for raw in &raw_bars {
            let bar = PriceBar::new(
                raw.date,
                decimal_from_f64(raw.open)?,
                decimal_from_f64(raw.high)?,
                decimal_from_f64(raw.low)?,
                decimal_from_f64(raw.close)?,
                raw.volume,
            )
            .map_err(|e| DomainError::DataSourceUnavailable {
                ticker: symbol.to_string(),
                source_name: SOURCE.to_string(),
                detail: format!("malformed bar for {}: {}", raw.date, e),
                cause: None,
            })?;
            bars.push(bar);
        }

        let serialized: Vec<SerializedBar> = bars.iter().map(SerializedBar::from_price_bar).collect();
        let ttl = crate::cache::get_ttl("ohlcv", Utc::now());
        if let Err(e) = self.cache.set_json(&cache_key, &serialized, ttl).await {
            warn!(symbol, "failed to cache OHLCV: {e}");
        }

        Ok(bars)
    }

    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote, DomainError> {
        let provider = self.provider.clone();
        let symbol_owned = symbol.to_string();
        let raw = self
            .rate_limiter
            .execute(symbol, SOURCE, || {
                let provider = provider.clone();
                let symbol_owned = symbol_owned.clone();
                async move { provider.quote(&symbol_owned).await }
            })
            .await?;

        Quote::new(
            symbol,
            decimal_from_f64(raw.bid)?,
            decimal_from_f64(raw.ask)?,
            decimal_from_f64(raw.last)?,
            raw.volume,
            Utc::now(),
        )
        .map_err(|e| DomainError::DataSourceUnavailable {
            ticker: symbol.to_string(),
            source_name: SOURCE.to_string(),
            detail: e.to_string(),
            cause: None,
        })
    }

    pub async fn fetch_ticker_info(&self, symbol: &str) -> Result<TickerInfoSnapshot, DomainError> {
        let provider = self.provider.clone();
        let symbol_owned = symbol.to_string();
        let info = self
            .rate_limiter
            .execute(symbol, SOURCE, || {
                let provider = provider.clone();
                let symbol_owned = symbol_owned.clone();
                async move { provider.info(&symbol_owned).await }
            })
            .await?;

        if info.quote_type.is_none() && info.price.is_none() {
            return Err(DomainError::TickerNotFound {
                ticker: symbol.to_string(),
                source_name: SOURCE.to_string(),
            });
        }

        let asset_type = if info.quote_type.as_deref() == Some("ETF") {
            AssetType::Etf
        } else {
            AssetType::Equity
        };

        Ok(TickerInfoSnapshot {
            symbol: symbol.to_string(),
            name: info.long_name.unwrap_or_default(),
            sector: info.sector.unwrap_or_default(),
            market_cap_tier: classify_market_cap(info.market_cap),
            asset_type,
        })
    }

    /// Fans out concurrently; every symbol ends up as either a success or
    /// an error in the result map. One failure never fails the batch.
    pub async fn fetch_batch_ohlcv(
        &self,
        symbols: &[String],
    ) -> HashMap<String, Result<Vec<PriceBar>, DomainError>> {
        let period = self.config.period.clone();
        let futures = symbols.iter().map(|symbol| {
            let symbol = symbol.clone();
            let period = period.clone();
            async move {
                let result = self.fetch_ohlcv(&symbol, &period).await;
                (symbol, result)
            }
        });

        let results = futures::future::join_all(futures).await;

        let mut ok_count = 0usize;
        let mut err_count = 0usize;
        let mut map = HashMap::with_capacity(results.len());
        for (symbol, result) in results {
            match &result {
                Ok(_) => ok_count += 1,
                Err(e) => {
                    err_count += 1;
                    warn!(symbol, "OHLCV fetch failed: {e}");
                }
            }
            map.insert(symbol, result);
        }

        if err_count > 0 {
            warn!(err_count, "tickers failed OHLCV fetch");
        }
        info!(ok_count, err_count, "batch OHLCV fetch complete");

        map
    }
}

fn decimal_from_f64(value: f64) -> Result<Decimal, DomainError> {
    Decimal::from_f64(value).ok_or_else(|| DomainError::DataSourceUnavailable {
        ticker: "*".to_string(),
        source_name: SOURCE.to_string(),
        detail: format!("value {value} is not representable as a decimal"),
        cause: None,
    })
}

/// JSON-friendly mirror of `PriceBar` for cache (de)serialization — avoids
/// depending on `Decimal`'s own serde shape for the cache's storage format.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SerializedBar {
    date: chrono::NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

impl SerializedBar {
    fn from_price_bar(bar: &PriceBar) -> Self {
        use rust_decimal::prelude::ToPrimitive;
        Self {
            date: bar.date,
            open: bar.open.to_f64().unwrap_or_default(),
            high: bar.high.to_f64().unwrap_or_default(),
            low: bar.low.to_f64().unwrap_or_default(),
            close: bar.close.to_f64().unwrap_or_default(),
            volume: bar.volume,
        }
    }

    fn into_price_bar(self) -> Result<PriceBar, crate::error::ValidationError> {
        PriceBar::new(
            self.date,
            Decimal::from_f64(self.open).unwrap_or_default(),
            Decimal::from_f64(self.high).unwrap_or_default(),
            Decimal::from_f64(self.low).unwrap_or_default(),
            Decimal::from_f64(self.close).unwrap_or_default(),
            self.volume,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, RateLimiterConfig};
    use crate::ports::{RawBar, RawOptionRow, RawQuote, RawTickerInfo};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex as StdMutex;

    struct FixtureProvider {
        bars: StdMutex<HashMap<String, Vec<RawBar>>>,
    }

    #[async_trait]
    impl QuoteProvider for FixtureProvider {
        async fn history(&self, symbol: &str, _period: &str) -> Result<Vec<RawBar>, DomainError> {
            self.bars
                .lock()
                .unwrap()
                .get(symbol)
                .cloned()
                .ok_or_else(|| DomainError::TickerNotFound {
                    ticker: symbol.to_string(),
                    source_name: SOURCE.to_string(),
                })
        }

        async fn info(&self, _symbol: &str) -> Result<RawTickerInfo, DomainError> {
            Ok(RawTickerInfo::default())
        }

        async fn quote(&self, _symbol: &str) -> Result<RawQuote, DomainError> {
            Ok(RawQuote {
                bid: 1.0,
                ask: 1.1,
                last: 1.05,
                volume: 10,
            })
        }

        async fn options(&self, _symbol: &str) -> Result<Vec<NaiveDate>, DomainError> {
            Ok(vec![])
        }

        async fn option_chain(
            &self,
            _symbol: &str,
            _expiration: NaiveDate,
        ) -> Result<(Vec<RawOptionRow>, Vec<RawOptionRow>), DomainError> {
            Ok((vec![], vec![]))
        }
    }

    fn bars(n: usize) -> Vec<RawBar> {
        (0..n)
            .map(|i| RawBar {
                date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 1000,
            })
            .collect()
    }

    fn service(provider: FixtureProvider) -> MarketDataService {
        let rate_limiter = Arc::new(RateLimiter::new(&RateLimiterConfig {
            max_concurrent: 5,
            requests_per_second: 1000.0,
            max_retries: 0,
            backoff_delays: vec![std::time::Duration::from_millis(1)],
        }));
        let cache = Arc::new(ServiceCache::new(&CacheConfig::default()).unwrap());
        MarketDataService::new(rate_limiter, cache, Arc::new(provider), MarketDataConfig::default())
    }

    #[tokio::test]
    async fn fetch_ohlcv_rejects_insufficient_rows() {
        let mut map = HashMap::new();
        map.insert("AAPL".to_string(), bars(10));
        let svc = service(FixtureProvider {
            bars: StdMutex::new(map),
        });
        let err = svc.fetch_ohlcv("AAPL", "1y").await.unwrap_err();
        assert!(matches!(err, DomainError::InsufficientData { .. }));
    }

    #[tokio::test]
    async fn fetch_ohlcv_succeeds_with_enough_rows() {
        let mut map = HashMap::new();
        map.insert("AAPL".to_string(), bars(120));
        let svc = service(FixtureProvider {
            bars: StdMutex::new(map),
        });
        let result = svc.fetch_ohlcv("AAPL", "1y").await.unwrap();
        assert_eq!(result.len(), 120);
    }

    #[tokio::test]
    async fn batch_ohlcv_never_fails_as_a_whole() {
        let mut map = HashMap::new();
        map.insert("AAPL".to_string(), bars(120));
        let svc = service(FixtureProvider {
            bars: StdMutex::new(map),
        });
        let symbols = vec!["AAPL".to_string(), "FAKE".to_string()];
        let results = svc.fetch_batch_ohlcv(&symbols).await;
        assert!(results["AAPL"].is_ok());
        assert!(matches!(
            results["FAKE"],
            Err(DomainError::TickerNotFound { .. })
        ));
    }
}
