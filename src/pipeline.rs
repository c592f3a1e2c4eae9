//! The 5-phase scan generator composing universe resolution, market data,
//! indicators, scoring, catalyst adjustment, option recommendation, and
//! persistence into a single cancellable event stream.
//! Ground truth: `original_source/web/scan_pipeline.py` verbatim (phase
//! boundaries, progress cadence, `CancelFlag` shape, default tunables).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_stream::stream;
use chrono::Utc;
use futures::Stream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::domain::{ScanRun, ScanStatus, SignalDirection, TickerScore};
use crate::error::DomainError;
use crate::indicators;
use crate::recommender;
use crate::repository::Repository;
use crate::scoring;
use crate::services::{MarketDataService, OptionsDataService, UniverseService};

pub const DEFAULT_TOP_N: u32 = 50;
pub const DEFAULT_MIN_SCORE: f64 = 50.0;
/// Documents the original default OHLCV lookback window; the actual period
/// used by [`MarketDataService::fetch_batch_ohlcv`] comes from
/// `MarketDataConfig::period`, which defaults to the same value.
pub const DEFAULT_OHLCV_PERIOD: &str = "2y";

/// Cooperative cancellation flag, checked between phases and at each
/// iteration of phase 2's indicator loop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub phase: u8,
    pub phase_name: String,
    pub message: String,
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct ScanComplete {
    pub scan_run: ScanRun,
    pub scores: Vec<TickerScore>,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    Progress(ScanProgress),
    Complete(ScanComplete),
}

fn progress(phase: u8, phase_name: &str, message: impl Into<String>, current: usize, total: usize) -> ScanEvent {
    ScanEvent::Progress(ScanProgress {
        phase,
        phase_name: phase_name.to_string(),
        message: message.into(),
        current,
        total,
    })
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub preset: String,
    pub sectors: Vec<String>,
    pub top_n: u32,
    pub min_score: f64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            preset: "full".to_string(),
            sectors: vec![],
            top_n: DEFAULT_TOP_N,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

/// Owns every service the scan composes; cheap to clone (all fields are
/// `Arc`s) so [`ScanPipeline::run`] can move owned copies into its
/// generator without borrowing `self`.
#[derive(Clone)]
pub struct ScanPipeline {
    market_data: Arc<MarketDataService>,
    options_data: Arc<OptionsDataService>,
    universe: Arc<UniverseService>,
    repository: Arc<Repository>,
    scoring_config: ScoringConfig,
}

impl ScanPipeline {
    pub fn new(
        market_data: Arc<MarketDataService>,
        options_data: Arc<OptionsDataService>,
        universe: Arc<UniverseService>,
        repository: Arc<Repository>,
        scoring_config: ScoringConfig,
    ) -> Self {
        Self {
            market_data,
            options_data,
            universe,
            repository,
            scoring_config,
        }
    }

    pub fn run(&self, options: ScanOptions, cancelled: CancelFlag) -> impl Stream<Item = ScanEvent> {
        let pipeline = self.clone();
        stream! {
            let scan_id = Uuid::new_v4().to_string();
            let started_at = Utc::now();

            // ----------------------------------------------------------
            // Phase 1: universe resolution + batch OHLCV fetch
            // ----------------------------------------------------------
            yield progress(1, "Loading universe", "Loading universe and fetching market data", 0, 5);

            let mut universe = pipeline.universe.get_universe(&options.preset).await;
            if universe.is_empty() {
                warn!(preset = %options.preset, "universe empty, attempting refresh");
                if let Err(e) = pipeline.universe.refresh().await {
                    error!(error = %e, "universe refresh failed, aborting scan");
                    return;
                }
                universe = pipeline.universe.get_universe(&options.preset).await;
            }

            if !options.sectors.is_empty() {
                let mut filtered = Vec::new();
                for sector in &options.sectors {
                    filtered.extend(pipeline.universe.filter_by_sector(universe.clone(), sector));
                }
                universe = filtered;
            }

            if universe.is_empty() {
                error!(preset = %options.preset, sectors = ?options.sectors, "no tickers found for scan");
                return;
            }

            let ticker_symbols: Vec<String> = universe.iter().map(|t| t.symbol.clone()).collect();

            yield progress(
                1,
                "Loading universe",
                format!("Fetching OHLCV for {} tickers", ticker_symbols.len()),
                0,
                ticker_symbols.len(),
            );

            let batch_results = pipeline.market_data.fetch_batch_ohlcv(&ticker_symbols).await;

            let mut ohlcv_data = std::collections::HashMap::new();
            let mut fetch_failures = 0usize;
            for (ticker_sym, result) in batch_results {
                match result {
                    Ok(bars) => {
                        ohlcv_data.insert(ticker_sym, bars);
                    }
                    Err(e) => {
                        fetch_failures += 1;
                        warn!(ticker = %ticker_sym, error = %e, "OHLCV fetch failed");
                    }
                }
            }
            if fetch_failures > 0 {
                warn!(fetch_failures, "tickers failed OHLCV fetch");
            }

            if ohlcv_data.is_empty() {
                error!("no OHLCV data retrieved, aborting scan");
                return;
            }

            yield progress(
                1,
                "Loading universe",
                format!("Fetched data for {} tickers", ohlcv_data.len()),
                1,
                5,
            );

            if cancelled.is_set() {
                return;
            }

            // ----------------------------------------------------------
            // Phase 2: indicators, scoring, direction
            // ----------------------------------------------------------
            let total_tickers = ohlcv_data.len();
            yield progress(2, "Computing indicators", "Computing indicators and scoring", 0, total_tickers);

            let mut universe_indicators = std::collections::HashMap::new();
            let mut processed_count = 0usize;

            for (ticker_sym, bars) in &ohlcv_data {
                if cancelled.is_set() {
                    return;
                }
                let signals = indicators::compute_all(bars);
                if !signals.is_empty() {
                    universe_indicators.insert(ticker_sym.clone(), signals);
                }

                processed_count += 1;
                if processed_count % 50 == 0 {
                    yield progress(
                        2,
                        "Computing indicators",
                        format!("Processed {processed_count}/{total_tickers} tickers"),
                        processed_count,
                        total_tickers,
                    );
                }
            }

            if universe_indicators.is_empty() {
                error!("no indicators computed, aborting scan");
                return;
            }

            let scored = match scoring::score_universe(&universe_indicators) {
                Ok(scored) => scored,
                Err(e) => {
                    error!(error = %e, "scoring failed, aborting scan");
                    return;
                }
            };
            let mut scored_tickers: Vec<TickerScore> =
                scored.into_iter().filter(|t| t.score >= options.min_score).collect();

            if scored_tickers.is_empty() {
                warn!(min_score = options.min_score, "no tickers scored above threshold");
                return;
            }

            let mut ticker_directions = std::collections::HashMap::new();
            for ts in &scored_tickers {
                let adx_val = ts.signals.get("adx").copied().unwrap_or(0.0);
                let rsi_val = ts.signals.get("rsi").copied().unwrap_or(50.0);
                let sma_val = ts.signals.get("sma_alignment").copied().unwrap_or(0.0);
                ticker_directions.insert(
                    ts.ticker.clone(),
                    scoring::determine_direction(adx_val, rsi_val, sma_val),
                );
            }

            yield progress(
                2,
                "Computing indicators",
                format!("Scored {} tickers above threshold", scored_tickers.len()),
                2,
                5,
            );

            if cancelled.is_set() {
                return;
            }

            // ----------------------------------------------------------
            // Phase 3: catalyst adjustment, re-sort, re-rank
            // ----------------------------------------------------------
            yield progress(3, "Evaluating catalysts", "Evaluating earnings catalysts", 0, scored_tickers.len());

            let today = Utc::now().date_naive();
            let mut adjusted = Vec::with_capacity(scored_tickers.len());
            for ts in scored_tickers.drain(..) {
                let proximity = scoring::catalyst_proximity_score(None, today, &pipeline.scoring_config);
                let new_score = scoring::apply_catalyst_adjustment(ts.score, proximity, &pipeline.scoring_config);
                match TickerScore::new(ts.ticker.clone(), new_score, ts.signals.clone(), ts.rank) {
                    Ok(adjusted_ts) => adjusted.push(adjusted_ts),
                    Err(e) => warn!(ticker = %ts.ticker, error = %e, "catalyst adjustment produced an invalid score, keeping original"),
                }
            }
            scored_tickers = crate::domain::resort_and_rerank(adjusted);

            yield progress(
                3,
                "Evaluating catalysts",
                format!("Catalyst adjustment applied to {} tickers", scored_tickers.len()),
                3,
                5,
            );

            if cancelled.is_set() {
                return;
            }

            // ----------------------------------------------------------
            // Phase 4: option chains + recommender for the top N
            // ----------------------------------------------------------
            let top_n = options.top_n as usize;
            let top_count = top_n.min(scored_tickers.len());
            yield progress(4, "Fetching options", format!("Fetching option chains (top {top_n})"), 0, top_count);

            for ts in scored_tickers.iter().take(top_n) {
                let direction = ticker_directions.get(&ts.ticker).copied().unwrap_or(SignalDirection::Neutral);
                if direction == SignalDirection::Neutral {
                    continue;
                }
                match pipeline.options_data.fetch_option_chain(&ts.ticker, direction).await {
                    Ok(contracts) if !contracts.is_empty() => {
                        let _ = recommender::recommend_contract(contracts, direction, today);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(ticker = %ts.ticker, error = %e, "options fetch failed"),
                }
            }

            yield progress(
                4,
                "Fetching options",
                format!("Options fetched for top {top_count} tickers"),
                4,
                5,
            );

            if cancelled.is_set() {
                return;
            }

            // ----------------------------------------------------------
            // Phase 5: persist
            // ----------------------------------------------------------
            yield progress(5, "Persisting results", "Persisting results to database", 0, 1);

            let completed_at = Utc::now();
            let scan_run = ScanRun::new(
                scan_id.clone(),
                started_at,
                Some(completed_at),
                ScanStatus::Completed,
                options.preset.clone(),
                options.sectors.clone(),
                scored_tickers.len() as u32,
                options.top_n,
            );

            if let Err(e) = pipeline.repository.save_scan_run(&scan_run).await {
                error!(error = %e, "failed to persist scan run");
            } else if let Err(e) = pipeline
                .repository
                .save_ticker_scores(&scan_id, &scored_tickers, &ticker_directions)
                .await
            {
                error!(error = %e, "failed to persist ticker scores");
            } else {
                info!(count = scored_tickers.len(), "scan results persisted");
            }

            let elapsed_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

            yield ScanEvent::Complete(ScanComplete {
                scan_run,
                scores: scored_tickers,
                elapsed_seconds,
            });
        }
    }
}

/// Convenience alias for callers that only need to know a scan may fail at
/// the service layer (the pipeline itself never returns `Err`; failures are
/// logged and the stream simply ends early).
pub type ScanResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ServiceCache;
    use crate::config::{CacheConfig, MarketDataConfig, RateLimiterConfig, UniverseConfig};
    use crate::domain::{AssetType, MarketCapTier};
    use crate::ports::{RawBar, RawOptionRow, RawQuote, RawTickerInfo, UniverseSource};
    use crate::rate_limiter::RateLimiter;
    use crate::ports::QuoteProvider;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use futures::StreamExt;

    fn fast_rate_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(&RateLimiterConfig {
            max_concurrent: 64,
            requests_per_second: 10_000.0,
            max_retries: 0,
            backoff_delays: vec![],
        }))
    }

    fn memory_cache() -> Arc<ServiceCache> {
        Arc::new(
            ServiceCache::new(&CacheConfig {
                database_path: None,
                lazy_cleanup_interval: 1_000_000,
            })
            .unwrap(),
        )
    }

    fn alpha_symbol(i: usize) -> String {
        let hi = (b'A' + (i / 26) as u8) as char;
        let lo = (b'A' + (i % 26) as u8) as char;
        format!("ZZ{hi}{lo}")
    }

    struct FixtureUniverseSource {
        symbol_count: usize,
    }

    #[async_trait]
    impl UniverseSource for FixtureUniverseSource {
        async fn fetch_csv(&self) -> Result<String, DomainError> {
            let mut csv = String::from("Company Name, Stock Symbol, DPM Name, Post/Station\n");
            for i in 0..self.symbol_count {
                csv.push_str(&format!("Company {i},{},DPM,01\n", alpha_symbol(i)));
            }
            Ok(csv)
        }

        async fn fetch_sp500_html(&self) -> Result<String, DomainError> {
            Err(DomainError::DataSourceUnavailable {
                ticker: "*".to_string(),
                source_name: "wikipedia".to_string(),
                detail: "not available in tests".to_string(),
                cause: None,
            })
        }
    }

    struct FixtureQuoteProvider;

    fn oscillating_bars(n: usize) -> Vec<RawBar> {
        let base = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        (0..n)
            .map(|i| {
                let trend = 100.0 + i as f64 * 0.1;
                let wiggle = (i as f64 * 0.3).sin() * 2.0;
                let close = trend + wiggle;
                RawBar {
                    date: base + chrono::Duration::days(i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000_000 + (i as u64 * 137) % 5000,
                }
            })
            .collect()
    }

    #[async_trait]
    impl QuoteProvider for FixtureQuoteProvider {
        async fn history(&self, _symbol: &str, _period: &str) -> Result<Vec<RawBar>, DomainError> {
            Ok(oscillating_bars(150))
        }
        async fn info(&self, _symbol: &str) -> Result<RawTickerInfo, DomainError> {
            Ok(RawTickerInfo::default())
        }
        async fn quote(&self, _symbol: &str) -> Result<RawQuote, DomainError> {
            Ok(RawQuote { bid: 1.0, ask: 1.1, last: 1.05, volume: 10 })
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

    fn build_pipeline(symbol_count: usize) -> ScanPipeline {
        let rate_limiter = fast_rate_limiter();
        let cache = memory_cache();

        let market_data = Arc::new(MarketDataService::new(
            rate_limiter.clone(),
            cache.clone(),
            Arc::new(FixtureQuoteProvider),
            MarketDataConfig {
                period: "2y".to_string(),
                timeout_seconds: 30,
                vendor_base_url: None,
            },
        ));
        let options_data = Arc::new(OptionsDataService::new(
            rate_limiter.clone(),
            cache.clone(),
            Arc::new(FixtureQuoteProvider),
        ));
        let universe = Arc::new(UniverseService::new(
            rate_limiter,
            cache,
            Arc::new(FixtureUniverseSource { symbol_count }),
            UniverseConfig::default(),
        ));
        let repository = Arc::new(Repository::in_memory().unwrap());

        ScanPipeline::new(market_data, options_data, universe, repository, ScoringConfig::default())
    }

    #[tokio::test]
    async fn happy_path_scan_persists_and_completes() {
        let pipeline = build_pipeline(120);
        let events: Vec<ScanEvent> =
            pipeline.run(ScanOptions::default(), CancelFlag::new()).collect().await;

        let complete = events.iter().find_map(|e| match e {
            ScanEvent::Complete(c) => Some(c),
            ScanEvent::Progress(_) => None,
        });
        let complete = complete.expect("expected a Complete event");
        assert!(!complete.scores.is_empty());
        assert_eq!(complete.scan_run.status, ScanStatus::Completed);

        let latest = pipeline.repository.get_latest_scan().await.unwrap();
        assert!(latest.is_some());
    }

    #[tokio::test]
    async fn cancellation_after_phase_one_yields_no_later_progress() {
        let pipeline = build_pipeline(120);
        let cancelled = CancelFlag::new();

        let mut stream = Box::pin(pipeline.run(ScanOptions::default(), cancelled.clone()));
        let mut saw_phase_one_complete = false;
        while let Some(event) = stream.next().await {
            if let ScanEvent::Progress(p) = &event {
                if p.phase == 1 && p.current == 1 {
                    saw_phase_one_complete = true;
                    cancelled.set();
                }
            }
            if let ScanEvent::Progress(p) = &event {
                assert!(p.phase <= 1, "no phase-2+ progress should be emitted after cancellation");
            }
        }
        assert!(saw_phase_one_complete);
    }

    #[test]
    fn asset_type_and_tier_unused_import_guard() {
        let _ = AssetType::Equity;
        let _ = MarketCapTier::Mid;
    }
}
