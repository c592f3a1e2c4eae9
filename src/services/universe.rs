//! CBOE optionable-ticker universe: ingestion, pre-filters, preset slicing,
//! and miss-count auto-deactivation.
//! Ground truth: `original_source/services/universe.py`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::ServiceCache;
use crate::config::UniverseConfig;
use crate::domain::{AssetType, MarketCapTier, TickerInfo, TickerStatus};
use crate::error::DomainError;
use crate::ports::UniverseSource;
use crate::rate_limiter::RateLimiter;

const SOURCE: &str = "cboe";

const MAX_CONSECUTIVE_MISSES: u32 = 3;
const MIN_TICKERS_SAFETY: usize = 100;

const UNIVERSE_CACHE_KEY: &str = "cboe:universe:full";
const UNIVERSE_CACHE_TTL: u64 = 24 * 60 * 60;

const SP500_CACHE_KEY: &str = "wiki:sp500:constituents";
const SP500_CACHE_TTL: u64 = 7 * 24 * 60 * 60;
const SP500_MIN_EXPECTED: usize = 400;

pub const GICS_SECTORS: [&str; 11] = [
    "Energy",
    "Materials",
    "Industrials",
    "Consumer Discretionary",
    "Consumer Staples",
    "Health Care",
    "Financials",
    "Information Technology",
    "Communication Services",
    "Utilities",
    "Real Estate",
];

static INDEX_SYMBOLS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "DJX", "NDX", "OEX", "RLV", "RUI", "RUT", "SPX", "VIX", "XEO", "XND", "XSP", "SIXB",
        "SIXI", "SIXM", "SIXRE", "SIXU", "SIXV",
    ]
    .into_iter()
    .collect()
});

static WELL_KNOWN_ETFS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "SPY", "QQQ", "IWM", "DIA", "TLT", "GLD", "SLV", "XLF", "XLE", "XLK", "XLV", "XLI", "XLP",
        "XLY", "XLB", "XLU", "XLRE", "XLC", "VTI", "VOO", "VXX", "EEM", "EFA", "HYG", "LQD",
        "IEF", "SHY", "USO", "ARKK", "ARKG", "ARKW", "ARKF", "ARKQ",
    ]
    .into_iter()
    .collect()
});

const ETF_NAME_KEYWORDS: [&str; 7] = ["ETF", "Fund", "Trust", "Index", "iShares", "SPDR", "Vanguard"];

static FALLBACK_LARGE_CAPS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "AAPL", "ABBV", "ABT", "ACN", "ADP", "ADI", "AMGN", "AMD", "AMZN", "AVGO", "BA", "BLK",
        "BKNG", "CAT", "COST", "CRM", "CSCO", "CVX", "DE", "DHR", "DIS", "GE", "GOOG", "GOOGL",
        "GS", "HD", "HON", "IBM", "INTC", "ISRG", "JNJ", "JPM", "KO", "LIN", "LLY", "LOW", "MA",
        "MCD", "MDLZ", "MRK", "META", "MSFT", "NEE", "NFLX", "NVDA", "ORCL", "PEP", "PG", "PM",
        "RTX", "SPGI", "SYK", "TMO", "TSLA", "TXN", "UNH", "UNP", "V", "WMT",
    ]
    .into_iter()
    .collect()
});

fn preset_tier(preset: &str) -> Option<MarketCapTier> {
    match preset {
        "sp500" => Some(MarketCapTier::Large),
        "midcap" => Some(MarketCapTier::Mid),
        "smallcap" => Some(MarketCapTier::Small),
        "etfs" => Some(MarketCapTier::Etf),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct UniverseStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub by_tier: HashMap<String, usize>,
    pub by_sector: HashMap<String, usize>,
}

struct UniverseState {
    universe: Vec<TickerInfo>,
    miss_counts: HashMap<String, u32>,
    sp500_symbols: HashSet<String>,
}

pub struct UniverseService {
    #[allow(dead_code)]
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<ServiceCache>,
    source: Arc<dyn UniverseSource>,
    #[allow(dead_code)]
    config: UniverseConfig,
    state: Mutex<UniverseState>,
}

impl UniverseService {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ServiceCache>,
        source: Arc<dyn UniverseSource>,
        config: UniverseConfig,
    ) -> Self {
        Self {
            rate_limiter,
            cache,
            source,
            config,
            state: Mutex::new(UniverseState {
                universe: vec![],
                miss_counts: HashMap::new(),
                sp500_symbols: HashSet::new(),
            }),
        }
    }

    /// Downloads and parses the CBOE optionable list, applies miss-count
    /// auto-deactivation against the prior universe, and caches the result.
    /// Serializes with itself: a second concurrent call waits rather than
    /// racing the miss-count map.
    pub async fn refresh(&self) -> Result<Vec<TickerInfo>, DomainError> {
        let mut state = self.state.lock().await;

        let sp500 = self.fetch_sp500_constituents().await;
        state.sp500_symbols = sp500;

        let csv_text = self
            .source
            .fetch_csv()
            .await
            .map_err(|e| annotate(e, "*"))?;
        let raw_tickers = parse_csv(&csv_text, &state.sp500_symbols);

        if raw_tickers.len() < MIN_TICKERS_SAFETY {
            return Err(DomainError::DataSourceUnavailable {
                ticker: "*".to_string(),
                source_name: SOURCE.to_string(),
                detail: format!(
                    "CBOE returned only {} tickers (minimum {})",
                    raw_tickers.len(),
                    MIN_TICKERS_SAFETY
                ),
                cause: None,
            });
        }

        let current_symbols: HashSet<&str> =
            raw_tickers.iter().map(|t| t.symbol.as_str()).collect();
        for (symbol, count) in state.miss_counts.iter_mut() {
            if current_symbols.contains(symbol.as_str()) {
                *count = 0;
            } else {
                *count += 1;
            }
        }

        let active_tickers: Vec<TickerInfo> = raw_tickers
            .into_iter()
            .map(|ticker| {
                let miss_count = *state.miss_counts.get(&ticker.symbol).unwrap_or(&0);
                if miss_count >= MAX_CONSECUTIVE_MISSES {
                    info!(symbol = %ticker.symbol, miss_count, "ticker deactivated after consecutive misses");
                    TickerInfo {
                        status: TickerStatus::Inactive,
                        consecutive_misses: miss_count,
                        ..ticker
                    }
                } else {
                    ticker
                }
            })
            .collect();

        state.universe = active_tickers.clone();
        self.cache_universe(&active_tickers).await;

        info!(count = active_tickers.len(), "universe refreshed");
        Ok(active_tickers)
    }

    /// `"full"` returns every active ticker; other names slice by market-cap
    /// tier. An unrecognized preset logs a warning and returns the full
    /// active set.
    pub async fn get_universe(&self, preset: &str) -> Vec<TickerInfo> {
        let mut state = self.state.lock().await;
        if state.universe.is_empty() {
            self.load_from_cache(&mut state).await;
        }

        let active: Vec<TickerInfo> = state
            .universe
            .iter()
            .filter(|t| t.status == TickerStatus::Active)
            .cloned()
            .collect();

        if preset == "full" {
            return active;
        }

        match preset_tier(preset) {
            Some(tier) => active
                .into_iter()
                .filter(|t| t.market_cap_tier == tier)
                .collect(),
            None => {
                warn!(preset, "unknown preset, returning full universe");
                active
            }
        }
    }

    /// Matches the 11 GICS sector names verbatim; an unrecognized sector
    /// logs a warning and returns an empty list.
    pub fn filter_by_sector(&self, tickers: Vec<TickerInfo>, sector: &str) -> Vec<TickerInfo> {
        if !GICS_SECTORS.contains(&sector) {
            warn!(sector, "unknown GICS sector");
            return vec![];
        }
        tickers.into_iter().filter(|t| t.sector == sector).collect()
    }

    pub async fn get_stats(&self) -> UniverseStats {
        let mut state = self.state.lock().await;
        if state.universe.is_empty() {
            self.load_from_cache(&mut state).await;
        }

        let total = state.universe.len();
        let active = state
            .universe
            .iter()
            .filter(|t| t.status == TickerStatus::Active)
            .count();
        let inactive = total - active;

        let mut by_tier = HashMap::new();
        let mut by_sector = HashMap::new();
        for ticker in &state.universe {
            *by_tier.entry(format!("{:?}", ticker.market_cap_tier)).or_insert(0) += 1;
            if !ticker.sector.is_empty() {
                *by_sector.entry(ticker.sector.clone()).or_insert(0) += 1;
            }
        }

        UniverseStats {
            total,
            active,
            inactive,
            by_tier,
            by_sector,
        }
    }

    async fn fetch_sp500_constituents(&self) -> HashSet<String> {
        if let Some(cached) = self.cache.get_json::<Vec<String>>(SP500_CACHE_KEY).await {
            if cached.len() >= SP500_MIN_EXPECTED {
                info!(count = cached.len(), "S&P 500 list loaded from cache");
                return cached.into_iter().collect();
            }
        }

        let html = match self.source.fetch_sp500_html().await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "failed to fetch S&P 500 list, using fallback");
                return FALLBACK_LARGE_CAPS.iter().map(|s| s.to_string()).collect();
            }
        };

        let symbols = parse_sp500_html(&html);
        if symbols.len() < SP500_MIN_EXPECTED {
            warn!(
                count = symbols.len(),
                expected = SP500_MIN_EXPECTED,
                "too few tickers parsed from Wikipedia, using fallback"
            );
            return FALLBACK_LARGE_CAPS.iter().map(|s| s.to_string()).collect();
        }

        info!(count = symbols.len(), "fetched S&P 500 constituents from Wikipedia");
        let sorted: Vec<String> = {
            let mut v: Vec<String> = symbols.iter().cloned().collect();
            v.sort();
            v
        };
        let _ = self
            .cache
            .set_json(SP500_CACHE_KEY, &sorted, SP500_CACHE_TTL)
            .await;
        symbols
    }

    async fn cache_universe(&self, tickers: &[TickerInfo]) {
        let _ = self
            .cache
            .set_json(UNIVERSE_CACHE_KEY, tickers, UNIVERSE_CACHE_TTL)
            .await;
    }

    async fn load_from_cache(&self, state: &mut UniverseState) {
        if state.sp500_symbols.is_empty() {
            if let Some(cached) = self.cache.get_json::<Vec<String>>(SP500_CACHE_KEY).await {
                if cached.len() >= SP500_MIN_EXPECTED {
                    state.sp500_symbols = cached.into_iter().collect();
                } else {
                    state.sp500_symbols =
                        FALLBACK_LARGE_CAPS.iter().map(|s| s.to_string()).collect();
                }
            } else {
                state.sp500_symbols = FALLBACK_LARGE_CAPS.iter().map(|s| s.to_string()).collect();
            }
        }

        if let Some(tickers) = self.cache.get_json::<Vec<TickerInfo>>(UNIVERSE_CACHE_KEY).await {
            info!(count = tickers.len(), "universe loaded from cache");
            state.universe = tickers;
        }
    }
}

fn annotate(err: DomainError, ticker: &str) -> DomainError {
    match err {
        DomainError::DataSourceUnavailable {
            source_name, detail, cause, ..
        } => DomainError::DataSourceUnavailable {
            ticker: ticker.to_string(),
            source_name,
            detail,
            cause,
        },
        other => other,
    }
}

fn classify_asset_type(symbol: &str, name: &str) -> AssetType {
    if WELL_KNOWN_ETFS.contains(symbol) {
        return AssetType::Etf;
    }
    let lower = name.to_lowercase();
    if ETF_NAME_KEYWORDS.iter().any(|kw| lower.contains(&kw.to_lowercase())) {
        return AssetType::Etf;
    }
    AssetType::Equity
}

fn classify_market_cap_tier(
    symbol: &str,
    asset_type: AssetType,
    sp500_symbols: &HashSet<String>,
) -> MarketCapTier {
    if asset_type == AssetType::Etf {
        return MarketCapTier::Etf;
    }
    let large_caps: HashSet<&str> = if sp500_symbols.is_empty() {
        FALLBACK_LARGE_CAPS.iter().copied().collect()
    } else {
        sp500_symbols.iter().map(|s| s.as_str()).collect()
    };
    if large_caps.contains(symbol) {
        MarketCapTier::Large
    } else {
        MarketCapTier::Mid
    }
}

/// CBOE directory CSV header: `Company Name, Stock Symbol, DPM Name,
/// Post/Station`. Mirrors the `isalpha()` skip rule verbatim: a row whose
/// symbol contains any non-alphabetic character (including share-class
/// dots like `BRK.B`) is dropped rather than normalized.
fn parse_csv(csv_text: &str, sp500_symbols: &HashSet<String>) -> Vec<TickerInfo> {
    let now = Utc::now();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.trim().to_string()).collect(),
        Err(_) => return vec![],
    };
    let symbol_idx = headers.iter().position(|h| h == "Stock Symbol");
    let name_idx = headers.iter().position(|h| h == "Company Name");

    let Some(symbol_idx) = symbol_idx else {
        return vec![];
    };

    let mut tickers = vec![];
    for record in reader.records().flatten() {
        let symbol = record
            .get(symbol_idx)
            .unwrap_or("")
            .trim()
            .to_uppercase();

        if symbol.is_empty() {
            continue;
        }
        if !symbol.chars().all(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        if INDEX_SYMBOLS.contains(symbol.as_str()) {
            continue;
        }

        let name = name_idx
            .and_then(|idx| record.get(idx))
            .unwrap_or("")
            .trim()
            .to_string();

        let asset_type = classify_asset_type(&symbol, &name);
        let market_cap_tier = classify_market_cap_tier(&symbol, asset_type, sp500_symbols);

        let display_name = if name.is_empty() { symbol.clone() } else { name };

        if let Ok(ticker) = TickerInfo::new(
            symbol,
            display_name,
            "Unknown",
            market_cap_tier,
            asset_type,
            SOURCE,
            vec!["optionable".to_string()],
            TickerStatus::Active,
            now,
            None,
            0,
        ) {
            tickers.push(ticker);
        }
    }

    info!(count = tickers.len(), "parsed tickers from CBOE CSV");
    tickers
}

/// Tickers are 1-5 uppercase letters, optionally with a dot share-class
/// suffix (`BRK.B`). The suffix is stripped to match CBOE symbols.
fn parse_sp500_html(html: &str) -> HashSet<String> {
    static RE: Lazy<regex::Regex> = Lazy::new(|| {
        regex::Regex::new(
            r#"<td[^>]*>\s*<a[^>]*class="external text"[^>]*>([A-Z]{1,5}(?:\.[A-Z])?)</a>"#,
        )
        .expect("static regex is valid")
    });

    RE.captures_iter(html)
        .map(|c| {
            let raw = &c[1];
            raw.split('.').next().unwrap_or(raw).to_string()
        })
        .collect()
}
