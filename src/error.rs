//! Typed error taxonomy. Every leaf error carries `ticker` (or `"*"` for
//! universe-wide failures) and `source` so callers can tell *what* failed
//! and *where* without parsing a message string.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type returned by every public operation in this crate.
#[derive(Debug, Error)]
pub enum OptionAlphaError {
    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error(transparent)]
    OptionsData(#[from] OptionsDataError),

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// A domain-level failure carrying ticker/source context. Produced by the
/// market-data and options-data services and consumed by the rate limiter's
/// retry policy (only `RateLimitExceeded` is retried).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("ticker '{ticker}' not found at source '{source_name}'")]
    TickerNotFound { ticker: String, source_name: String },

    #[error("insufficient data for ticker '{ticker}' at source '{source_name}': {detail}")]
    InsufficientData {
        ticker: String,
        source_name: String,
        detail: String,
    },

    #[error("data source '{source_name}' unavailable for ticker '{ticker}': {detail}")]
    DataSourceUnavailable {
        ticker: String,
        source_name: String,
        detail: String,
        #[source]
        cause: Option<anyhow::Error>,
    },

    #[error("rate limit exceeded for ticker '{ticker}' at source '{source_name}'")]
    RateLimitExceeded {
        ticker: String,
        source_name: String,
        retry_after: Option<Duration>,
    },
}

impl DomainError {
    /// Only `RateLimitExceeded` is retryable; domain errors (not-found,
    /// insufficient-data) and transport failures that already exhausted
    /// retries are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::RateLimitExceeded { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DomainError::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn ticker(&self) -> &str {
        match self {
            DomainError::TickerNotFound { ticker, .. }
            | DomainError::InsufficientData { ticker, .. }
            | DomainError::DataSourceUnavailable { ticker, .. }
            | DomainError::RateLimitExceeded { ticker, .. } => ticker,
        }
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct MarketDataError(#[from] pub DomainError);

#[derive(Debug, Error)]
#[error(transparent)]
pub struct OptionsDataError(#[from] pub DomainError);

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("universe refresh returned {got} tickers, below the safety threshold of {min}")]
    BelowSafetyThreshold { got: usize, min: usize },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache persistence backend error: {0}")]
    Persistence(String),

    #[error("cache entry for key '{0}' failed to serialize/deserialize: {1}")]
    Codec(String, String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM transport error contacting '{host}': {detail}")]
    Transport { host: String, detail: String },

    #[error("LLM model '{model}' not found at '{host}'")]
    ModelNotFound { host: String, model: String },

    #[error("LLM call to '{host}' timed out after {elapsed_ms}ms")]
    Timeout { host: String, elapsed_ms: u64 },

    #[error("LLM response for model '{model}' was not valid JSON: {detail}")]
    MalformedResponse { model: String, detail: String },
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("watchlist '{0}' already exists")]
    DuplicateWatchlist(String),

    #[error("watchlist id {0} not found")]
    WatchlistNotFound(i64),
}

#[derive(Debug, Error)]
#[error("validation failed for field '{field}': {detail}")]
pub struct ValidationError {
    pub field: String,
    pub detail: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("invalid BSM input '{field}': {detail}")]
    InvalidInput { field: String, detail: String },

    #[error("market price {market_price} is below the no-arbitrage lower bound {lower_bound}")]
    BelowLowerBound { market_price: f64, lower_bound: f64 },

    #[error(
        "implied volatility solver did not converge after {newton_iterations} Newton-Raphson \
         and {bisection_iterations} bisection iterations"
    )]
    DidNotConverge {
        newton_iterations: u32,
        bisection_iterations: u32,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable '{0}'")]
    MissingEnvVar(String),

    #[error("invalid value for config field '{field}': '{value}'")]
    InvalidValue { field: String, value: String },
}

pub type Result<T, E = OptionAlphaError> = std::result::Result<T, E>;
