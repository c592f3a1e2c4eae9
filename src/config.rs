//! Process-wide configuration, assembled once at startup from the
//! environment (`.env` via `dotenvy`, then `std::env`), mirroring the
//! `from_env()` builder convention used throughout the data layer.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub period: String,
    pub timeout_seconds: u64,
    pub vendor_base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_concurrent: usize,
    pub requests_per_second: f64,
    pub max_retries: u32,
    pub backoff_delays: Vec<Duration>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            requests_per_second: 5.0,
            max_retries: 3,
            backoff_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub database_path: Option<PathBuf>,
    pub lazy_cleanup_interval: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            lazy_cleanup_interval: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    pub num_ctx: u32,
    pub chat_timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            num_ctx: 8192,
            chat_timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UniverseConfig {
    pub cboe_url: String,
    pub sp500_wiki_url: String,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            cboe_url: "https://www.cboe.com/available_weeklys/get_csv_download/".to_string(),
            sp500_wiki_url: "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub database_path: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/options.db"),
        }
    }
}

/// Coefficients for the earnings-proximity penalty applied after the base
/// composite score. Pluggable because the upstream weighting was never
/// pinned down by the sources this was distilled from.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub catalyst_horizon_days: i64,
    pub catalyst_max_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            catalyst_horizon_days: 5,
            catalyst_max_penalty: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub market_data: MarketDataConfig,
    pub rate_limiter: RateLimiterConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub universe: UniverseConfig,
    pub repository: RepositoryConfig,
    pub scoring: ScoringConfig,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            period: "2y".to_string(),
            timeout_seconds: 30,
            vendor_base_url: None,
        }
    }
}

impl Config {
    /// Loads configuration from a `.env` file (if present) and the process
    /// environment, falling back to the documented defaults for anything
    /// unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(period) = std::env::var("MARKET_DATA_PERIOD") {
            config.market_data.period = period;
        }
        if let Ok(url) = std::env::var("MARKET_DATA_BASE_URL") {
            config.market_data.vendor_base_url = Some(url);
        }
        if let Ok(timeout) = std::env::var("MARKET_DATA_TIMEOUT_SECONDS") {
            config.market_data.timeout_seconds = parse_env("MARKET_DATA_TIMEOUT_SECONDS", &timeout)?;
        }

        if let Ok(max_concurrent) = std::env::var("RATE_LIMITER_MAX_CONCURRENT") {
            config.rate_limiter.max_concurrent =
                parse_env("RATE_LIMITER_MAX_CONCURRENT", &max_concurrent)?;
        }
        if let Ok(rps) = std::env::var("RATE_LIMITER_REQUESTS_PER_SECOND") {
            config.rate_limiter.requests_per_second =
                parse_env("RATE_LIMITER_REQUESTS_PER_SECOND", &rps)?;
        }
        if let Ok(retries) = std::env::var("RATE_LIMITER_MAX_RETRIES") {
            config.rate_limiter.max_retries = parse_env("RATE_LIMITER_MAX_RETRIES", &retries)?;
        }

        if let Ok(path) = std::env::var("CACHE_DATABASE_PATH") {
            config.cache.database_path = Some(PathBuf::from(path));
        }

        if let Ok(host) = std::env::var("LLM_HOST") {
            config.llm.host = host;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(num_ctx) = std::env::var("LLM_NUM_CTX") {
            config.llm.num_ctx = parse_env("LLM_NUM_CTX", &num_ctx)?;
        }

        if let Ok(path) = std::env::var("REPOSITORY_DATABASE_PATH") {
            config.repository.database_path = PathBuf::from(path);
        }

        if let Ok(days) = std::env::var("SCORING_CATALYST_HORIZON_DAYS") {
            config.scoring.catalyst_horizon_days =
                parse_env("SCORING_CATALYST_HORIZON_DAYS", &days)?;
        }
        if let Ok(penalty) = std::env::var("SCORING_CATALYST_MAX_PENALTY") {
            config.scoring.catalyst_max_penalty =
                parse_env("SCORING_CATALYST_MAX_PENALTY", &penalty)?;
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.rate_limiter.max_concurrent, 5);
        assert_eq!(config.rate_limiter.max_retries, 3);
        assert_eq!(config.llm.host, "http://localhost:11434");
        assert_eq!(config.llm.num_ctx, 8192);
        assert_eq!(config.cache.lazy_cleanup_interval, 100);
    }
}
