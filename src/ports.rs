//! Trait seams for every external collaborator, so the service layer never
//! depends on a concrete vendor/LLM/transport implementation directly.
//! Grounded on the teacher's `tools/fetch.rs` `QuoteProvider` trait and
//! `data/mod.rs` `DataStore` trait.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::DomainError;

/// Raw (pre-validation) OHLCV row as returned by the vendor SDK.
#[derive(Debug, Clone)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Raw ticker-info key/value bag as returned by the vendor SDK.
#[derive(Debug, Clone, Default)]
pub struct RawTickerInfo {
    pub quote_type: Option<String>,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub long_name: Option<String>,
    pub sector: Option<String>,
}

/// Raw bid/ask/last snapshot as returned by the vendor SDK.
#[derive(Debug, Clone)]
pub struct RawQuote {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume: u64,
}

/// Raw option-chain row (one side) as returned by the vendor SDK.
#[derive(Debug, Clone)]
pub struct RawOptionRow {
    pub strike: f64,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume: u64,
    pub open_interest: u64,
    pub implied_volatility: f64,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
}

/// Synchronous-vendor-SDK abstraction. The production implementation wraps
/// a blocking crate (e.g. `yahoo_finance_api`) behind `spawn_blocking`; test
/// doubles implement this directly with canned data.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn history(&self, symbol: &str, period: &str) -> Result<Vec<RawBar>, DomainError>;
    async fn info(&self, symbol: &str) -> Result<RawTickerInfo, DomainError>;
    async fn quote(&self, symbol: &str) -> Result<RawQuote, DomainError>;
    async fn options(&self, symbol: &str) -> Result<Vec<NaiveDate>, DomainError>;
    async fn option_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> Result<(Vec<RawOptionRow>, Vec<RawOptionRow>), DomainError>;
}

/// A single chat message in the LLM request body.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Raw (pre-think-tag-stripped) chat completion result.
#[derive(Debug, Clone)]
pub struct RawChatCompletion {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Transport to a local OpenAI-compatible LLM endpoint.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        num_ctx: u32,
    ) -> Result<RawChatCompletion, DomainError>;

    async fn list_models(&self) -> Result<Vec<String>, DomainError>;
}

/// Abstraction over the CBOE optionable-equity CSV feed.
#[async_trait]
pub trait UniverseSource: Send + Sync {
    async fn fetch_csv(&self) -> Result<String, DomainError>;
    async fn fetch_sp500_html(&self) -> Result<String, DomainError>;
}
