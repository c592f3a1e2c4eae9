//! Production (network-backed) implementations of the trait seams in
//! `ports.rs`. Ground truth: `tools/fetch.rs`'s `YahooQuoteProvider` for the
//! vendor-SDK wrapping idiom, `data/eodhd.rs`'s `reqwest::Client` +
//! typed-JSON-response idiom for the two hand-rolled HTTP adapters.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use yahoo_finance_api as yahoo;

use crate::config::UniverseConfig;
use crate::error::DomainError;
use crate::ports::{
    ChatMessage, LlmTransport, QuoteProvider, RawBar, RawChatCompletion, RawOptionRow, RawQuote,
    RawTickerInfo, UniverseSource,
};

const SOURCE: &str = "yahoo_finance";

fn data_source_error(ticker: &str, detail: impl Into<String>) -> DomainError {
    DomainError::DataSourceUnavailable {
        ticker: ticker.to_string(),
        source_name: SOURCE.to_string(),
        detail: detail.into(),
        cause: None,
    }
}

/// Wraps `yahoo_finance_api::YahooConnector`. History comes straight from
/// the vendor SDK; option-chain data is fetched separately via the
/// unofficial `v7/finance/options` JSON endpoint, since the SDK exposes
/// quote history only.
pub struct YahooQuoteProvider {
    http: Client,
    options_base_url: String,
}

impl YahooQuoteProvider {
    pub fn new(vendor_base_url: Option<&str>, timeout_seconds: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .expect("building a reqwest client with a fixed timeout never fails");
        Self {
            http,
            options_base_url: vendor_base_url
                .unwrap_or("https://query2.finance.yahoo.com")
                .to_string(),
        }
    }

    fn options_url(&self, symbol: &str, expiration: Option<NaiveDate>) -> String {
        match expiration {
            Some(date) => {
                let ts = Utc
                    .with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
                    .single()
                    .map(|dt| dt.timestamp())
                    .unwrap_or(0);
                format!("{}/v7/finance/options/{symbol}?date={ts}", self.options_base_url)
            }
            None => format!("{}/v7/finance/options/{symbol}", self.options_base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OptionsApiResponse {
    #[serde(rename = "optionChain")]
    option_chain: OptionChainWrapper,
}

#[derive(Debug, Deserialize)]
struct OptionChainWrapper {
    result: Vec<OptionChainResult>,
}

#[derive(Debug, Deserialize)]
struct OptionChainResult {
    #[serde(default, rename = "expirationDates")]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    options: Vec<OptionsBlock>,
}

#[derive(Debug, Deserialize)]
struct OptionsBlock {
    #[serde(default)]
    calls: Vec<RawOptionJson>,
    #[serde(default)]
    puts: Vec<RawOptionJson>,
}

#[derive(Debug, Deserialize)]
struct RawOptionJson {
    strike: f64,
    #[serde(default)]
    bid: f64,
    #[serde(default)]
    ask: f64,
    #[serde(default, rename = "lastPrice")]
    last_price: f64,
    #[serde(default)]
    volume: u64,
    #[serde(default, rename = "openInterest")]
    open_interest: u64,
    #[serde(default, rename = "impliedVolatility")]
    implied_volatility: f64,
}

impl From<RawOptionJson> for RawOptionRow {
    fn from(row: RawOptionJson) -> Self {
        RawOptionRow {
            strike: row.strike,
            bid: row.bid,
            ask: row.ask,
            last: row.last_price,
            volume: row.volume,
            open_interest: row.open_interest,
            implied_volatility: row.implied_volatility,
            delta: None,
            gamma: None,
            theta: None,
            vega: None,
            rho: None,
        }
    }
}

#[async_trait]
impl QuoteProvider for YahooQuoteProvider {
    async fn history(&self, symbol: &str, period: &str) -> Result<Vec<RawBar>, DomainError> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| data_source_error(symbol, format!("failed to create connector: {e}")))?;
        let response = connector
            .get_quote_range(symbol, "1d", period)
            .await
            .map_err(|e| data_source_error(symbol, e.to_string()))?;
        let quotes = response
            .quotes()
            .map_err(|e| data_source_error(symbol, format!("malformed quote history: {e}")))?;

        quotes
            .into_iter()
            .map(|q| {
                let date = chrono::DateTime::from_timestamp(q.timestamp as i64, 0)
                    .ok_or_else(|| data_source_error(symbol, "invalid timestamp from vendor"))?
                    .naive_utc()
                    .date();
                Ok(RawBar {
                    date,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: q.volume,
                })
            })
            .collect()
    }

    async fn info(&self, symbol: &str) -> Result<RawTickerInfo, DomainError> {
        let quote = self.quote(symbol).await?;
        Ok(RawTickerInfo {
            quote_type: None,
            price: Some(quote.last),
            market_cap: None,
            long_name: None,
            sector: None,
        })
    }

    async fn quote(&self, symbol: &str) -> Result<RawQuote, DomainError> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| data_source_error(symbol, format!("failed to create connector: {e}")))?;
        let response = connector
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(|e| data_source_error(symbol, e.to_string()))?;
        let latest = response
            .last_quote()
            .map_err(|e| data_source_error(symbol, format!("malformed latest quote: {e}")))?;

        Ok(RawQuote {
            bid: latest.close,
            ask: latest.close,
            last: latest.close,
            volume: latest.volume,
        })
    }

    async fn options(&self, symbol: &str) -> Result<Vec<NaiveDate>, DomainError> {
        let url = self.options_url(symbol, None);
        let body: OptionsApiResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| data_source_error(symbol, e.to_string()))?
            .json()
            .await
            .map_err(|e| data_source_error(symbol, format!("malformed options response: {e}")))?;

        let result = body
            .option_chain
            .result
            .into_iter()
            .next()
            .ok_or_else(|| data_source_error(symbol, "no option chain result"))?;

        Ok(result
            .expiration_dates
            .into_iter()
            .filter_map(|ts| chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.naive_utc().date()))
            .collect())
    }

    async fn option_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> Result<(Vec<RawOptionRow>, Vec<RawOptionRow>), DomainError> {
        let url = self.options_url(symbol, Some(expiration));
        let body: OptionsApiResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| data_source_error(symbol, e.to_string()))?
            .json()
            .await
            .map_err(|e| data_source_error(symbol, format!("malformed options response: {e}")))?;

        let result = body
            .option_chain
            .result
            .into_iter()
            .next()
            .ok_or_else(|| data_source_error(symbol, "no option chain result"))?;
        let block = result
            .options
            .into_iter()
            .next()
            .ok_or_else(|| data_source_error(symbol, "no option block for expiration"))?;

        Ok((
            block.calls.into_iter().map(RawOptionRow::from).collect(),
            block.puts.into_iter().map(RawOptionRow::from).collect(),
        ))
    }
}

/// Fetches the CBOE optionable-equities CSV and the Wikipedia S&P 500
/// constituents table over plain HTTP `GET`.
pub struct CboeUniverseSource {
    http: Client,
    config: UniverseConfig,
}

impl CboeUniverseSource {
    pub fn new(config: UniverseConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("building a reqwest client with a fixed timeout never fails"),
            config,
        }
    }
}

#[async_trait]
impl UniverseSource for CboeUniverseSource {
    async fn fetch_csv(&self) -> Result<String, DomainError> {
        self.http
            .get(&self.config.cboe_url)
            .send()
            .await
            .map_err(|e| data_source_error("*", e.to_string()))?
            .text()
            .await
            .map_err(|e| data_source_error("*", format!("malformed CBOE response body: {e}")))
    }

    async fn fetch_sp500_html(&self) -> Result<String, DomainError> {
        self.http
            .get(&self.config.sp500_wiki_url)
            .send()
            .await
            .map_err(|e| data_source_error("*", e.to_string()))?
            .text()
            .await
            .map_err(|e| data_source_error("*", format!("malformed wiki response body: {e}")))
    }
}

/// Talks to a local Ollama server's `/api/chat` endpoint (the OpenAI-shaped
/// alternative, `/v1/chat/completions`, is not used since `LlmConfig::host`
/// defaults to Ollama's own port).
pub struct OllamaLlmTransport {
    http: Client,
    host: String,
}

impl OllamaLlmTransport {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::builder()
                .timeout(timeout)
                .build()
                .expect("building a reqwest client with a fixed timeout never fails"),
            host: host.into(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, serde::Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct OllamaOptions {
    num_ctx: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModelEntry>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelEntry {
    name: String,
}

fn llm_unavailable(host: &str, detail: impl Into<String>) -> DomainError {
    DomainError::DataSourceUnavailable {
        ticker: "*".to_string(),
        source_name: format!("llm:{host}"),
        detail: detail.into(),
        cause: None,
    }
}

#[async_trait]
impl LlmTransport for OllamaLlmTransport {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        num_ctx: u32,
    ) -> Result<RawChatCompletion, DomainError> {
        let request = OllamaChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| OllamaMessage { role: &m.role, content: &m.content })
                .collect(),
            stream: false,
            options: OllamaOptions { num_ctx },
        };

        let response: OllamaChatResponse = self
            .http
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await
            .map_err(|e| llm_unavailable(&self.host, e.to_string()))?
            .json()
            .await
            .map_err(|e| llm_unavailable(&self.host, format!("malformed chat response: {e}")))?;

        Ok(RawChatCompletion {
            content: response.message.content,
            model: model.to_string(),
            input_tokens: response.prompt_eval_count,
            output_tokens: response.eval_count,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, DomainError> {
        let response: OllamaTagsResponse = self
            .http
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
            .map_err(|e| llm_unavailable(&self.host, e.to_string()))?
            .json()
            .await
            .map_err(|e| llm_unavailable(&self.host, format!("malformed tags response: {e}")))?;

        Ok(response.models.into_iter().map(|m| m.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_url_without_expiration_has_no_date_param() {
        let provider = YahooQuoteProvider::new(None, 10);
        let url = provider.options_url("AAPL", None);
        assert!(!url.contains("date="));
        assert!(url.ends_with("/v7/finance/options/AAPL"));
    }

    #[test]
    fn options_url_with_expiration_has_date_param() {
        let provider = YahooQuoteProvider::new(Some("https://example.test"), 10);
        let url = provider.options_url("AAPL", NaiveDate::from_ymd_opt(2024, 6, 21));
        assert!(url.starts_with("https://example.test/v7/finance/options/AAPL?date="));
    }
}
