use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Flat snapshot consumed by the debate agents. Assembled by the scan
/// pipeline from the other services' outputs; carries no behavior of its
/// own beyond construction validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub ticker: String,
    pub current_price: Decimal,
    pub week52_high: Decimal,
    pub week52_low: Decimal,
    pub iv_rank: f64,
    pub iv_percentile: f64,
    pub atm_iv_30d: f64,
    pub rsi_14: f64,
    pub macd_signal: f64,
    pub put_call_ratio: f64,
    pub next_earnings: Option<NaiveDate>,
    pub dte_target: i64,
    pub target_strike: Decimal,
    pub target_delta: f64,
    pub sector: String,
    pub data_timestamp_utc: DateTime<Utc>,
}
