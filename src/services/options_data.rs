//! Expiration selection, chain fetch, and liquidity filtering.
//! Ground truth: `original_source/services/options_data.py`.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use crate::cache::ServiceCache;
use crate::domain::{GreeksSource, OptionContract, OptionGreeks, OptionType, SignalDirection};
use crate::error::DomainError;
use crate::ports::{QuoteProvider, RawOptionRow};
use crate::rate_limiter::RateLimiter;

const SOURCE: &str = "yfinance";

pub const DTE_TARGET: i64 = 45;
pub const DTE_MIN: i64 = 30;
pub const DTE_MAX: i64 = 60;
pub const MIN_OPEN_INTEREST: u64 = 100;
pub const MIN_VOLUME: u64 = 1;
pub const MAX_SPREAD_RATIO: f64 = 0.30;
pub const DELTA_MIN_ABS: f64 = 0.30;
pub const DELTA_MAX_ABS: f64 = 0.40;

pub struct OptionsDataService {
    rate_limiter: Arc<RateLimiter>,
    #[allow(dead_code)]
    cache: Arc<ServiceCache>,
    provider: Arc<dyn QuoteProvider>,
}

impl OptionsDataService {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ServiceCache>,
        provider: Arc<dyn QuoteProvider>,
    ) -> Self {
        Self {
            rate_limiter,
            cache,
            provider,
        }
    }

    /// Picks the expiration minimizing `|dte - 45|` within `[30, 60]`. If no
    /// candidate lies in that window, picks the nearest to 45 overall and
    /// logs a warning.
    pub async fn select_expiration(&self, symbol: &str) -> Result<NaiveDate, DomainError> {
        let provider = self.provider.clone();
        let symbol_owned = symbol.to_string();
        let expirations = self
            .rate_limiter
            .execute(symbol, SOURCE, || {
                let provider = provider.clone();
                let symbol_owned = symbol_owned.clone();
                async move { provider.options(&symbol_owned).await }
            })
            .await?;

        if expirations.is_empty() {
            return Err(DomainError::InsufficientData {
                ticker: symbol.to_string(),
                source_name: SOURCE.to_string(),
                detail: "no expirations available".to_string(),
            });
        }

        pick_expiration(&expirations, Utc::now().date_naive()).ok_or_else(|| {
            DomainError::InsufficientData {
                ticker: symbol.to_string(),
                source_name: SOURCE.to_string(),
                detail: "no expirations available".to_string(),
            }
        })
    }

    /// `direction = neutral` short-circuits to an empty list without
    /// fetching. Otherwise fetches one expiration's chain and keeps the
    /// matching side.
    pub async fn fetch_option_chain(
        &self,
        symbol: &str,
        direction: SignalDirection,
    ) -> Result<Vec<OptionContract>, DomainError> {
        if direction == SignalDirection::Neutral {
            return Ok(vec![]);
        }

        let expiration = self.select_expiration(symbol).await?;

        let provider = self.provider.clone();
        let symbol_owned = symbol.to_string();
        let (calls, puts) = self
            .rate_limiter
            .execute(symbol, SOURCE, || {
                let provider = provider.clone();
                let symbol_owned = symbol_owned.clone();
                async move { provider.option_chain(&symbol_owned, expiration).await }
            })
            .await?;

        let rows = match direction {
            SignalDirection::Bullish => calls.iter().map(|r| (r, OptionType::Call)),
            SignalDirection::Bearish => puts.iter().map(|r| (r, OptionType::Put)),
            SignalDirection::Neutral => unreachable!("handled above"),
        };

        let contracts: Vec<OptionContract> = rows
            .filter_map(|(row, option_type)| row_to_contract(symbol, option_type, expiration, row))
            .collect();

        Ok(filter_contracts_inner(contracts))
    }
}

/// Minimum-|dte-45| expiration pick within `[30, 60]`, falling back to the
/// overall nearest-to-45 when nothing lies in-window.
pub fn pick_expiration(expirations: &[NaiveDate], today: NaiveDate) -> Option<NaiveDate> {
    if expirations.is_empty() {
        return None;
    }
    let dte = |d: &NaiveDate| (*d - today).num_days();

    let in_window = expirations
        .iter()
        .filter(|d| (DTE_MIN..=DTE_MAX).contains(&dte(d)))
        .min_by_key(|d| (dte(d) - DTE_TARGET).abs());

    if let Some(best) = in_window {
        return Some(*best);
    }

    warn!("no expiration in [30, 60] DTE window, falling back to nearest overall");
    expirations
        .iter()
        .min_by_key(|d| (dte(d) - DTE_TARGET).abs())
        .copied()
}

fn row_to_contract(
    symbol: &str,
    option_type: OptionType,
    expiration: NaiveDate,
    row: &RawOptionRow,
) -> Option<OptionContract> {
    if row.bid == 0.0 && row.ask == 0.0 {
        return None;
    }

    let has_greeks = row.delta.is_some()
        && row.gamma.is_some()
        && row.theta.is_some()
        && row.vega.is_some()
        && row.rho.is_some();

    let greeks = if has_greeks {
        OptionGreeks::new(
            row.delta.unwrap(),
            row.gamma.unwrap(),
            row.theta.unwrap(),
            row.vega.unwrap(),
            row.rho.unwrap(),
        )
        .ok()
    } else {
        None
    };
    let greeks_source = greeks.map(|_| GreeksSource::Market);

    OptionContract::new(
        symbol,
        option_type,
        Decimal::from_f64(row.strike)?,
        expiration,
        Decimal::from_f64(row.bid)?,
        Decimal::from_f64(row.ask)?,
        Decimal::from_f64(row.last)?,
        row.volume,
        row.open_interest,
        row.implied_volatility,
        greeks,
        greeks_source,
    )
    .ok()
}

/// `open_interest >= 100`, `volume >= 1`, `spread/mid <= 0.30`, delta band
/// only applied when Greeks are present; sorted by open interest desc.
pub fn filter_contracts_inner(contracts: Vec<OptionContract>) -> Vec<OptionContract> {
    let mut filtered: Vec<OptionContract> = contracts
        .into_iter()
        .filter(|c| c.open_interest >= MIN_OPEN_INTEREST)
        .filter(|c| c.volume >= MIN_VOLUME)
        .filter(|c| {
            let mid = c.mid();
            let spread = c.spread();
            if mid.is_zero() {
                return spread.is_zero();
            }
            let ratio = (spread / mid).abs();
            ratio <= Decimal::from_f64(MAX_SPREAD_RATIO).unwrap()
        })
        .filter(|c| match &c.greeks {
            Some(g) => {
                let abs_delta = g.delta.abs();
                (DELTA_MIN_ABS..=DELTA_MAX_ABS).contains(&abs_delta)
            }
            None => true,
        })
        .collect();

    filtered.sort_by(|a, b| b.open_interest.cmp(&a.open_interest));
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i64::from(day))
    }

    #[test]
    fn picks_nearest_to_45_within_window() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let expirations = vec![d(10), d(35), d(44), d(60), d(90)];
        let picked = pick_expiration(&expirations, today).unwrap();
        assert_eq!(picked, d(44));
    }

    #[test]
    fn falls_back_to_nearest_overall_when_none_in_window() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let expirations = vec![d(5), d(200)];
        let picked = pick_expiration(&expirations, today).unwrap();
        assert_eq!(picked, d(5));
    }

    #[test]
    fn drops_illiquid_zero_quote_rows() {
        let row = RawOptionRow {
            strike: 100.0,
            bid: 0.0,
            ask: 0.0,
            last: 0.0,
            volume: 10,
            open_interest: 500,
            implied_volatility: 0.3,
            delta: None,
            gamma: None,
            theta: None,
            vega: None,
            rho: None,
        };
        assert!(row_to_contract("AAPL", OptionType::Call, d(45), &row).is_none());
    }

    #[test]
    fn filter_enforces_delta_band_only_when_greeks_present() {
        let with_greeks_out_of_band = OptionContract::new(
            "AAPL",
            OptionType::Call,
            Decimal::from(100),
            d(45),
            Decimal::from(1),
            Decimal::from(1),
            Decimal::from(1),
            10,
            200,
            0.3,
            Some(OptionGreeks::new(0.8, 0.01, -0.02, 0.1, 0.01).unwrap()),
            Some(GreeksSource::Market),
        )
        .unwrap();
        let filtered = filter_contracts_inner(vec![with_greeks_out_of_band]);
        assert!(filtered.is_empty());
    }
}
