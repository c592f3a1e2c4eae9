use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::greeks::OptionGreeks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

/// Provenance of the Greeks attached to a contract: quoted by the vendor,
/// computed by our own BSM pricer, or produced by some other model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GreeksSource {
    Market,
    Calculated,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub ticker: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: u64,
    pub open_interest: u64,
    pub iv: f64,
    pub greeks: Option<OptionGreeks>,
    pub greeks_source: Option<GreeksSource>,
}

impl OptionContract {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticker: impl Into<String>,
        option_type: OptionType,
        strike: Decimal,
        expiration: NaiveDate,
        bid: Decimal,
        ask: Decimal,
        last: Decimal,
        volume: u64,
        open_interest: u64,
        iv: f64,
        greeks: Option<OptionGreeks>,
        greeks_source: Option<GreeksSource>,
    ) -> Result<Self, ValidationError> {
        if strike <= Decimal::ZERO {
            return Err(ValidationError::new("strike", format!("{strike} must be > 0")));
        }
        if iv <= 0.0 {
            return Err(ValidationError::new("iv", format!("{iv} must be > 0")));
        }
        if greeks.is_some() != greeks_source.is_some() {
            return Err(ValidationError::new(
                "greeks_source",
                "greeks and greeks_source must both be present or both absent".to_string(),
            ));
        }
        Ok(Self {
            ticker: ticker.into(),
            option_type,
            strike,
            expiration,
            bid,
            ask,
            last,
            volume,
            open_interest,
            iv,
            greeks,
            greeks_source,
        })
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Days to expiration relative to `as_of`. Signed — negative once expired.
    pub fn dte(&self, as_of: NaiveDate) -> i64 {
        (self.expiration - as_of).num_days()
    }
}
