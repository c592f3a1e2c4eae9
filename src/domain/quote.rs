use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A point-in-time bid/ask/last snapshot for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: u64,
    pub timestamp_utc: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        ticker: impl Into<String>,
        bid: Decimal,
        ask: Decimal,
        last: Decimal,
        volume: u64,
        timestamp_utc: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if bid > Decimal::ZERO && ask > Decimal::ZERO && bid > ask {
            return Err(ValidationError::new(
                "bid",
                format!("bid ({bid}) must be <= ask ({ask}) when both are positive"),
            ));
        }
        Ok(Self {
            ticker: ticker.into(),
            bid,
            ask,
            last,
            volume,
            timestamp_utc,
        })
    }

    /// Midpoint of bid/ask. Not stored; derived on demand.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }

    /// Bid-ask spread. Not stored; derived on demand.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn derives_mid_and_spread() {
        let quote = Quote::new("AAPL", dec!(100), dec!(101), dec!(100.5), 1000, Utc::now()).unwrap();
        assert_eq!(quote.mid(), dec!(100.5));
        assert_eq!(quote.spread(), dec!(1));
    }

    #[test]
    fn rejects_bid_above_ask() {
        let err = Quote::new("AAPL", dec!(101), dec!(100), dec!(100.5), 1000, Utc::now())
            .unwrap_err();
        assert_eq!(err.field, "bid");
    }

    #[test]
    fn allows_zero_bid_or_ask() {
        // A zero quote side (no market) is not validated against the other side.
        let quote = Quote::new("AAPL", dec!(0), dec!(0), dec!(0), 0, Utc::now()).unwrap();
        assert_eq!(quote.mid(), dec!(0));
    }
}
