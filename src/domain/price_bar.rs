use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A single OHLCV bar. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl PriceBar {
    pub fn new(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if value <= Decimal::ZERO {
                return Err(ValidationError::new(field, format!("{value} must be > 0")));
            }
        }
        let lowest_open_close = open.min(close);
        let highest_open_close = open.max(close);
        if low > lowest_open_close {
            return Err(ValidationError::new(
                "low",
                format!("{low} must be <= min(open, close) = {lowest_open_close}"),
            ));
        }
        if high < highest_open_close {
            return Err(ValidationError::new(
                "high",
                format!("{high} must be >= max(open, close) = {highest_open_close}"),
            ));
        }
        Ok(Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn accepts_a_consistent_bar() {
        let bar = PriceBar::new(date(), dec!(100), dec!(105), dec!(99), dec!(102), 1_000).unwrap();
        assert_eq!(bar.volume, 1_000);
    }

    #[test]
    fn rejects_low_above_open_close_min() {
        let err = PriceBar::new(date(), dec!(100), dec!(105), dec!(101), dec!(102), 1_000)
            .unwrap_err();
        assert_eq!(err.field, "low");
    }

    #[test]
    fn rejects_high_below_open_close_max() {
        let err = PriceBar::new(date(), dec!(100), dec!(101), dec!(99), dec!(102), 1_000)
            .unwrap_err();
        assert_eq!(err.field, "high");
    }

    #[test]
    fn rejects_non_positive_close() {
        let err = PriceBar::new(date(), dec!(100), dec!(105), dec!(99), dec!(0), 1_000)
            .unwrap_err();
        assert_eq!(err.field, "close");
    }
}
