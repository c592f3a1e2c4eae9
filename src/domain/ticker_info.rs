use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketCapTier {
    Micro,
    Small,
    Mid,
    Large,
    Mega,
    Etf,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    Equity,
    Etf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickerStatus {
    Active,
    Inactive,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerInfo {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub market_cap_tier: MarketCapTier,
    pub asset_type: AssetType,
    pub source: String,
    pub tags: Vec<String>,
    pub status: TickerStatus,
    pub discovered_at: DateTime<Utc>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub consecutive_misses: u32,
}

impl TickerInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        sector: impl Into<String>,
        market_cap_tier: MarketCapTier,
        asset_type: AssetType,
        source: impl Into<String>,
        tags: Vec<String>,
        status: TickerStatus,
        discovered_at: DateTime<Utc>,
        last_scanned_at: Option<DateTime<Utc>>,
        consecutive_misses: u32,
    ) -> Result<Self, ValidationError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(ValidationError::new("symbol", "must not be empty".to_string()));
        }
        Ok(Self {
            symbol,
            name: name.into(),
            sector: sector.into(),
            market_cap_tier,
            asset_type,
            source: source.into(),
            tags,
            status,
            discovered_at,
            last_scanned_at,
            consecutive_misses,
        })
    }

    /// Returns a copy with the miss counter reset to zero and status
    /// restored to active, as happens when `refresh` observes the symbol
    /// present again.
    pub fn with_miss_reset(&self) -> Self {
        Self {
            consecutive_misses: 0,
            status: TickerStatus::Active,
            ..self.clone()
        }
    }

    /// Returns a copy with the miss counter incremented, transitioning to
    /// `Inactive` once it reaches the auto-deactivation threshold.
    pub fn with_miss_incremented(&self, threshold: u32) -> Self {
        let consecutive_misses = self.consecutive_misses + 1;
        let status = if consecutive_misses >= threshold {
            TickerStatus::Inactive
        } else {
            self.status
        };
        Self {
            consecutive_misses,
            status,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TickerInfo {
        TickerInfo::new(
            "AAPL",
            "Apple Inc.",
            "Information Technology",
            MarketCapTier::Mega,
            AssetType::Equity,
            "cboe",
            vec![],
            TickerStatus::Active,
            Utc::now(),
            None,
            0,
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_symbol() {
        let err = TickerInfo::new(
            "",
            "x",
            "x",
            MarketCapTier::Unknown,
            AssetType::Equity,
            "cboe",
            vec![],
            TickerStatus::Active,
            Utc::now(),
            None,
            0,
        )
        .unwrap_err();
        assert_eq!(err.field, "symbol");
    }

    #[test]
    fn deactivates_after_threshold_misses() {
        let mut ticker = base();
        for _ in 0..2 {
            ticker = ticker.with_miss_incremented(3);
            assert_eq!(ticker.status, TickerStatus::Active);
        }
        ticker = ticker.with_miss_incremented(3);
        assert_eq!(ticker.status, TickerStatus::Inactive);
        assert_eq!(ticker.consecutive_misses, 3);
    }

    #[test]
    fn miss_reset_reactivates() {
        let ticker = base().with_miss_incremented(1);
        assert_eq!(ticker.status, TickerStatus::Inactive);
        let reset = ticker.with_miss_reset();
        assert_eq!(reset.status, TickerStatus::Active);
        assert_eq!(reset.consecutive_misses, 0);
    }
}
