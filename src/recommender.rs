//! Pure three-stage funnel from a raw contract list down to a single pick:
//! side filter + liquidity, nearest-to-45-DTE expiration, then delta band.
//! Ground truth: `original_source/services/options_data.py`'s
//! `_filter_contracts` (stage 1) and spec prose for stages 2-3 (no single
//! `recommend_contract` survived distillation into the original sources).

use chrono::NaiveDate;

use crate::domain::{OptionContract, SignalDirection};
use crate::services::options_data::{filter_contracts_inner, pick_expiration, DELTA_MAX_ABS, DELTA_MIN_ABS};

/// Target delta for stage 3 — the midpoint of `[DELTA_MIN_ABS, DELTA_MAX_ABS]`.
pub const DELTA_TARGET_ABS: f64 = 0.35;

/// Side filter (bullish keeps calls, bearish keeps puts, neutral keeps
/// nothing) followed by the liquidity/delta-band filter shared with the
/// options-data service.
pub fn filter_contracts(contracts: Vec<OptionContract>, direction: SignalDirection) -> Vec<OptionContract> {
    let side_filtered: Vec<OptionContract> = match direction {
        SignalDirection::Bullish => contracts
            .into_iter()
            .filter(|c| c.option_type == crate::domain::OptionType::Call)
            .collect(),
        SignalDirection::Bearish => contracts
            .into_iter()
            .filter(|c| c.option_type == crate::domain::OptionType::Put)
            .collect(),
        SignalDirection::Neutral => Vec::new(),
    };
    filter_contracts_inner(side_filtered)
}

/// Picks the expiration nearest to the 45-DTE target (within the
/// `options_data` window, falling back to nearest overall) and returns all
/// contracts at that expiration.
pub fn select_expiration(contracts: Vec<OptionContract>, today: NaiveDate) -> Vec<OptionContract> {
    let expirations: Vec<NaiveDate> = contracts.iter().map(|c| c.expiration).collect();
    let Some(chosen) = pick_expiration(&expirations, today) else {
        return Vec::new();
    };
    contracts.into_iter().filter(|c| c.expiration == chosen).collect()
}

/// Among contracts carrying Greeks, picks the one with `|delta|` closest to
/// 0.35 while staying within `[0.30, 0.40]`. `None` if no contract has
/// Greeks, or none falls in the band.
pub fn select_by_delta(contracts: &[OptionContract]) -> Option<&OptionContract> {
    contracts
        .iter()
        .filter_map(|c| c.greeks.map(|g| (c, g.delta.abs())))
        .filter(|(_, abs_delta)| (DELTA_MIN_ABS..=DELTA_MAX_ABS).contains(abs_delta))
        .min_by(|(_, a), (_, b)| (a - DELTA_TARGET_ABS).abs().partial_cmp(&(b - DELTA_TARGET_ABS).abs()).unwrap())
        .map(|(c, _)| c)
}

/// Composes all three stages; returns at most one contract.
pub fn recommend_contract(
    contracts: Vec<OptionContract>,
    direction: SignalDirection,
    today: NaiveDate,
) -> Option<OptionContract> {
    let filtered = filter_contracts(contracts, direction);
    let at_expiration = select_expiration(filtered, today);
    select_by_delta(&at_expiration).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OptionGreeks, OptionType};
    use rust_decimal_macros::dec;

    fn contract(
        option_type: OptionType,
        expiration: NaiveDate,
        delta: Option<f64>,
        open_interest: u64,
    ) -> OptionContract {
        let greeks = delta.map(|d| OptionGreeks::new(d, 0.01, -0.02, 0.1, 0.01).unwrap());
        let greeks_source = greeks.map(|_| crate::domain::GreeksSource::Market);
        OptionContract::new(
            "AAPL",
            option_type,
            dec!(100),
            expiration,
            dec!(1.0),
            dec!(1.1),
            dec!(1.05),
            50,
            open_interest,
            0.25,
            greeks,
            greeks_source,
        )
        .unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i64::from(day))
    }

    #[test]
    fn neutral_direction_yields_no_contracts() {
        let contracts = vec![contract(OptionType::Call, d(45), Some(0.35), 500)];
        assert!(filter_contracts(contracts, SignalDirection::Neutral).is_empty());
    }

    #[test]
    fn bullish_keeps_only_calls() {
        let contracts = vec![
            contract(OptionType::Call, d(45), Some(0.35), 500),
            contract(OptionType::Put, d(45), Some(0.35), 500),
        ];
        let filtered = filter_contracts(contracts, SignalDirection::Bullish);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].option_type, OptionType::Call);
    }

    #[test]
    fn select_by_delta_picks_closest_to_target_within_band() {
        let contracts = vec![
            contract(OptionType::Call, d(45), Some(0.31), 500),
            contract(OptionType::Call, d(45), Some(0.36), 500),
            contract(OptionType::Call, d(45), Some(0.50), 500),
        ];
        let picked = select_by_delta(&contracts).unwrap();
        assert_eq!(picked.greeks.unwrap().delta, 0.36);
    }

    #[test]
    fn select_by_delta_returns_none_without_greeks() {
        let contracts = vec![contract(OptionType::Call, d(45), None, 500)];
        assert!(select_by_delta(&contracts).is_none());
    }

    #[test]
    fn recommend_contract_composes_all_three_stages() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let contracts = vec![
            contract(OptionType::Call, d(44), Some(0.35), 500),
            contract(OptionType::Call, d(90), Some(0.35), 500),
            contract(OptionType::Put, d(44), Some(0.35), 500),
        ];
        let picked = recommend_contract(contracts, SignalDirection::Bullish, today).unwrap();
        assert_eq!(picked.option_type, OptionType::Call);
        assert_eq!(picked.expiration, d(44));
    }
}
