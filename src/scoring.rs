//! Composite scoring and direction classification.
//! `direction.py` itself did not survive distillation into the retrieved
//! sources; `determine_direction`'s branching was reverse-engineered from
//! `tests/unit/analysis/test_direction.py`'s boundary/tiebreak matrix alone.
//! `web/scan_pipeline.py` grounds the call shape of the catalyst
//! adjustment, whose own coefficients were never pinned down in the
//! sources this was distilled from — see `ScoringConfig`.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::ScoringConfig;
use crate::domain::{resort_and_rerank, SignalDirection, TickerScore};
use crate::error::ValidationError;

const ADX_TREND_THRESHOLD: f64 = 15.0;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_MIDPOINT: f64 = 50.0;
const SMA_BULLISH_THRESHOLD: f64 = 0.5;
const SMA_BEARISH_THRESHOLD: f64 = -0.5;

/// Directional signals not included in the composite average; they carry
/// magnitude rather than direction and are passed through to the `signals`
/// map untouched.
const MAGNITUDE_ONLY_SIGNALS: &[&str] = &["adx", "atr_percent", "bb_width", "keltner_width", "relative_volume"];

/// Signals whose sign/magnitude feeds the composite score, each already
/// normalized to roughly `[-1, 1]` by `indicators`.
const DIRECTIONAL_SIGNALS: &[&str] = &[
    "rsi",
    "stoch_rsi",
    "williams_r",
    "roc",
    "sma_alignment",
    "obv_trend",
    "ad_trend",
    "vwap_deviation",
    "supertrend",
];

/// Maps a raw indicator reading to a `[-1, 1]` direction contribution.
/// `rsi`/`stoch_rsi`/`williams_r` are oscillators centered away from zero,
/// so each gets its own rescale; the rest are already signed.
fn direction_contribution(name: &str, value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let contribution = match name {
        "rsi" | "stoch_rsi" => (RSI_MIDPOINT - value) / RSI_MIDPOINT,
        "williams_r" => (value + 50.0) / 50.0,
        "roc" => (value / 10.0).clamp(-1.0, 1.0),
        "sma_alignment" | "obv_trend" | "ad_trend" | "vwap_deviation" | "supertrend" => {
            value.clamp(-1.0, 1.0)
        }
        _ => return None,
    };
    Some(contribution.clamp(-1.0, 1.0))
}

/// Classifies trend direction from ADX (trend strength gate), RSI (momentum
/// zone), and SMA alignment (trend slope), mirroring the scoring rubric
/// exactly: RSI and SMA each contribute to a bullish/bearish tally using
/// half-open zone boundaries, and a tie between nonzero tallies is broken by
/// the sign of `sma_alignment`.
pub fn determine_direction(adx: f64, rsi: f64, sma_alignment: f64) -> SignalDirection {
    if adx < ADX_TREND_THRESHOLD {
        return SignalDirection::Neutral;
    }

    let mut bullish_score = 0.0;
    let mut bearish_score = 0.0;

    if rsi < RSI_OVERSOLD {
        bullish_score += 1.0;
    } else if rsi < RSI_MIDPOINT {
        bullish_score += 0.5;
    } else if rsi > RSI_OVERBOUGHT {
        bearish_score += 1.0;
    } else if rsi > RSI_MIDPOINT {
        bearish_score += 0.5;
    }

    if sma_alignment > SMA_BULLISH_THRESHOLD {
        bullish_score += 1.0;
    } else if sma_alignment < SMA_BEARISH_THRESHOLD {
        bearish_score += 1.0;
    }

    if bullish_score > bearish_score {
        SignalDirection::Bullish
    } else if bearish_score > bullish_score {
        SignalDirection::Bearish
    } else if bullish_score == 0.0 {
        SignalDirection::Neutral
    } else if sma_alignment > 0.0 {
        SignalDirection::Bullish
    } else if sma_alignment < 0.0 {
        SignalDirection::Bearish
    } else {
        SignalDirection::Neutral
    }
}

/// Linear day-count penalty, zero once the next known catalyst (earnings
/// date) is further out than `catalyst_horizon_days` trading days; `None`
/// (no known date) also scores zero proximity.
pub fn catalyst_proximity_score(
    next_earnings: Option<NaiveDate>,
    reference_date: NaiveDate,
    config: &ScoringConfig,
) -> f64 {
    let Some(earnings_date) = next_earnings else {
        return 0.0;
    };
    let days_out = (earnings_date - reference_date).num_days();
    if days_out < 0 || days_out > config.catalyst_horizon_days {
        return 0.0;
    }
    1.0 - (days_out as f64 / config.catalyst_horizon_days as f64)
}

/// Shrinks a composite score toward zero as a known catalyst approaches,
/// reflecting the added event risk without discarding the base signal.
pub fn apply_catalyst_adjustment(score: f64, proximity: f64, config: &ScoringConfig) -> f64 {
    score * (1.0 - proximity * config.catalyst_max_penalty)
}

/// Scores every ticker's indicator map against a `0-100` composite derived
/// from the average of its directional contributions, then ranks densely by
/// score descending. Tickers with no usable directional signal score `50.0`
/// (neutral) rather than being dropped.
pub fn score_universe(
    universe_indicators: &HashMap<String, HashMap<String, f64>>,
) -> Result<Vec<TickerScore>, ValidationError> {
    let mut scores = Vec::with_capacity(universe_indicators.len());

    for (ticker, signals) in universe_indicators {
        let contributions: Vec<f64> = DIRECTIONAL_SIGNALS
            .iter()
            .filter_map(|name| signals.get(*name).and_then(|v| direction_contribution(name, *v)))
            .collect();

        let composite = if contributions.is_empty() {
            50.0
        } else {
            let average = contributions.iter().sum::<f64>() / contributions.len() as f64;
            (50.0 + 50.0 * average).clamp(0.0, 100.0)
        };

        scores.push(TickerScore::new(ticker.clone(), composite, signals.clone(), 1)?);
    }

    let _ = MAGNITUDE_ONLY_SIGNALS;
    Ok(resort_and_rerank(scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adx_below_threshold_is_always_neutral() {
        assert_eq!(determine_direction(0.0, 20.0, 1.0), SignalDirection::Neutral);
        assert_eq!(determine_direction(10.0, 80.0, -1.0), SignalDirection::Neutral);
        assert_eq!(determine_direction(14.9, 50.0, 0.0), SignalDirection::Neutral);
        assert_eq!(determine_direction(14.99, 25.0, 0.8), SignalDirection::Neutral);
    }

    #[test]
    fn adx_exactly_at_threshold_proceeds_to_scoring() {
        assert_eq!(
            determine_direction(ADX_TREND_THRESHOLD, 25.0, 0.8),
            SignalDirection::Bullish
        );
    }

    #[test]
    fn rsi_boundary_values_fall_into_mild_zones() {
        assert_eq!(determine_direction(25.0, RSI_OVERSOLD, 0.0), SignalDirection::Bullish);
        assert_eq!(determine_direction(25.0, RSI_OVERBOUGHT, 0.0), SignalDirection::Bearish);
        assert_eq!(determine_direction(25.0, RSI_MIDPOINT, 0.0), SignalDirection::Neutral);
    }

    #[test]
    fn sma_boundary_values_require_strict_inequality() {
        assert_eq!(
            determine_direction(25.0, 75.0, SMA_BULLISH_THRESHOLD),
            SignalDirection::Bearish
        );
        assert_eq!(
            determine_direction(25.0, 25.0, SMA_BEARISH_THRESHOLD),
            SignalDirection::Bullish
        );
    }

    #[test]
    fn tie_breaks_on_sma_sign() {
        assert_eq!(determine_direction(25.0, 20.0, -0.8), SignalDirection::Bearish);
        assert_eq!(determine_direction(25.0, 80.0, 0.8), SignalDirection::Bullish);
    }

    #[test]
    fn zero_zero_tie_is_neutral_with_no_tiebreak() {
        assert_eq!(determine_direction(25.0, 50.0, 0.0), SignalDirection::Neutral);
    }

    #[test]
    fn mild_rsi_loses_to_strong_opposing_sma() {
        assert_eq!(determine_direction(25.0, 40.0, -0.8), SignalDirection::Bearish);
        assert_eq!(determine_direction(25.0, 60.0, 0.8), SignalDirection::Bullish);
    }

    #[test]
    fn catalyst_proximity_is_zero_beyond_horizon() {
        let config = ScoringConfig::default();
        let reference = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let far = reference + chrono::Duration::days(30);
        assert_eq!(catalyst_proximity_score(Some(far), reference, &config), 0.0);
        assert_eq!(catalyst_proximity_score(None, reference, &config), 0.0);
    }

    #[test]
    fn catalyst_proximity_peaks_at_zero_days_out() {
        let config = ScoringConfig::default();
        let reference = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert_eq!(catalyst_proximity_score(Some(reference), reference, &config), 1.0);
    }

    #[test]
    fn catalyst_adjustment_shrinks_score_toward_zero() {
        let config = ScoringConfig::default();
        let adjusted = apply_catalyst_adjustment(80.0, 1.0, &config);
        assert!((adjusted - 80.0 * (1.0 - config.catalyst_max_penalty)).abs() < 1e-9);
        assert_eq!(apply_catalyst_adjustment(80.0, 0.0, &config), 80.0);
    }

    #[test]
    fn score_universe_ranks_bullish_above_bearish() {
        let mut bullish = HashMap::new();
        bullish.insert("rsi".to_string(), 20.0);
        bullish.insert("sma_alignment".to_string(), 0.8);

        let mut bearish = HashMap::new();
        bearish.insert("rsi".to_string(), 80.0);
        bearish.insert("sma_alignment".to_string(), -0.8);

        let mut universe = HashMap::new();
        universe.insert("BULL".to_string(), bullish);
        universe.insert("BEAR".to_string(), bearish);

        let scores = score_universe(&universe).unwrap();
        assert_eq!(scores[0].ticker, "BULL");
        assert_eq!(scores[0].rank, 1);
        assert_eq!(scores[1].ticker, "BEAR");
        assert!(scores[0].score > scores[1].score);
    }

    #[test]
    fn score_universe_defaults_neutral_tickers_to_fifty() {
        let mut universe = HashMap::new();
        universe.insert("FLAT".to_string(), HashMap::new());
        let scores = score_universe(&universe).unwrap();
        assert_eq!(scores[0].score, 50.0);
    }
}
