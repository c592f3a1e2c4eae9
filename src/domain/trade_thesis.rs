use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Bullish,
    Bearish,
    Neutral,
}

/// Model id stamped on a thesis produced without an LLM, when the debate
/// orchestrator falls back to a data-driven summary.
pub const FALLBACK_MODEL_NAME: &str = "data-driven-fallback";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeThesis {
    pub direction: SignalDirection,
    pub conviction: f64,
    pub entry_rationale: String,
    pub risk_factors: Vec<String>,
    pub recommended_action: String,
    pub bull_summary: String,
    pub bear_summary: String,
    pub model_used: String,
    pub total_tokens: u32,
    pub duration_ms: u64,
    pub disclaimer: String,
}

impl TradeThesis {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        direction: SignalDirection,
        conviction: f64,
        entry_rationale: impl Into<String>,
        risk_factors: Vec<String>,
        recommended_action: impl Into<String>,
        bull_summary: impl Into<String>,
        bear_summary: impl Into<String>,
        model_used: impl Into<String>,
        total_tokens: u32,
        duration_ms: u64,
        disclaimer: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&conviction) {
            return Err(ValidationError::new(
                "conviction",
                format!("{conviction} out of [0, 1]"),
            ));
        }
        let disclaimer = disclaimer.into();
        if disclaimer.trim().is_empty() {
            return Err(ValidationError::new("disclaimer", "must not be empty".to_string()));
        }
        Ok(Self {
            direction,
            conviction,
            entry_rationale: entry_rationale.into(),
            risk_factors,
            recommended_action: recommended_action.into(),
            bull_summary: bull_summary.into(),
            bear_summary: bear_summary.into(),
            model_used: model_used.into(),
            total_tokens,
            duration_ms,
            disclaimer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_disclaimer() {
        let err = TradeThesis::new(
            SignalDirection::Bullish,
            0.5,
            "r",
            vec![],
            "buy",
            "b",
            "b",
            "m",
            0,
            0,
            "",
        )
        .unwrap_err();
        assert_eq!(err.field, "disclaimer");
    }

    #[test]
    fn accepts_a_well_formed_thesis() {
        let thesis = TradeThesis::new(
            SignalDirection::Neutral,
            0.2,
            "r",
            vec!["IV crush risk".to_string()],
            "hold",
            "b",
            "b",
            FALLBACK_MODEL_NAME,
            0,
            12,
            "Not financial advice.",
        )
        .unwrap();
        assert!(!thesis.disclaimer.is_empty());
    }
}
