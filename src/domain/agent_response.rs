use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRole {
    Bull,
    Bear,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GreeksCited {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub role: AgentRole,
    pub analysis: String,
    pub key_points: Vec<String>,
    pub conviction: f64,
    pub contracts_referenced: Vec<String>,
    pub greeks_cited: GreeksCited,
    pub model_used: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl AgentResponse {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: AgentRole,
        analysis: impl Into<String>,
        key_points: Vec<String>,
        conviction: f64,
        contracts_referenced: Vec<String>,
        greeks_cited: GreeksCited,
        model_used: impl Into<String>,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&conviction) {
            return Err(ValidationError::new(
                "conviction",
                format!("{conviction} out of [0, 1]"),
            ));
        }
        Ok(Self {
            role,
            analysis: analysis.into(),
            key_points,
            conviction,
            contracts_referenced,
            greeks_cited,
            model_used: model_used.into(),
            input_tokens,
            output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_conviction_out_of_range() {
        assert!(AgentResponse::new(
            AgentRole::Bull,
            "x",
            vec![],
            1.5,
            vec![],
            GreeksCited::default(),
            "m",
            0,
            0
        )
        .is_err());
    }
}
