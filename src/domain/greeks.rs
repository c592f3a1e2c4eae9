use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Option Greeks. Rejected at construction if any value falls outside its
/// documented range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

impl OptionGreeks {
    pub fn new(delta: f64, gamma: f64, theta: f64, vega: f64, rho: f64) -> Result<Self, ValidationError> {
        if !(-1.0..=1.0).contains(&delta) {
            return Err(ValidationError::new("delta", format!("{delta} out of [-1, 1]")));
        }
        if gamma < 0.0 {
            return Err(ValidationError::new("gamma", format!("{gamma} must be >= 0")));
        }
        if vega < 0.0 {
            return Err(ValidationError::new("vega", format!("{vega} must be >= 0")));
        }
        if !theta.is_finite() || !rho.is_finite() {
            return Err(ValidationError::new("theta/rho", "must be finite".to_string()));
        }
        Ok(Self {
            delta,
            gamma,
            theta,
            vega,
            rho,
        })
    }
}
