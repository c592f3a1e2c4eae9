//! Black-Scholes-Merton pricing, Greeks, and an implied-volatility solver.
//! Ground truth: `original_source/analysis/bsm.py`.
//!
//! References: Hull, J.C. "Options, Futures, and Other Derivatives" (11th
//! ed.), ch. 15.

use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::domain::{OptionGreeks, OptionType};
use crate::error::PricingError;

pub const BSM_MAX_ITERATIONS: u32 = 50;
pub const BSM_TOLERANCE: f64 = 1e-8;
pub const BSM_IV_LOWER_BOUND: f64 = 0.001;
pub const BSM_IV_UPPER_BOUND: f64 = 5.0;
pub const BSM_BISECTION_MAX_ITERATIONS: u32 = 100;
pub const DAYS_PER_YEAR: f64 = 365.0;
pub const BSM_IV_INITIAL_GUESS: f64 = 0.30;

fn standard_normal() -> Normal {
    Normal::new(0.0, 1.0).expect("standard normal parameters are always valid")
}

fn d1(spot: f64, strike: f64, time_to_expiry: f64, risk_free_rate: f64, iv: f64) -> f64 {
    let numerator = (spot / strike).ln() + (risk_free_rate + iv * iv / 2.0) * time_to_expiry;
    let denominator = iv * time_to_expiry.sqrt();
    numerator / denominator
}

fn d2(d1_value: f64, iv: f64, time_to_expiry: f64) -> f64 {
    d1_value - iv * time_to_expiry.sqrt()
}

fn validate_inputs(spot: f64, strike: f64, time_to_expiry: f64, iv: f64) -> Result<(), PricingError> {
    if spot <= 0.0 {
        return Err(PricingError::InvalidInput {
            field: "spot".to_string(),
            detail: format!("must be positive, got {spot}"),
        });
    }
    if strike <= 0.0 {
        return Err(PricingError::InvalidInput {
            field: "strike".to_string(),
            detail: format!("must be positive, got {strike}"),
        });
    }
    if time_to_expiry <= 0.0 {
        return Err(PricingError::InvalidInput {
            field: "time_to_expiry".to_string(),
            detail: format!("must be positive, got {time_to_expiry}"),
        });
    }
    if iv <= 0.0 {
        return Err(PricingError::InvalidInput {
            field: "iv".to_string(),
            detail: format!("must be positive, got {iv}"),
        });
    }
    Ok(())
}

/// Theoretical European option price.
pub fn bsm_price(
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    risk_free_rate: f64,
    iv: f64,
    option_type: OptionType,
) -> Result<f64, PricingError> {
    validate_inputs(spot, strike, time_to_expiry, iv)?;

    let normal = standard_normal();
    let d1_val = d1(spot, strike, time_to_expiry, risk_free_rate, iv);
    let d2_val = d2(d1_val, iv, time_to_expiry);
    let discount_factor = (-risk_free_rate * time_to_expiry).exp();

    let price = match option_type {
        OptionType::Call => {
            spot * normal.cdf(d1_val) - strike * discount_factor * normal.cdf(d2_val)
        }
        OptionType::Put => {
            strike * discount_factor * normal.cdf(-d2_val) - spot * normal.cdf(-d1_val)
        }
    };
    Ok(price)
}

/// Full BSM Greeks; theta is normalized to a per-day value.
pub fn bsm_greeks(
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    risk_free_rate: f64,
    iv: f64,
    option_type: OptionType,
) -> Result<OptionGreeks, crate::error::ValidationError> {
    validate_inputs(spot, strike, time_to_expiry, iv)
        .map_err(|e| crate::error::ValidationError::new("bsm_greeks", e.to_string()))?;

    let normal = standard_normal();
    let d1_val = d1(spot, strike, time_to_expiry, risk_free_rate, iv);
    let d2_val = d2(d1_val, iv, time_to_expiry);
    let sqrt_t = time_to_expiry.sqrt();
    let discount_factor = (-risk_free_rate * time_to_expiry).exp();
    let n_d1_pdf = normal.pdf(d1_val);

    let gamma = n_d1_pdf / (spot * iv * sqrt_t);
    let vega = spot * n_d1_pdf * sqrt_t;

    let (delta, theta_annual, rho) = match option_type {
        OptionType::Call => {
            let delta = normal.cdf(d1_val);
            let theta_annual = -(spot * n_d1_pdf * iv) / (2.0 * sqrt_t)
                - risk_free_rate * strike * discount_factor * normal.cdf(d2_val);
            let rho = strike * time_to_expiry * discount_factor * normal.cdf(d2_val);
            (delta, theta_annual, rho)
        }
        OptionType::Put => {
            let delta = normal.cdf(d1_val) - 1.0;
            let theta_annual = -(spot * n_d1_pdf * iv) / (2.0 * sqrt_t)
                + risk_free_rate * strike * discount_factor * normal.cdf(-d2_val);
            let rho = -strike * time_to_expiry * discount_factor * normal.cdf(-d2_val);
            (delta, theta_annual, rho)
        }
    };

    let theta_daily = theta_annual / DAYS_PER_YEAR;

    OptionGreeks::new(delta, gamma, theta_daily, vega, rho)
        .map_err(|e| crate::error::ValidationError::new("bsm_greeks", e.to_string()))
}

fn european_lower_bound(
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    risk_free_rate: f64,
    option_type: OptionType,
) -> f64 {
    let discount_factor = (-risk_free_rate * time_to_expiry).exp();
    match option_type {
        OptionType::Call => (spot - strike * discount_factor).max(0.0),
        OptionType::Put => (strike * discount_factor - spot).max(0.0),
    }
}

fn newton_raphson_iv(
    market_price: f64,
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    risk_free_rate: f64,
    option_type: OptionType,
) -> Option<f64> {
    let normal = standard_normal();
    let mut vol = BSM_IV_INITIAL_GUESS;

    for _ in 0..BSM_MAX_ITERATIONS {
        let price = bsm_price(spot, strike, time_to_expiry, risk_free_rate, vol, option_type).ok()?;
        let diff = price - market_price;

        if diff.abs() < BSM_TOLERANCE {
            return Some(vol);
        }

        let d1_val = d1(spot, strike, time_to_expiry, risk_free_rate, vol);
        let sqrt_t = time_to_expiry.sqrt();
        let vega = spot * normal.pdf(d1_val) * sqrt_t;

        if vega < BSM_TOLERANCE {
            return None;
        }

        vol -= diff / vega;

        if !vol.is_finite() || vol <= BSM_IV_LOWER_BOUND || vol >= BSM_IV_UPPER_BOUND {
            return None;
        }
    }

    None
}

fn bisection_iv(
    market_price: f64,
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    risk_free_rate: f64,
    option_type: OptionType,
) -> Option<f64> {
    let mut low = BSM_IV_LOWER_BOUND;
    let mut high = BSM_IV_UPPER_BOUND;

    let price_low = bsm_price(spot, strike, time_to_expiry, risk_free_rate, low, option_type).ok()?;
    let price_high = bsm_price(spot, strike, time_to_expiry, risk_free_rate, high, option_type).ok()?;

    if (price_low - market_price) * (price_high - market_price) > 0.0 {
        return None;
    }

    for _ in 0..BSM_BISECTION_MAX_ITERATIONS {
        let mid = (low + high) / 2.0;
        let price_mid = bsm_price(spot, strike, time_to_expiry, risk_free_rate, mid, option_type).ok()?;
        let diff = price_mid - market_price;

        if diff.abs() < BSM_TOLERANCE {
            return Some(mid);
        }

        if diff > 0.0 {
            high = mid;
        } else {
            low = mid;
        }
    }

    Some((low + high) / 2.0)
}

/// Solves for implied volatility via Newton-Raphson, falling back to
/// bisection if the Newton step diverges or lands on a near-zero vega.
pub fn implied_volatility(
    market_price: f64,
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    risk_free_rate: f64,
    option_type: OptionType,
) -> Result<f64, PricingError> {
    if time_to_expiry <= 0.0 {
        return Err(PricingError::InvalidInput {
            field: "time_to_expiry".to_string(),
            detail: format!("must be positive, got {time_to_expiry}"),
        });
    }
    if market_price <= 0.0 {
        return Err(PricingError::InvalidInput {
            field: "market_price".to_string(),
            detail: format!("must be positive, got {market_price}"),
        });
    }

    let lower_bound = european_lower_bound(spot, strike, time_to_expiry, risk_free_rate, option_type);
    if market_price < lower_bound - BSM_TOLERANCE {
        return Err(PricingError::BelowLowerBound {
            market_price,
            lower_bound,
        });
    }

    if let Some(iv) = newton_raphson_iv(market_price, spot, strike, time_to_expiry, risk_free_rate, option_type) {
        return Ok(iv);
    }

    tracing::info!("Newton-Raphson did not converge, falling back to bisection method");
    if let Some(iv) = bisection_iv(market_price, spot, strike, time_to_expiry, risk_free_rate, option_type) {
        return Ok(iv);
    }

    Err(PricingError::DidNotConverge {
        newton_iterations: BSM_MAX_ITERATIONS,
        bisection_iterations: BSM_BISECTION_MAX_ITERATIONS,
    })
}
