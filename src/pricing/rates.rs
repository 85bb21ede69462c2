//! Average financing rate over a historical window
//!
//! Two formulations of the same geometric mean are kept side by side: the
//! closed form used by the normalizer and a running product that mirrors
//! how the reference scripts accumulate the rate. They must agree to 1e-8.

use crate::error::{EngineError, EngineResult};

/// Closed form: `(prod(1 + r_i))^(1/n) - 1`
///
/// The product is taken in log space so 30 years of monthly observations
/// cannot overflow.
pub fn geometric_mean_rate(rates: &[f64]) -> EngineResult<f64> {
    if rates.is_empty() {
        return Err(EngineError::Series(
            "cannot average an empty rate window".to_string(),
        ));
    }
    let log_sum: f64 = rates.iter().map(|r| (1.0 + r).ln()).sum();
    let mean = (log_sum / rates.len() as f64).exp() - 1.0;
    if !mean.is_finite() {
        return Err(EngineError::Series(format!(
            "geometric mean is not finite ({}); a rate at or below -100% is present",
            mean
        )));
    }
    Ok(mean)
}

/// Sequential formulation: compound one observation at a time, taking the
/// n-th root incrementally
pub fn running_product_rate(rates: &[f64]) -> EngineResult<f64> {
    if rates.is_empty() {
        return Err(EngineError::Series(
            "cannot average an empty rate window".to_string(),
        ));
    }
    let n = rates.len() as f64;
    let mut accumulated = 1.0_f64;
    for r in rates {
        accumulated *= (1.0 + r).powf(1.0 / n);
    }
    let mean = accumulated - 1.0;
    if !mean.is_finite() {
        return Err(EngineError::Series(format!("running product is not finite ({})", mean)));
    }
    Ok(mean)
}
