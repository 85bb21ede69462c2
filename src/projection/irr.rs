//! Internal rate of return on lender cashflows

const TOLERANCE: f64 = 1e-10;
const MAX_ITERATIONS: usize = 1000;

/// Lowest and highest periodic rates searched
const RATE_FLOOR: f64 = -0.99;
const RATE_CEILING: f64 = 10.0;

/// Annualized IRR of a periodic cashflow series
///
/// `cashflows[0]` is at origination, `cashflows[t]` at the end of period `t`.
/// Newton-Raphson from a 5% annual guess, falling back to bisection when the
/// derivative vanishes or the iteration does not settle. Returns `None` when
/// the flows never change sign.
pub fn annualized_irr(cashflows: &[f64], periods_per_year: u32) -> Option<f64> {
    if cashflows.is_empty() {
        return None;
    }
    if cashflows.iter().all(|cf| cf.abs() < 1e-10) {
        return Some(0.0);
    }
    let has_inflow = cashflows.iter().any(|&cf| cf > 1e-10);
    let has_outflow = cashflows.iter().any(|&cf| cf < -1e-10);
    if !has_inflow || !has_outflow {
        return None;
    }

    let periodic = newton(cashflows, 0.05 / periods_per_year as f64)
        .or_else(|| bisection(cashflows))?;
    Some((1.0 + periodic).powi(periods_per_year as i32) - 1.0)
}

fn newton(cashflows: &[f64], guess: f64) -> Option<f64> {
    let mut rate = guess;
    for _ in 0..MAX_ITERATIONS {
        let (npv, slope) = npv_and_slope(cashflows, rate);
        if slope.abs() < 1e-20 {
            return None;
        }
        let next = (rate - npv / slope).clamp(RATE_FLOOR, RATE_CEILING);
        if (next - rate).abs() < TOLERANCE {
            return Some(next);
        }
        rate = next;
    }
    None
}

fn bisection(cashflows: &[f64]) -> Option<f64> {
    let mut low = RATE_FLOOR;
    let mut high = RATE_CEILING;
    let mut npv_low = npv(cashflows, low);
    if npv_low * npv(cashflows, high) > 0.0 {
        return None;
    }

    for _ in 0..MAX_ITERATIONS {
        let mid = 0.5 * (low + high);
        let npv_mid = npv(cashflows, mid);
        if npv_mid.abs() < TOLERANCE || 0.5 * (high - low) < TOLERANCE {
            return Some(mid);
        }
        if npv_mid * npv_low < 0.0 {
            high = mid;
        } else {
            low = mid;
            npv_low = npv_mid;
        }
    }
    None
}

/// NPV and its derivative with respect to the periodic rate
fn npv_and_slope(cashflows: &[f64], rate: f64) -> (f64, f64) {
    let v = 1.0 / (1.0 + rate);
    let mut discount = 1.0;
    let mut npv = 0.0;
    let mut slope = 0.0;
    for (t, &cf) in cashflows.iter().enumerate() {
        npv += cf * discount;
        slope -= t as f64 * cf * discount * v;
        discount *= v;
    }
    (npv, slope)
}

fn npv(cashflows: &[f64], rate: f64) -> f64 {
    npv_and_slope(cashflows, rate).0
}
