//! Cross-implementation accuracy checks on output payloads

use crate::error::{EngineError, EngineResult};
use crate::projection::SimulationOutput;

/// Agreement required between two implementations (0.01%)
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// One value that differs by more than the tolerance
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub label: String,
    pub reference: f64,
    pub candidate: f64,
    pub relative_diff: f64,
}

impl Mismatch {
    pub fn into_error(self, tolerance: f64) -> EngineError {
        EngineError::AccuracyMismatch {
            label: self.label,
            reference: self.reference,
            candidate: self.candidate,
            relative_diff: self.relative_diff,
            tolerance,
        }
    }
}

/// Difference scaled by the larger magnitude, floored at 1 so values near
/// zero are compared absolutely
pub fn relative_diff(reference: f64, candidate: f64) -> f64 {
    if reference == candidate {
        return 0.0;
    }
    let scale = reference.abs().max(candidate.abs()).max(1.0);
    (reference - candidate).abs() / scale
}

/// Every accounts-table entry and terminal period value that disagrees
///
/// A label present on only one side, or a different number of periods,
/// counts as a mismatch with `NaN` standing in for the missing value.
pub fn find_mismatches(
    reference: &SimulationOutput,
    candidate: &SimulationOutput,
    tolerance: f64,
) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    let mut check = |label: String, a: f64, b: f64| {
        let diff = relative_diff(a, b);
        // NaN never compares within tolerance
        if !(diff <= tolerance) {
            mismatches.push(Mismatch {
                label,
                reference: a,
                candidate: b,
                relative_diff: diff,
            });
        }
    };

    for (label, &value) in &reference.accounts_table {
        let other = candidate.account(label).unwrap_or(f64::NAN);
        check(format!("accounts_table.{}", label), value, other);
    }
    for (label, &value) in &candidate.accounts_table {
        if !reference.accounts_table.contains_key(label) {
            check(format!("accounts_table.{}", label), f64::NAN, value);
        }
    }

    let (ref_len, cand_len) = (reference.pathdf.len(), candidate.pathdf.len());
    if ref_len != cand_len {
        check("pathdf.len".to_string(), ref_len as f64, cand_len as f64);
        return mismatches;
    }

    let last = ref_len.checked_sub(1);
    let rows = last.and_then(|i| Some((reference.pathdf.row(i)?, candidate.pathdf.row(i)?)));
    if let Some((ref_row, cand_row)) = rows {
        for ((field, a), (_, b)) in ref_row.numeric_fields().into_iter().zip(cand_row.numeric_fields()) {
            check(format!("pathdf.{}[{}]", field, ref_len - 1), a, b);
        }
    }

    mismatches
}

/// Fail with the first disagreement, if any
pub fn verify_outputs(
    reference: &SimulationOutput,
    candidate: &SimulationOutput,
    tolerance: f64,
) -> EngineResult<()> {
    match find_mismatches(reference, candidate, tolerance).into_iter().next() {
        Some(mismatch) => Err(mismatch.into_error(tolerance)),
        None => Ok(()),
    }
}
