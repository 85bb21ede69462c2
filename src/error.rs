//! Error taxonomy for the simulation engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("Invalid loan terms: {0}")]
    InvalidTerms(String),

    /// The history is empty, or a scenario handed to the engine covers
    /// fewer periods than the loan. Short or misaligned windows built by the
    /// generator are clamped or padded instead.
    #[error("Insufficient history: need {required} periods, series has {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Simulation diverged at period {period}: {field} is {value}")]
    SimulationDiverged {
        period: u32,
        field: &'static str,
        value: f64,
    },

    #[error("Accuracy mismatch on '{label}': reference {reference}, candidate {candidate} (relative diff {relative_diff:.3e} > {tolerance:.3e})")]
    AccuracyMismatch {
        label: String,
        reference: f64,
        candidate: f64,
        relative_diff: f64,
        tolerance: f64,
    },

    #[error("Historical series error: {0}")]
    Series(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
