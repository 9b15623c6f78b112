use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions raised by the endpoint pipeline.
///
/// Pipeline functions return `anyhow::Result`; callers that need to branch on
/// the failure kind can `downcast_ref::<AnalysisError>()` the error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("no usable recording found in {0} given path(s)")]
    NoRecordingFound(usize),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("spreadsheet {0:?} has no sheet without 'summary' in its name")]
    NoUsableSheet(PathBuf),

    #[error("pairing basis must be either 'maxima' or 'minima', got '{0}'")]
    InvalidBasis(String),

    #[error("required parameter '{0}' was not supplied")]
    MissingParameter(&'static str),

    #[error("parameter '{name}' must be finite and positive, got {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("not enough extrema to compute {endpoint}: {detail}")]
    InsufficientExtrema {
        endpoint: &'static str,
        detail: String,
    },

    #[error(
        "summary table {summary:?} is locked by {holder}; delete {lock:?} if no other run is active"
    )]
    SummaryLocked {
        summary: PathBuf,
        lock: PathBuf,
        holder: String,
    },
}
