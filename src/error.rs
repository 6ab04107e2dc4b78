//! Structural validation failures raised while merging a condition bucket.
//!
//! These abort the run. They travel inside `anyhow::Error` and can be
//! recovered with `downcast_ref::<ValidationError>()`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{condition}: loaded {loaded} of {expected} selected file(s)")]
    MissingFiles {
        condition: String,
        expected: usize,
        loaded: usize,
    },
    #[error("{condition}: file '{file}' has no header line")]
    MissingHeader { condition: String, file: String },
    #[error(
        "{condition}: header of '{file}' differs from header of '{baseline}' at column {column}"
    )]
    HeaderMismatch {
        condition: String,
        baseline: String,
        file: String,
        column: usize,
    },
    #[error("{condition}: expected {expected} data row(s) but {stage} found {actual}")]
    RowCountMismatch {
        condition: String,
        stage: CountStage,
        expected: usize,
        actual: usize,
    },
}

/// Where a row count was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountStage {
    Written,
    Reread,
}

impl std::fmt::Display for CountStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountStage::Written => f.write_str("the writer"),
            CountStage::Reread => f.write_str("re-reading the output"),
        }
    }
}
