//! The closed error taxonomy for the loader, classifier, and summarizer.

use std::path::PathBuf;

/// Every error the core can raise, carrying enough context (file path,
/// column name, configuration name) to reproduce the failure.
#[derive(Debug, thiserror::Error)]
pub enum CellpyError {
    #[error("file not found: {path} (loader config: {config})")]
    FileNotFound { path: PathBuf, config: String },

    #[error("unreadable file: {path} (loader config: {config}): {reason}")]
    UnreadableFile {
        path: PathBuf,
        config: String,
        reason: String,
    },

    #[error("unrecognized format for {path} (loader config: {config})")]
    UnrecognizedFormat { path: PathBuf, config: String },

    #[error("unsupported archive version {found} (expected {expected}) in {path}")]
    UnsupportedVersion {
        path: PathBuf,
        found: String,
        expected: String,
    },

    #[error("missing required column \"{column}\" (loader config: {config})")]
    MissingRequiredColumn { column: String, config: String },

    #[error("unit mismatch converting \"{from}\" to \"{to}\": dimensions do not reduce to dimensionless")]
    UnitMismatch { from: String, to: String },

    /// Never raised by the classifier itself (ambiguity is downgraded to
    /// `StepType::NotKnown`); kept as a variant so callers that re-validate
    /// a steps table can report it explicitly.
    #[error("step classification ambiguous for cycle {cycle} step {step}")]
    StepClassificationAmbiguous { cycle: i64, step: i64 },

    #[error("bad step: (cycle {cycle}, step {step}) excluded by caller")]
    BadStep { cycle: i64, step: i64 },

    #[error("cell is empty: no rows in raw table (config: {config})")]
    EmptyCell { config: String },
}

pub type Result<T> = std::result::Result<T, CellpyError>;
