//! Errors
//!
//! Custom error types used throughout the `expressivity_audit` crate.
use thiserror::Error;

/// Errors that can occur while auditing a dataset.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A least-squares system could not be factorised.
    #[error("Singular matrix encountered while solving {0}.")]
    SingularMatrix(String),
    /// First value is what was being checked, second is expected length, third is what was passed.
    #[error("Dimension mismatch for {0}, expected {1} but {2} provided.")]
    DimensionMismatch(String, usize, usize),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// A column name could not be found in the dataset.
    #[error("Column {0} is not present in the dataset.")]
    UnknownColumn(String),
    /// The chosen strategy needs expressivity scores, but none were supplied.
    #[error("No expressivity scores were supplied for the {0} split.")]
    MissingExpressivity(String),
    /// The dataset has no rows or no feature columns.
    #[error("The dataset is empty: {0}.")]
    EmptyDataset(String),
    /// Unable to write output to file.
    #[error("Unable to write to file: {0}")]
    UnableToWrite(String),
    /// Unable to read input from file.
    #[error("Unable to read from file {0}")]
    UnableToRead(String),
}
