// src/utils/error.rs
use thiserror::Error;

/// Structural problems with a plate reader export.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedInput {
    #[error("no recognised plate read header found")]
    NoHeaderFound,

    #[error("input ends at the plate read header at row {marker_line} with no usable column header row")]
    TruncatedAfterHeader { marker_line: usize },

    #[error("no blank row follows the plate read header at row {marker_line}")]
    NoBlankRowFound { marker_line: usize },

    #[error("section {section} (header at row {marker_line}) does not match the first section's geometry: {reason}")]
    GeometryMismatch {
        section: usize,
        marker_line: usize,
        reason: String,
    },

    #[error("section {section} repeats row label '{label}'")]
    DuplicateRowLabel { section: usize, label: String },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] MalformedInput),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ExtractError {
    /// The structural cause, if this is a malformed-input failure.
    pub fn malformed(&self) -> Option<&MalformedInput> {
        match self {
            ExtractError::MalformedInput(cause) => Some(cause),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
