// src/lib.rs
//! Extraction of plate reads from EnSpire multilabel plate reader CSV exports.
pub mod extractors;
pub mod storage;
pub mod utils;

pub use extractors::{ExtractOptions, Geometry, Measurement, PlateReads, SectionExtractor, Table};
pub use storage::StorageManager;
pub use utils::{AppError, ExtractError, MalformedInput, StorageError};
