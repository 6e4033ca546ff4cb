// src/utils/mod.rs
pub mod error;
pub mod logging;

pub use error::{AppError, ExtractError, MalformedInput, StorageError}; // Re-export error types for convenience
