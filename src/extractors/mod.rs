// src/extractors/mod.rs
pub mod rows;
pub mod section;
pub mod table;

// Re-export key extraction types for convenience
pub use rows::{RawContent, Row};
pub use section::{
    ExtractOptions,
    Geometry,
    Measurement,
    PlateReads,
    SectionExtractor,
    HEADER_MARKERS,
};
pub use table::Table;
