// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::extractors::{Geometry, Table};
use crate::utils::error::StorageError;

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
        }

        Ok(Self { base_dir: base_path })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Saves one plate read as CSV: a header line from the column header row,
    /// then one line per body row with its label first.
    pub fn save_table(&self, stem: &str, table: &Table) -> Result<PathBuf, StorageError> {
        // One file per section: <stem>_section<N>.csv
        let filename = format!("{}_section{}.csv", stem, table.section);
        let file_path = self.base_dir.join(filename);

        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&file_path)?;

        // Header line: empty label cell, then the column header text
        let mut header = vec![String::new()];
        header.extend(table.header().iter().cloned());
        writer.write_record(&header)?;

        // Body rows, label first
        for (label, cells) in table.row_labels().iter().zip(table.rows()) {
            writer.write_record(std::iter::once(label).chain(cells))?;
        }

        // Check for error rather than implicitly flushing and ignoring.
        writer.flush()?;

        tracing::info!("Saved section {} to {}", table.section, file_path.display());

        Ok(file_path)
    }

    /// Saves metadata about the extraction in JSON format
    pub fn save_metadata(
        &self,
        stem: &str,
        source: &Path,
        geometry: Geometry,
        tables: &[Table],
    ) -> Result<PathBuf, StorageError> {
        let filename = format!("{}_meta.json", stem);
        let file_path = self.base_dir.join(filename);

        // Per-section summary
        let sections: Vec<_> = tables
            .iter()
            .map(|table| {
                serde_json::json!({
                    "section": table.section,
                    "marker_line": table.marker_line,
                    "measurement": table.measurement,
                    "row_labels": table.row_labels(),
                })
            })
            .collect();

        let metadata = serde_json::json!({
            "source": source.display().to_string(),
            "geometry": geometry,
            "section_count": tables.len(),
            "sections": sections,
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        // Write the metadata to the file
        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, metadata_str)?;

        tracing::info!("Saved metadata to {}", file_path.display());

        Ok(file_path)
    }
}
