// src/extractors/table.rs
use serde::Serialize;

use super::section::{Measurement, LABEL_COLUMN_OFFSET};

/// One plate read: the body of a single report section.
///
/// Rows are labelled by the first field of each body row (the well row letter),
/// columns by their field position in the source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    /// Zero-based ordinal of the section within the file.
    pub section: usize,
    /// Row index of the header marker that introduced the section.
    pub marker_line: usize,
    pub measurement: Measurement,
    header: Vec<String>,
    row_labels: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn new(
        section: usize,
        marker_line: usize,
        measurement: Measurement,
        header: Vec<String>,
        row_labels: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self { section, marker_line, measurement, header, row_labels, rows }
    }

    /// (row_count, column_count)
    pub fn shape(&self) -> (usize, usize) {
        (self.row_labels.len(), self.header.len())
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    /// Field positions of the data columns in the source rows.
    pub fn column_labels(&self) -> Vec<usize> {
        (LABEL_COLUMN_OFFSET..LABEL_COLUMN_OFFSET + self.header.len()).collect()
    }

    /// Text of the column header row for each data column (e.g. "01".."12").
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Data cells of the first row carrying `label`.
    pub fn row(&self, label: &str) -> Option<&[String]> {
        self.row_labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.rows[i].as_slice())
    }

    /// Cell at row `label`, column label `column` (source field position).
    pub fn get(&self, label: &str, column: usize) -> Option<&str> {
        let index = column.checked_sub(LABEL_COLUMN_OFFSET)?;
        self.row(label)?.get(index).map(String::as_str)
    }
}
