// src/extractors/section.rs

// --- Imports ---
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::rows::{is_blank, RawContent, Row};
use super::table::Table;
use crate::utils::error::{ExtractError, MalformedInput};

// --- Constants ---
/// Header rows recognised as the start of a plate read, matched exactly as a
/// single-field row.
pub const HEADER_MARKERS: [&str; 2] = [
    "Calculated results: Calc 1: Average within well = Average of repeat measurements where Measurement: Meas A",
    "Calculated results: Calc 2: Avg = Average of the scanning points where Measurement : Meas A",
];

/// The well row letter leading every body row.
pub const LABEL_COLUMN_OFFSET: usize = 1;
/// The empty field left by the separator closing every row.
pub const TRAILING_FIELD_OFFSET: usize = 1;
/// The column header row between a marker and the body.
pub const HEADER_ROW_OFFSET: usize = 1;
/// The blank row closing a body.
pub const TERMINATOR_ROW_OFFSET: usize = 1;

const MARKER_ROW_OFFSET: usize = 1;

// --- Data Structures ---
/// The measurement a section reports, identified by its header marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    /// Calc 1: average of repeat measurements within each well.
    AverageWithinWell,
    /// Calc 2: average of the scanning points.
    ScanAverage,
}

impl Measurement {
    pub fn from_row(row: &[String]) -> Option<Self> {
        match row {
            [only] if only == HEADER_MARKERS[0] => Some(Measurement::AverageWithinWell),
            [only] if only == HEADER_MARKERS[1] => Some(Measurement::ScanAverage),
            _ => None,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Measurement::AverageWithinWell => HEADER_MARKERS[0],
            Measurement::ScanAverage => HEADER_MARKERS[1],
        }
    }
}

/// Shape shared by every plate read in one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Reject sections that repeat a row label instead of keeping both rows.
    pub require_unique_labels: bool,
}

#[derive(Debug, Clone, Copy)]
struct Section {
    ordinal: usize,
    marker_line: usize,
    measurement: Measurement,
}

impl Section {
    fn body_start(&self) -> usize {
        self.marker_line + MARKER_ROW_OFFSET + HEADER_ROW_OFFSET
    }
}

// --- Main Extractor Structure ---
#[derive(Debug, Clone, Default)]
pub struct SectionExtractor {
    options: ExtractOptions,
}

impl SectionExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Extracts every plate read from a CSV export.
    ///
    /// The stream is read and scanned in full before this returns: marker
    /// discovery, geometry inference and validation of every section happen
    /// here, so a malformed file fails without yielding any table. Tables are
    /// then sliced out one at a time as the returned iterator is advanced.
    pub fn extract<R: Read>(&self, reader: R) -> Result<PlateReads, ExtractError> {
        let content = RawContent::read(reader)?;
        self.extract_content(content)
    }

    /// Opens `path` and extracts from it.
    pub fn extract_path<P: AsRef<Path>>(&self, path: P) -> Result<PlateReads, ExtractError> {
        let file = File::open(path.as_ref())?;
        tracing::debug!("Reading plate reader export {}", path.as_ref().display());
        self.extract(BufReader::new(file))
    }

    pub fn extract_content(&self, content: RawContent) -> Result<PlateReads, ExtractError> {
        // Geometry comes from the first section only
        let geometry = infer_geometry(&content)?;
        let sections = find_sections(&content);
        tracing::debug!(
            "Found {} plate reads of {} rows x {} columns",
            sections.len(),
            geometry.row_count,
            geometry.column_count
        );

        // Validate everything up front so a bad file yields no tables
        for section in &sections {
            self.validate_section(&content, geometry, section)?;
        }

        Ok(PlateReads {
            content,
            geometry,
            sections: sections.into_iter(),
        })
    }

    /// Checks that a section's body slice holds only data rows.
    fn validate_section(
        &self,
        content: &RawContent,
        geometry: Geometry,
        section: &Section,
    ) -> Result<(), MalformedInput> {
        let mismatch = |reason: String| MalformedInput::GeometryMismatch {
            section: section.ordinal,
            marker_line: section.marker_line,
            reason,
        };

        // The slice must fit inside the input
        let start = section.body_start();
        let end = start + geometry.row_count;
        if end > content.len() {
            return Err(mismatch(format!(
                "body needs rows {}..{} but the input has {} rows",
                start,
                end,
                content.len()
            )));
        }

        // Every sliced row must be a data row
        let mut labels = HashSet::new();
        for (index, row) in content.rows()[start..end].iter().enumerate() {
            let index = start + index;
            if is_blank(row) {
                return Err(mismatch(format!("row {} is blank", index)));
            }
            if Measurement::from_row(row).is_some() {
                return Err(mismatch(format!("row {} is another plate read header", index)));
            }
            if self.options.require_unique_labels && !labels.insert(row[0].as_str()) {
                return Err(MalformedInput::DuplicateRowLabel {
                    section: section.ordinal,
                    label: row[0].clone(),
                });
            }
        }

        Ok(())
    }
}

/// Derives the geometry from the first section: columns from its column
/// header row, rows from the distance to the first blank row after it.
pub fn infer_geometry(content: &RawContent) -> Result<Geometry, MalformedInput> {
    let rows = content.rows();

    // 1. Locate the first header marker
    let marker_line = rows
        .iter()
        .position(|row| Measurement::from_row(row).is_some())
        .ok_or(MalformedInput::NoHeaderFound)?;

    // 2. Column count from the column header row (minus label and trailing field)
    let header_line = marker_line + MARKER_ROW_OFFSET;
    let column_count = rows
        .get(header_line)
        .and_then(|row| row.len().checked_sub(LABEL_COLUMN_OFFSET + TRAILING_FIELD_OFFSET))
        .ok_or(MalformedInput::TruncatedAfterHeader { marker_line })?;

    // 3. The first blank row after the column header row closes the body
    let blank_line = rows
        .iter()
        .enumerate()
        .skip(header_line + HEADER_ROW_OFFSET)
        .find(|(_, row)| is_blank(row))
        .map(|(index, _)| index)
        .ok_or(MalformedInput::NoBlankRowFound { marker_line })?;

    // 4. Rows between the column header row and the blank row
    let row_count = (blank_line - marker_line) - HEADER_ROW_OFFSET - TERMINATOR_ROW_OFFSET;

    Ok(Geometry { row_count, column_count })
}

fn find_sections(content: &RawContent) -> Vec<Section> {
    content
        .rows()
        .iter()
        .enumerate()
        .filter_map(|(line, row)| Measurement::from_row(row).map(|m| (line, m)))
        .enumerate()
        .map(|(ordinal, (marker_line, measurement))| Section {
            ordinal,
            marker_line,
            measurement,
        })
        .collect()
}

/// Takes the fields at data positions, padding short rows with empty cells.
fn data_cells(row: &Row, column_count: usize) -> Vec<String> {
    (LABEL_COLUMN_OFFSET..LABEL_COLUMN_OFFSET + column_count)
        .map(|position| row.get(position).cloned().unwrap_or_default())
        .collect()
}

// --- Lazy Sequence ---
/// Plate reads of one file, in the order their headers appear.
///
/// Single pass: each [`Table`] is built from its slice of the file when
/// requested.
#[derive(Debug)]
pub struct PlateReads {
    content: RawContent,
    geometry: Geometry,
    sections: std::vec::IntoIter<Section>,
}

impl PlateReads {
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn build_table(&self, section: Section) -> Table {
        let column_count = self.geometry.column_count;
        let start = section.body_start();
        let body = &self.content.rows()[start..start + self.geometry.row_count];
        tracing::trace!(
            "Slicing plate read {} from rows {}..{}",
            section.ordinal,
            start,
            start + body.len()
        );

        let header = self
            .content
            .get(section.marker_line + MARKER_ROW_OFFSET)
            .map(|row| data_cells(row, column_count))
            .unwrap_or_default();
        let row_labels = body.iter().map(|row| row[0].clone()).collect();
        let rows = body.iter().map(|row| data_cells(row, column_count)).collect();

        Table::new(
            section.ordinal,
            section.marker_line,
            section.measurement,
            header,
            row_labels,
            rows,
        )
    }
}

impl Iterator for PlateReads {
    type Item = Table;

    fn next(&mut self) -> Option<Table> {
        let section = self.sections.next()?;
        Some(self.build_table(section))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.sections.size_hint()
    }
}

impl ExactSizeIterator for PlateReads {}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn csv(lines: &[&str]) -> String {
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    fn metadata(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("Plate info {},value,", i)).collect()
    }

    /// Marker at row 5, header at 6 (4 fields), body 7..=9, blank at 10.
    fn single_section() -> String {
        let mut lines = metadata(5);
        lines.push(HEADER_MARKERS[0].to_string());
        lines.extend([",01,02,", "A,1,2,", "B,3,4,", "C,5,6,", ""].map(String::from));
        lines.push("Trailer,text".to_string());
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        csv(&refs)
    }

    /// Markers at rows 5 and 20 sharing the same geometry.
    fn two_sections() -> String {
        let mut lines = metadata(5);
        lines.push(HEADER_MARKERS[0].to_string());
        lines.extend([",01,02,", "A,1,2,", "B,3,4,", "C,5,6,", ""].map(String::from));
        lines.extend(metadata(9));
        lines.push(HEADER_MARKERS[1].to_string());
        lines.extend([",01,02,", "A,7,8,", "B,9,10,", "C,11,12,", ""].map(String::from));
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        csv(&refs)
    }

    fn extract(text: &str) -> Result<Vec<Table>, ExtractError> {
        SectionExtractor::new()
            .extract(Cursor::new(text.to_string()))
            .map(|reads| reads.collect())
    }

    fn malformed(text: &str) -> MalformedInput {
        let err = extract(text).unwrap_err();
        err.malformed().cloned().unwrap_or_else(|| panic!("expected malformed input, got {:?}", err))
    }

    #[test]
    fn test_single_section_geometry_and_labels() {
        let reads = SectionExtractor::new().extract(Cursor::new(single_section())).unwrap();
        assert_eq!(reads.geometry(), Geometry { row_count: 3, column_count: 2 });

        let tables: Vec<Table> = reads.collect();
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.shape(), (3, 2));
        assert_eq!(table.row_labels(), &["A", "B", "C"]);
        assert_eq!(table.header(), &["01", "02"]);
        assert_eq!(table.rows()[2], vec!["5", "6"]);
        assert_eq!(table.marker_line, 5);
        assert_eq!(table.measurement, Measurement::AverageWithinWell);
    }

    #[test]
    fn test_two_sections_in_marker_order() {
        let reads = SectionExtractor::new().extract(Cursor::new(two_sections())).unwrap();
        assert_eq!(reads.len(), 2);

        let tables: Vec<Table> = reads.collect();
        assert_eq!(tables[0].marker_line, 5);
        assert_eq!(tables[1].marker_line, 20);
        assert_eq!(tables[0].section, 0);
        assert_eq!(tables[1].section, 1);
        assert_eq!(tables[1].measurement, Measurement::ScanAverage);
        assert_eq!(tables[0].shape(), tables[1].shape());
        assert_eq!(tables[1].get("C", 2), Some("12"));
        assert_eq!(tables[0].get("C", 2), Some("6"));
    }

    #[test]
    fn test_labels_come_from_rows_after_marker() {
        let text = two_sections();
        let content = RawContent::parse(&text).unwrap();
        let tables = extract(&text).unwrap();
        for table in &tables {
            for (k, label) in table.row_labels().iter().enumerate() {
                assert_eq!(label, &content.rows()[table.marker_line + 2 + k][0]);
            }
        }
    }

    #[test]
    fn test_multiline_quoted_metadata_keeps_row_positions() {
        let text = format!(
            "Plate,\"note line 1\n\nnote line 3\",\n{}\n,01,02,\nA,1,2,\nB,3,4,\n\n",
            HEADER_MARKERS[0]
        );
        let reads = SectionExtractor::new().extract(Cursor::new(text)).unwrap();
        assert_eq!(reads.geometry(), Geometry { row_count: 2, column_count: 2 });

        let tables: Vec<Table> = reads.collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].marker_line, 1);
        assert_eq!(tables[0].row_labels(), &["A", "B"]);
        assert_eq!(tables[0].get("B", 2), Some("4"));
    }

    #[test]
    fn test_repeated_extraction_is_deterministic() {
        let text = two_sections();
        assert_eq!(extract(&text).unwrap(), extract(&text).unwrap());
    }

    #[test]
    fn test_no_header_found() {
        let text = csv(&["Plate,1,", "", "A,1,2,", ""]);
        assert_eq!(malformed(&text), MalformedInput::NoHeaderFound);
    }

    #[test]
    fn test_marker_must_match_exactly() {
        let lowered = HEADER_MARKERS[0].to_lowercase();
        let with_field = format!("{},", HEADER_MARKERS[0]);
        let text = csv(&[lowered.as_str(), ",01,", "A,1,", "", with_field.as_str(), ",01,", "A,1,", ""]);
        assert_eq!(malformed(&text), MalformedInput::NoHeaderFound);
    }

    #[test]
    fn test_quoted_marker_is_recognised() {
        let quoted = format!("\"{}\"", HEADER_MARKERS[1]);
        let tables = extract(&csv(&[quoted.as_str(), ",01,", "A,1,", ""])).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].measurement, Measurement::ScanAverage);
    }

    #[test]
    fn test_truncated_after_header() {
        let text = csv(&["Plate,1,", HEADER_MARKERS[0]]);
        assert_eq!(malformed(&text), MalformedInput::TruncatedAfterHeader { marker_line: 1 });
    }

    #[test]
    fn test_short_column_header_row_is_truncated() {
        let text = csv(&[HEADER_MARKERS[0], "only", "A,1,", ""]);
        assert_eq!(malformed(&text), MalformedInput::TruncatedAfterHeader { marker_line: 0 });
    }

    #[test]
    fn test_no_blank_row_found() {
        let text = csv(&["Plate,1,", HEADER_MARKERS[0], ",01,02,", "A,1,2,", "B,3,4,"]);
        assert_eq!(malformed(&text), MalformedInput::NoBlankRowFound { marker_line: 1 });
    }

    #[test]
    fn test_shorter_later_section_is_rejected() {
        let text = csv(&[
            HEADER_MARKERS[0], ",01,", "A,1,", "B,2,", "",
            HEADER_MARKERS[0], ",01,", "A,3,", "", "Trailer",
        ]);
        match malformed(&text) {
            MalformedInput::GeometryMismatch { section, marker_line, reason } => {
                assert_eq!(section, 1);
                assert_eq!(marker_line, 5);
                assert!(reason.contains("blank"), "unexpected reason: {}", reason);
            }
            other => panic!("expected geometry mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_section_running_past_end_is_rejected() {
        let text = csv(&[
            HEADER_MARKERS[0], ",01,", "A,1,", "B,2,", "",
            HEADER_MARKERS[1], ",01,", "A,3,",
        ]);
        assert!(matches!(
            malformed(&text),
            MalformedInput::GeometryMismatch { section: 1, .. }
        ));
    }

    #[test]
    fn test_marker_inside_body_is_rejected() {
        let text = csv(&[
            HEADER_MARKERS[0], ",01,", "A,1,", "B,2,", "",
            HEADER_MARKERS[0], ",01,", HEADER_MARKERS[1], ",01,", "A,1,",
        ]);
        match malformed(&text) {
            MalformedInput::GeometryMismatch { section, reason, .. } => {
                assert_eq!(section, 1);
                assert!(reason.contains("header"), "unexpected reason: {}", reason);
            }
            other => panic!("expected geometry mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_longer_later_section_is_truncated() {
        let text = csv(&[
            HEADER_MARKERS[0], ",01,", "A,1,", "",
            HEADER_MARKERS[0], ",01,", "A,2,", "B,3,", "",
        ]);
        let tables = extract(&text).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].row_labels(), &["A"]);
        assert_eq!(tables[1].get("A", 1), Some("2"));
    }

    #[test]
    fn test_short_rows_are_padded_and_extra_fields_dropped() {
        let text = csv(&[HEADER_MARKERS[0], ",01,02,03,", "A,1,", "B,1,2,3,4,5", ""]);
        let tables = extract(&text).unwrap();
        assert_eq!(tables[0].rows()[0], vec!["1", "", ""]);
        assert_eq!(tables[0].rows()[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn test_empty_body() {
        let text = csv(&[HEADER_MARKERS[0], ",01,02,", ""]);
        let tables = extract(&text).unwrap();
        assert_eq!(tables[0].shape(), (0, 2));
    }

    #[test]
    fn test_duplicate_labels_are_kept_by_default() {
        let text = csv(&[HEADER_MARKERS[0], ",01,", "A,1,", "A,2,", ""]);
        let tables = extract(&text).unwrap();
        assert_eq!(tables[0].row_labels(), &["A", "A"]);
        assert_eq!(tables[0].get("A", 1), Some("1"));
    }

    #[test]
    fn test_duplicate_labels_rejected_when_required() {
        let text = csv(&[HEADER_MARKERS[0], ",01,", "A,1,", "A,2,", ""]);
        let extractor = SectionExtractor::with_options(ExtractOptions { require_unique_labels: true });
        let err = extractor.extract(Cursor::new(text)).unwrap_err();
        assert_eq!(
            err.malformed(),
            Some(&MalformedInput::DuplicateRowLabel { section: 0, label: "A".to_string() })
        );
    }

    #[test]
    fn test_realistic_export_with_bom_and_crlf() {
        let text = [
            "\u{feff}Plate information",
            "Plate,Repeat,Barcode,Measured height,Chamber temperature at start,",
            "1,1,,11.10,23.40,",
            "",
            HEADER_MARKERS[0],
            ",01,02,03,",
            "A,0.101,0.102,0.103,",
            "B,0.201,0.202,0.203,",
            "",
            "Basic assay information ",
            "Assay: ,Absorbance,",
            "",
        ]
        .join("\r\n");
        let tables = extract(&text).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].shape(), (2, 3));
        assert_eq!(tables[0].get("B", 3), Some("0.203"));
    }

    #[test]
    fn test_tables_are_yielded_lazily() {
        let mut reads = SectionExtractor::new().extract(Cursor::new(two_sections())).unwrap();
        assert_eq!(reads.len(), 2);
        let first = reads.next().unwrap();
        assert_eq!(first.section, 0);
        assert_eq!(reads.len(), 1);
        assert!(reads.next().is_some());
        assert!(reads.next().is_none());
    }

    #[test]
    fn test_measurement_marker_roundtrip() {
        for measurement in [Measurement::AverageWithinWell, Measurement::ScanAverage] {
            let row = vec![measurement.marker().to_string()];
            assert_eq!(Measurement::from_row(&row), Some(measurement));
        }
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ExtractOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ExtractOptions::default());
        let options: ExtractOptions = serde_json::from_str(r#"{"require_unique_labels":true}"#).unwrap();
        assert!(options.require_unique_labels);
    }
}
