// src/extractors/rows.rs
use std::io::{self, Read};

use csv::{ReaderBuilder, StringRecord};

use crate::utils::error::ExtractError;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// One line of the export, split into fields.
pub type Row = Vec<String>;

/// The whole export as an ordered list of rows.
///
/// Blank lines are kept as rows with zero fields: they terminate the plate
/// bodies, and the `csv` reader on its own would silently drop them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawContent {
    rows: Vec<Row>,
}

impl RawContent {
    /// Reads the stream to the end and splits it into rows.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, ExtractError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::parse_bytes(&bytes)
    }

    pub fn parse(text: &str) -> Result<Self, ExtractError> {
        Self::parse_bytes(text.as_bytes())
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ExtractError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        // One reader over the whole input, so quoted fields may span lines.
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);
        let mut record = StringRecord::new();

        let blanks = scan_records(bytes);
        let mut rows = Vec::with_capacity(blanks.len());
        for blank in blanks {
            // The reader skips blank lines; put them back in place.
            if blank {
                rows.push(Vec::new());
                continue;
            }
            if !rdr.read_record(&mut record)? {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("CSV reader ended early at row {}", rows.len()),
                )
                .into());
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        tracing::trace!("Parsed {} rows from {} bytes", rows.len(), bytes.len());
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A row with no fields, or only one empty field.
pub fn is_blank(row: &[String]) -> bool {
    match row {
        [] => true,
        [only] => only.is_empty(),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Walks the input with the same quoting rules as the CSV reader and returns,
/// for each record in order, whether it is a blank line.
///
/// `\n`, `\r` and `\r\n` end a record unless they sit inside a quoted field.
/// A quote only opens a quoted field at the start of a field.
fn scan_records(bytes: &[u8]) -> Vec<bool> {
    let mut records = Vec::new();
    let mut state = Scan::FieldStart;
    let mut empty = true;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match (state, b) {
            (Scan::Quoted, b'"') => state = Scan::QuoteInQuoted,
            (Scan::Quoted, _) => {}
            // Doubled quote: an escaped quote, still inside the field.
            (Scan::QuoteInQuoted, b'"') => state = Scan::Quoted,
            (_, b'\n') | (_, b'\r') => {
                records.push(empty);
                if b == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                state = Scan::FieldStart;
                empty = true;
                i += 1;
                continue;
            }
            (_, b',') => state = Scan::FieldStart,
            (Scan::FieldStart, b'"') => state = Scan::Quoted,
            _ => state = Scan::Unquoted,
        }
        empty = false;
        i += 1;
    }

    // Last record without a terminator.
    if !empty {
        records.push(false);
    }
    records
}
