//! CSV parsing into [`RawRow`]s.
//!
//! The first record is the header row. Headers and values are trimmed,
//! ragged rows are accepted (missing trailing cells are simply absent,
//! surplus cells are dropped) and rows whose every cell is blank are
//! skipped. Ordinals count data rows from 1 and include skipped rows, so
//! "Row 7" in a diagnostic is the seventh record under the header.

use crate::error::IngestError;
use crate::model::RawRow;
use csv::{ReaderBuilder, Trim};
use tracing::debug;

/// A parsed CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    /// Trimmed headers in file order.
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl ParsedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parse a CSV buffer. Invalid UTF-8 is replaced rather than rejected.
pub fn parse_csv(bytes: &[u8]) -> Result<ParsedTable, IngestError> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result?;
        let cells: Vec<(String, String)> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();

        if cells.iter().all(|(_, v)| v.is_empty()) {
            continue;
        }
        rows.push(RawRow::new(index + 1, cells));
    }

    debug!("Parsed CSV: {} columns, {} data rows", headers.len(), rows.len());
    Ok(ParsedTable { headers, rows })
}
