//! Row transformation: re-key a raw CSV row by canonical field.

use crate::model::{MappedRow, RawRow};
use crate::pipeline::mapper::ColumnMapping;

/// Apply `mapping` to one row.
///
/// Columns the mapping does not know are dropped; they were already
/// reported as unmapped. When two columns resolve to the same field the
/// later column wins.
pub fn transform_row(row: &RawRow, mapping: &ColumnMapping) -> MappedRow {
    let mut mapped = MappedRow {
        ordinal: row.ordinal,
        ..Default::default()
    };
    for (header, value) in &row.cells {
        if let Some(field) = mapping.resolve(header) {
            mapped.fields.insert(field, value.clone());
        }
    }
    mapped
}

/// Apply `mapping` to every row, preserving order and ordinals.
pub fn transform_rows(rows: &[RawRow], mapping: &ColumnMapping) -> Vec<MappedRow> {
    rows.iter().map(|row| transform_row(row, mapping)).collect()
}
