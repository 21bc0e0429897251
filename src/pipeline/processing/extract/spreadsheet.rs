use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};

use super::{normalize_headers, stamp_all, ExtractContext};
use crate::constants::CANONICAL_TIMESTAMP_FORMAT;
use crate::domain::{Cell, RawArtifact, Record};
use crate::error::{PipelineError, Result};

pub const XLSX_TAG: &str = "XLSX_Upload";

pub fn extract(artifact: &RawArtifact, _ctx: &ExtractContext) -> Result<Vec<Record>> {
    let records = read_first_sheet(&artifact.payload)?;
    Ok(stamp_all(records, XLSX_TAG, artifact))
}

/// Rows of the first worksheet; the first row names the columns
pub fn read_first_sheet(payload: &[u8]) -> Result<Vec<Record>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(payload.to_vec()))
        .map_err(|e| PipelineError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::Spreadsheet("workbook has no worksheets".to_string()))?
        .map_err(|e| PipelineError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers = normalize_headers(header.iter().map(|c| c.to_string()));

    let records = rows
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), row.get(i).map(to_cell).unwrap_or(Cell::Null)))
                .collect()
        })
        .collect();
    Ok(records)
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Null,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) if s.trim().is_empty() => Cell::Null,
        Data::String(s) => Cell::text(s.as_str()),
        Data::DateTime(_) => data
            .as_datetime()
            .map(|dt| Cell::text(dt.format(CANONICAL_TIMESTAMP_FORMAT).to_string()))
            .unwrap_or_else(|| Cell::text(data.to_string())),
        other => Cell::text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_conversion() {
        assert_eq!(to_cell(&Data::Empty), Cell::Null);
        assert_eq!(to_cell(&Data::Int(3)), Cell::Number(3.0));
        assert_eq!(to_cell(&Data::String("  ".into())), Cell::Null);
        assert_eq!(to_cell(&Data::Bool(true)), Cell::text("true"));
    }

    #[test]
    fn garbage_is_a_spreadsheet_error() {
        let err = read_first_sheet(b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, PipelineError::Spreadsheet(_)));
    }
}
