use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use super::temp_sibling;
use crate::domain::Cell;
use crate::error::Result;
use crate::pipeline::processing::table::Table;

/// Write the human-readable mirror of a canonical table. Nulls are empty
/// fields.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    let tmp = temp_sibling(path);
    {
        let mut writer = WriterBuilder::new().from_path(&tmp)?;
        writer.write_record(table.column_names())?;
        for row in 0..table.row_count() {
            writer.write_record(
                table
                    .row(row)
                    .into_iter()
                    .map(|cell| cell.render().unwrap_or_default()),
            )?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a delimited table for scoring. Empty fields are null, and columns
/// whose values all parse as finite numbers are read as numbers.
pub fn read_table(path: &Path) -> Result<Table> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); headers.len()];
    for row in reader.records() {
        let row = row?;
        for (i, cells) in columns.iter_mut().enumerate() {
            let cell = match row.get(i) {
                Some(v) if !v.is_empty() => Cell::text(v),
                _ => Cell::Null,
            };
            cells.push(cell);
        }
    }

    let mut table = Table::new();
    for (name, cells) in headers.iter().zip(columns) {
        table.push_column(name, infer_numbers(cells));
    }
    Ok(table)
}

fn infer_numbers(cells: Vec<Cell>) -> Vec<Cell> {
    let parsed: Option<Vec<Cell>> = cells
        .iter()
        .map(|cell| match cell {
            Cell::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Cell::Number),
            other => Some(other.clone()),
        })
        .collect();
    let any_value = cells.iter().any(|c| !c.is_null());
    match parsed {
        Some(numbers) if any_value => numbers,
        _ => cells,
    }
}
