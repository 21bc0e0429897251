use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float64Type;
use arrow_array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_cast::cast;
use arrow_schema::{DataType, Field, Schema};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use super::temp_sibling;
use crate::domain::Cell;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::table::{Column, Table};

/// How cell values map onto Parquet column types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTyping {
    /// Every column is nullable UTF-8
    Text,
    /// Columns holding only numbers (and nulls) are Float64, the rest UTF-8
    Inferred,
}

/// Replace `path` with the table's contents. The file is written next to
/// its destination and renamed into place once complete.
pub fn write_table(path: &Path, table: &Table, typing: ColumnTyping) -> Result<()> {
    if table.column_count() == 0 {
        return Err(PipelineError::InvalidInput(
            "cannot persist a table without columns".to_string(),
        ));
    }

    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = table
        .columns()
        .iter()
        .map(|column| column_array(column, typing))
        .unzip();
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let tmp = temp_sibling(path);
    let file = File::create(&tmp)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    fs::rename(&tmp, path)?;

    debug!(
        path = %path.display(),
        rows = table.row_count(),
        columns = table.column_count(),
        "Wrote parquet table"
    );
    Ok(())
}

fn column_array(column: &Column, typing: ColumnTyping) -> (Field, ArrayRef) {
    if typing == ColumnTyping::Inferred && column.is_numeric() {
        let values: Vec<Option<f64>> = column.cells.iter().map(Cell::as_number).collect();
        (
            Field::new(column.name.as_str(), DataType::Float64, true),
            Arc::new(Float64Array::from(values)),
        )
    } else {
        let values: Vec<Option<String>> = column.cells.iter().map(Cell::render).collect();
        (
            Field::new(column.name.as_str(), DataType::Utf8, true),
            Arc::new(StringArray::from(values)),
        )
    }
}

/// Read a Parquet file written by [`write_table`] (or any other producer)
pub fn read_table(path: &Path) -> Result<Table> {
    let bytes = fs::read(path)?;
    table_from_bytes(Bytes::from(bytes))
}

/// Decode Parquet bytes into a table. Numeric columns come back as
/// numbers; every other type is cast to text.
pub fn table_from_bytes(bytes: Bytes) -> Result<Table> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); schema.fields().len()];
    for batch in reader {
        let batch = batch?;
        for (cells, array) in columns.iter_mut().zip(batch.columns()) {
            append_cells(array, cells)?;
        }
    }

    let mut table = Table::new();
    for (field, cells) in schema.fields().iter().zip(columns) {
        table.push_column(field.name(), cells);
    }
    Ok(table)
}

fn append_cells(array: &ArrayRef, out: &mut Vec<Cell>) -> Result<()> {
    let data_type = array.data_type();
    if data_type.is_numeric() {
        let floats = cast(array, &DataType::Float64)?;
        let floats = floats.as_primitive::<Float64Type>();
        out.extend((0..floats.len()).map(|i| {
            if floats.is_null(i) {
                Cell::Null
            } else {
                Cell::Number(floats.value(i))
            }
        }));
    } else {
        let strings = if *data_type == DataType::Utf8 {
            array.clone()
        } else {
            cast(array, &DataType::Utf8)?
        };
        let strings = strings.as_string::<i32>();
        out.extend((0..strings.len()).map(|i| {
            if strings.is_null(i) {
                Cell::Null
            } else {
                Cell::text(strings.value(i))
            }
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Record;
    use tempfile::TempDir;

    fn sample() -> Table {
        let mut first = Record::new();
        first.insert("name", "Ada");
        first.insert("score", 9.5);
        let mut second = Record::new();
        second.insert("name", Cell::Null);
        second.insert("score", 3.0);
        Table::from_records(&[first, second])
    }

    #[test]
    fn inferred_typing_keeps_numbers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.parquet");
        write_table(&path, &sample(), ColumnTyping::Inferred).unwrap();
        let back = read_table(&path).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn text_typing_renders_numbers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.parquet");
        write_table(&path, &sample(), ColumnTyping::Text).unwrap();
        let back = read_table(&path).unwrap();
        assert_eq!(back.cell(0, "score"), Some(&Cell::text("9.5")));
        assert_eq!(back.cell(1, "score"), Some(&Cell::text("3")));
        assert_eq!(back.cell(1, "name"), Some(&Cell::Null));
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn garbage_bytes_fail() {
        assert!(table_from_bytes(Bytes::from_static(b"PAR1 nope")).is_err());
    }
}
