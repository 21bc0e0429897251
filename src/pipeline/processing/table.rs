use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::domain::{Cell, Record};

/// A column-oriented table. Columns keep first-seen order; every column
/// holds exactly `row_count` cells, with `Cell::Null` for missing values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from records, taking the union of their columns
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut table = Table::new();
        for record in records {
            table.push_record(record);
        }
        table
    }

    /// Append one record, adding any columns it introduces
    pub fn push_record(&mut self, record: &Record) {
        let row = self.row_count;
        for (name, value) in record.fields() {
            let idx = match self.column_index(name) {
                Some(idx) => idx,
                None => self.add_column(name),
            };
            self.columns[idx].cells.push(value.clone());
        }
        self.row_count += 1;
        // Pad columns the record did not mention
        for column in &mut self.columns {
            if column.cells.len() < self.row_count {
                column.cells.push(Cell::Null);
            }
            debug_assert_eq!(column.cells.len(), row + 1);
        }
    }

    /// Add an all-null column and return its index
    pub fn add_column(&mut self, name: &str) -> usize {
        self.columns.push(Column {
            name: name.to_string(),
            cells: vec![Cell::Null; self.row_count],
        });
        self.columns.len() - 1
    }

    /// Add a column from cells; `cells.len()` must equal the row count
    pub fn push_column(&mut self, name: &str, cells: Vec<Cell>) {
        if self.columns.is_empty() && self.row_count == 0 {
            self.row_count = cells.len();
        }
        assert_eq!(cells.len(), self.row_count, "column length mismatch");
        self.columns.push(Column {
            name: name.to_string(),
            cells,
        });
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn total_cells(&self) -> usize {
        self.row_count * self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        self.column(column).and_then(|c| c.cells.get(row))
    }

    pub fn row(&self, row: usize) -> Vec<&Cell> {
        self.columns.iter().map(|c| &c.cells[row]).collect()
    }

    /// Concatenated identity key of a row across all columns
    pub fn row_key(&self, row: usize) -> String {
        let mut key = String::new();
        for column in &self.columns {
            column.cells[row].identity_key(&mut key);
        }
        key
    }

    /// Row indices that repeat an earlier row exactly, in row order
    pub fn duplicate_rows(&self) -> Vec<usize> {
        let mut seen = HashSet::with_capacity(self.row_count);
        (0..self.row_count)
            .filter(|&row| !seen.insert(self.row_key(row)))
            .collect()
    }

    /// Keep only the rows for which `keep` returns true, preserving order
    pub fn retain_rows(&mut self, mut keep: impl FnMut(usize) -> bool) -> usize {
        let mask: Vec<bool> = (0..self.row_count).map(&mut keep).collect();
        let removed = mask.iter().filter(|k| !**k).count();
        if removed == 0 {
            return 0;
        }
        for column in &mut self.columns {
            let mut i = 0;
            column.cells.retain(|_| {
                let k = mask[i];
                i += 1;
                k
            });
        }
        self.row_count -= removed;
        removed
    }

    /// Drop the given row positions; positions past the end are ignored
    pub fn remove_rows(&mut self, rows: &HashSet<usize>) -> usize {
        self.retain_rows(|row| !rows.contains(&row))
    }

    /// Move the named columns, where present, to the end in the given order
    pub fn move_to_end(&mut self, names: &[&str]) {
        for name in names {
            if let Some(idx) = self.column_index(name) {
                let column = self.columns.remove(idx);
                self.columns.push(column);
            }
        }
    }

    pub fn retain_columns(&mut self, keep: impl FnMut(&Column) -> bool) -> usize {
        let before = self.columns.len();
        self.columns.retain(keep);
        before - self.columns.len()
    }

    pub fn to_records(&self) -> Vec<Record> {
        (0..self.row_count)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.cells[row].clone()))
                    .collect()
            })
            .collect()
    }

    /// Up to `limit` rows as JSON objects, nulls rendered with `null_marker`
    pub fn preview(&self, limit: usize, null_marker: &str) -> Vec<Value> {
        (0..self.row_count.min(limit))
            .map(|row| {
                let mut obj = Map::new();
                for column in &self.columns {
                    let value = match &column.cells[row] {
                        Cell::Null => Value::String(null_marker.to_string()),
                        Cell::Text(s) => Value::String(s.clone()),
                        Cell::Number(n) => serde_json::Number::from_f64(*n)
                            .map(Value::Number)
                            .unwrap_or_else(|| Value::String(n.to_string())),
                    };
                    obj.insert(column.name.clone(), value);
                }
                Value::Object(obj)
            })
            .collect()
    }
}

impl Column {
    pub fn non_null(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| !c.is_null())
    }

    pub fn null_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_null()).count()
    }

    pub fn is_all_null(&self) -> bool {
        self.cells.iter().all(Cell::is_null)
    }

    /// A column is numeric when it has at least one value and every
    /// non-null value is a number
    pub fn is_numeric(&self) -> bool {
        let mut any = false;
        for cell in self.non_null() {
            if cell.as_number().is_none() {
                return false;
            }
            any = true;
        }
        any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, Cell::text(*v))).collect()
    }

    #[test]
    fn union_of_columns_pads_with_nulls() {
        let records = vec![record(&[("a", "1")]), record(&[("b", "2")])];
        let table = Table::from_records(&records);
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(1, "a"), Some(&Cell::Null));
        assert_eq!(table.cell(0, "b"), Some(&Cell::Null));
    }

    #[test]
    fn duplicate_rows_reports_later_occurrences() {
        let records = vec![
            record(&[("a", "1")]),
            record(&[("a", "2")]),
            record(&[("a", "1")]),
            record(&[("a", "1")]),
        ];
        let table = Table::from_records(&records);
        assert_eq!(table.duplicate_rows(), vec![2, 3]);
    }

    #[test]
    fn null_and_empty_text_are_distinct() {
        let mut records = vec![record(&[("a", "")])];
        let mut r = Record::new();
        r.insert("a", Cell::Null);
        records.push(r);
        let table = Table::from_records(&records);
        assert!(table.duplicate_rows().is_empty());
    }

    #[test]
    fn remove_rows_ignores_missing_positions() {
        let records = vec![record(&[("a", "1")]), record(&[("a", "2")])];
        let mut table = Table::from_records(&records);
        let removed = table.remove_rows(&[1usize, 7].into_iter().collect());
        assert_eq!(removed, 1);
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.cell(0, "a"), Some(&Cell::text("1")));
    }

    #[test]
    fn preview_marks_nulls() {
        let records = vec![record(&[("a", "1")]), record(&[("b", "x")])];
        let table = Table::from_records(&records);
        let preview = table.preview(100, "—");
        assert_eq!(preview[0]["b"], "—");
        assert_eq!(preview[1]["b"], "x");
    }
}
