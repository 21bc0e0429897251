//! Per-dimension calculations for the native scorer. Every function takes a
//! non-empty table and returns an unrounded score in 0..=100.

use chrono::{DateTime, Utc};

use crate::constants::{is_time_like_column, INGESTED_AT_COLUMN, SOURCE_COLUMN};
use crate::domain::Cell;
use crate::pipeline::processing::table::Table;
use crate::pipeline::processing::temporal::parse_timestamp;

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 100.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Share of non-null cells across the whole table
pub fn completeness(table: &Table) -> f64 {
    let total = table.total_cells();
    if total == 0 {
        return 0.0;
    }
    let non_null: usize = table.columns().iter().map(|c| c.non_null().count()).sum();
    percent(non_null, total)
}

/// Share of numeric cells whose z-score stays within `max_z`. Each column
/// uses its own sample mean and standard deviation. A table without
/// numeric cells scores 100.
pub fn accuracy(table: &Table, max_z: f64) -> f64 {
    let mut numeric_cells = 0usize;
    let mut outliers = 0usize;

    for column in table.columns().iter().filter(|c| c.is_numeric()) {
        let values: Vec<f64> = column.non_null().filter_map(Cell::as_number).collect();
        numeric_cells += values.len();
        if values.len() < 2 {
            continue;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std_dev = variance.sqrt();
        if std_dev == 0.0 || !std_dev.is_finite() {
            continue;
        }
        outliers += values
            .iter()
            .filter(|v| ((*v - mean) / std_dev).abs() > max_z)
            .count();
    }

    percent(numeric_cells - outliers, numeric_cells)
}

/// Placeholder for type-conformance checks: currently the completeness formula
pub fn validity(table: &Table) -> f64 {
    completeness(table)
}

/// Share of parsed timestamps, in time-like columns, that are not after `now`
pub fn consistency(table: &Table, now: DateTime<Utc>) -> f64 {
    let mut parsed = 0usize;
    let mut not_future = 0usize;

    for column in table.columns().iter().filter(|c| is_time_like_column(&c.name)) {
        for ts in column
            .cells
            .iter()
            .filter_map(Cell::as_text)
            .filter_map(parse_timestamp)
        {
            parsed += 1;
            if ts <= now {
                not_future += 1;
            }
        }
    }

    percent(not_future, parsed)
}

/// Share of rows that do not repeat an earlier row
pub fn uniqueness(table: &Table, duplicates: usize) -> f64 {
    percent(table.row_count() - duplicates, table.row_count())
}

/// 100 when both lineage columns exist in the schema, else 50
pub fn integrity(table: &Table) -> f64 {
    if table.has_column(SOURCE_COLUMN) && table.has_column(INGESTED_AT_COLUMN) {
        100.0
    } else {
        50.0
    }
}

/// Rows whose lineage cells are present in the schema but null. These do
/// not move the integrity score; they give the targeted pass rows to drop.
pub fn integrity_failures(table: &Table) -> Vec<usize> {
    let lineage: Vec<_> = [SOURCE_COLUMN, INGESTED_AT_COLUMN]
        .iter()
        .filter_map(|name| table.column(name))
        .collect();
    (0..table.row_count())
        .filter(|&row| lineage.iter().any(|c| c.cells[row].is_null()))
        .collect()
}

/// Share of rows carrying a non-null `source`; 0 when the column is absent
pub fn lineage(table: &Table) -> f64 {
    match table.column(SOURCE_COLUMN) {
        Some(column) => percent(column.non_null().count(), table.row_count()),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Record;
    use chrono::TimeZone;

    fn numbers(values: &[Option<f64>]) -> Table {
        let mut table = Table::new();
        table.push_column(
            "v",
            values.iter().map(|v| v.map_or(Cell::Null, Cell::Number)).collect(),
        );
        table
    }

    #[test]
    fn completeness_counts_cells() {
        let table = numbers(&[Some(1.0), None, Some(3.0), None]);
        assert_eq!(completeness(&table), 50.0);
        assert_eq!(validity(&table), 50.0);
    }

    #[test]
    fn accuracy_flags_far_outlier() {
        let mut values: Vec<Option<f64>> = vec![Some(10.0); 20];
        values.push(Some(10_000.0));
        values[0] = Some(11.0);
        let table = numbers(&values);
        let score = accuracy(&table, 3.0);
        assert!((score - 20.0 / 21.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_variance_and_single_value_do_not_penalize() {
        assert_eq!(accuracy(&numbers(&[Some(5.0), Some(5.0), Some(5.0)]), 3.0), 100.0);
        assert_eq!(accuracy(&numbers(&[Some(5.0)]), 3.0), 100.0);
    }

    #[test]
    fn accuracy_without_numeric_columns_is_full() {
        let records = vec![[("name", Cell::text("x"))].into_iter().collect::<Record>()];
        assert_eq!(accuracy(&Table::from_records(&records), 3.0), 100.0);
    }

    #[test]
    fn consistency_counts_future_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut table = Table::new();
        table.push_column(
            "event_date",
            vec![
                Cell::text("2024-01-01"),
                Cell::text("2030-01-01"),
                Cell::text("not a date"),
                Cell::Null,
            ],
        );
        table.push_column(
            "note",
            vec![Cell::text("2030-01-01"), Cell::Null, Cell::Null, Cell::Null],
        );
        assert_eq!(consistency(&table, now), 50.0);
    }

    #[test]
    fn consistency_defaults_to_full_without_timestamps() {
        let now = Utc::now();
        assert_eq!(consistency(&numbers(&[Some(1.0)]), now), 100.0);
    }

    #[test]
    fn integrity_failures_list_rows_with_null_lineage() {
        let mut table = Table::new();
        table.push_column("source", vec![Cell::text("A"), Cell::Null, Cell::text("A")]);
        table.push_column("ingested_at", vec![Cell::text("t"), Cell::text("t"), Cell::Null]);
        assert_eq!(integrity(&table), 100.0);
        assert_eq!(integrity_failures(&table), vec![1, 2]);
        assert!((lineage(&table) - 200.0 / 3.0).abs() < 1e-9);
    }
}
