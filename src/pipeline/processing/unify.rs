use std::path::PathBuf;

use tracing::{info, instrument};

use super::table::Table;
use crate::constants::{is_metadata_column, INGESTED_AT_COLUMN, SOURCE_COLUMN};
use crate::domain::{Record, SourceKind};
use crate::error::Result;
use crate::metrics;
use crate::pipeline::storage::{Canonical, CanonicalStore};

/// Records extracted from one source kind
#[derive(Debug, Clone)]
pub struct ExtractedBatch {
    pub kind: SourceKind,
    pub records: Vec<Record>,
}

impl ExtractedBatch {
    pub fn new(kind: SourceKind, records: Vec<Record>) -> Self {
        Self { kind, records }
    }
}

/// Result of unification. `NoData` is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum UnifyOutcome {
    NoData,
    Unified(Table),
}

/// Concatenate batches in the fixed source-kind order, taking the union of
/// their columns. Non-metadata values are rendered to text so mixed-type
/// columns serialize the same way every run.
#[instrument(skip_all, fields(batches = batches.len()))]
pub fn unify(mut batches: Vec<ExtractedBatch>) -> UnifyOutcome {
    // Stable sort keeps arrival order within a kind
    batches.sort_by_key(|b| b.kind);

    let total: usize = batches.iter().map(|b| b.records.len()).sum();
    if total == 0 {
        info!("No records extracted from any source");
        return UnifyOutcome::NoData;
    }

    let mut table = Table::from_records(batches.iter().flat_map(|b| b.records.iter()));
    table.move_to_end(&[SOURCE_COLUMN, INGESTED_AT_COLUMN]);

    for column in table.columns_mut() {
        if is_metadata_column(&column.name) {
            continue;
        }
        for cell in column.cells.iter_mut() {
            *cell = std::mem::take(cell).into_text();
        }
    }

    metrics::processing::unified_rows(table.row_count());
    info!(
        rows = table.row_count(),
        columns = table.column_count(),
        "Unified table built"
    );
    UnifyOutcome::Unified(table)
}

/// Write the unified table as the canonical intermediate dataset
pub fn persist(store: &CanonicalStore, table: &Table) -> Result<PathBuf> {
    store.write(Canonical::Unified, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cell;

    fn rec(pairs: &[(&str, Cell)], source: &str) -> Record {
        let record: Record = pairs.iter().cloned().collect();
        record.stamp(source, "2026-01-01T00:00:00.000000Z")
    }

    #[test]
    fn empty_batches_are_no_data() {
        let outcome = unify(vec![ExtractedBatch::new(SourceKind::Json, Vec::new())]);
        assert_eq!(outcome, UnifyOutcome::NoData);
        assert_eq!(unify(Vec::new()), UnifyOutcome::NoData);
    }

    #[test]
    fn batches_follow_source_kind_order() {
        let scrape = ExtractedBatch::new(SourceKind::Scrape, vec![rec(&[("x", Cell::text("s"))], "Web_Scrape")]);
        let api = ExtractedBatch::new(SourceKind::LiveApi, vec![rec(&[("x", Cell::text("a"))], "API_Source")]);
        let UnifyOutcome::Unified(table) = unify(vec![scrape, api]) else {
            panic!("expected a table");
        };
        assert_eq!(table.cell(0, "source"), Some(&Cell::text("API_Source")));
        assert_eq!(table.cell(1, "source"), Some(&Cell::text("Web_Scrape")));
    }

    #[test]
    fn values_become_text_and_nulls_stay() {
        let batch = ExtractedBatch::new(
            SourceKind::Json,
            vec![
                rec(&[("n", Cell::Number(2.0)), ("m", Cell::Null)], "JSON_Upload"),
                rec(&[("n", Cell::text("two"))], "JSON_Upload"),
            ],
        );
        let UnifyOutcome::Unified(table) = unify(vec![batch]) else {
            panic!("expected a table");
        };
        assert_eq!(table.cell(0, "n"), Some(&Cell::text("2")));
        assert_eq!(table.cell(0, "m"), Some(&Cell::Null));
        assert_eq!(table.cell(1, "m"), Some(&Cell::Null));
        assert_eq!(table.column_names(), vec!["n", "m", "source", "ingested_at"]);
    }
}
