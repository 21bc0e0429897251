use std::collections::{HashMap, HashSet};

use tracing::{debug, info, instrument, warn};

use super::quality_gate::IssueMetadata;
use super::table::{Column, Table};
use super::temporal::{canonical, parse_timestamp};
use crate::constants::{
    is_metadata_column, is_time_like_column, INGESTED_AT_COLUMN, NULL_TOKENS,
    REMEDIATION_NOTES_COLUMN, SUSPICIOUS_VALUE_NOTE,
};
use crate::domain::Cell;
use crate::error::{PipelineError, Result};
use crate::metrics;
use crate::pipeline::storage::{Canonical, CanonicalStore};

/// Share of non-null values that must parse as numbers before a column is
/// converted
pub const NUMERIC_COERCION_RATIO: f64 = 0.8;

/// Upper bound on bulk sweeps; real tables settle in two or three
const MAX_BULK_PASSES: usize = 8;

/// What the bulk pass did to a table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemediationSummary {
    pub rows_in: usize,
    pub rows_out: usize,
    pub null_rows_dropped: usize,
    pub null_columns_dropped: Vec<String>,
    pub duplicates_dropped: usize,
    pub rows_flagged: usize,
    pub numeric_columns: Vec<String>,
    pub timestamp_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BulkOutcome {
    /// The unified table was missing or had no rows; nothing was written
    NoInput,
    Cleaned(RemediationSummary),
}

/// Remediation over the canonical tables. The controller only talks to this
/// trait so a different cleaner can be swapped in.
pub trait Remediation: Send + Sync {
    /// Normalize the canonical unified table into the canonical cleaned table
    fn run(&self, store: &CanonicalStore) -> Result<BulkOutcome>;

    /// Remove the rows named by a prior report from the cleaned table,
    /// returning how many were removed
    fn targeted(&self, store: &CanonicalStore, issues: &IssueMetadata) -> Result<usize>;
}

/// Deterministic cleaner backing both passes
#[derive(Debug, Clone, Default)]
pub struct Remediator;

impl Remediator {
    pub fn new() -> Self {
        Self
    }
}

impl Remediation for Remediator {
    #[instrument(skip_all)]
    fn run(&self, store: &CanonicalStore) -> Result<BulkOutcome> {
        let table = match store.read(Canonical::Unified) {
            Ok(table) => table,
            Err(PipelineError::MissingTable(path)) => {
                warn!(path = %path.display(), "No unified table to remediate");
                return Ok(BulkOutcome::NoInput);
            }
            Err(e) => return Err(e),
        };
        if table.is_empty() {
            warn!("Unified table has no rows; skipping remediation");
            return Ok(BulkOutcome::NoInput);
        }

        let (cleaned, summary) = bulk(table);
        store.write(Canonical::Cleaned, &cleaned)?;
        Ok(BulkOutcome::Cleaned(summary))
    }

    #[instrument(skip_all, fields(
        duplicates = issues.duplicate_indices.len(),
        integrity = issues.integrity_fail_indices.len()
    ))]
    fn targeted(&self, store: &CanonicalStore, issues: &IssueMetadata) -> Result<usize> {
        let mut table = store.read(Canonical::Cleaned)?;
        let removed = targeted(&mut table, issues);
        store.write(Canonical::Cleaned, &table)?;
        Ok(removed)
    }
}

/// Full normalization pass. Running it on its own output changes nothing.
///
/// Dropping rows can move a column across the numeric coercion ratio, so
/// the steps repeat until a pass leaves the table unchanged.
pub fn bulk(mut table: Table) -> (Table, RemediationSummary) {
    let mut summary = RemediationSummary {
        rows_in: table.row_count(),
        ..RemediationSummary::default()
    };

    let mut settled = false;
    for pass in 1..=MAX_BULK_PASSES {
        let before = table.clone();
        bulk_step(&mut table, &mut summary);
        if table == before {
            debug!(passes = pass, "Bulk remediation settled");
            settled = true;
            break;
        }
    }
    if !settled {
        warn!(passes = MAX_BULK_PASSES, "Bulk remediation still changing after pass limit");
    }
    summary.rows_out = table.row_count();

    metrics::processing::rows_dropped(
        "bulk",
        summary.null_rows_dropped + summary.duplicates_dropped,
    );
    metrics::processing::rows_flagged(summary.rows_flagged);
    info!(
        rows_in = summary.rows_in,
        rows_out = summary.rows_out,
        duplicates = summary.duplicates_dropped,
        flagged = summary.rows_flagged,
        "Bulk remediation complete"
    );
    (table, summary)
}

/// One sweep of every bulk step, accumulating into `summary`
fn bulk_step(table: &mut Table, summary: &mut RemediationSummary) {
    for column in table.columns_mut() {
        if is_metadata_column(&column.name) {
            continue;
        }
        normalize_strings(column);
        unify_case_variants(column);
    }

    for column in table.columns_mut() {
        if is_metadata_column(&column.name) {
            continue;
        }
        if coerce_numeric(column) && !summary.numeric_columns.contains(&column.name) {
            summary.numeric_columns.push(column.name.clone());
        }
    }

    for column in table.columns_mut() {
        let eligible = column.name == INGESTED_AT_COLUMN || !is_metadata_column(&column.name);
        if eligible && is_time_like_column(&column.name) && !column.is_numeric() {
            coerce_timestamps(column);
            if !summary.timestamp_columns.contains(&column.name) {
                summary.timestamp_columns.push(column.name.clone());
            }
        }
    }

    // Coercion can null out cells, so empty rows and columns are judged last
    let before: Vec<String> = table.column_names().iter().map(|s| s.to_string()).collect();
    table.retain_columns(|c| is_metadata_column(&c.name) || !c.is_all_null());
    summary.null_columns_dropped.extend(
        before
            .into_iter()
            .filter(|name| !table.has_column(name)),
    );
    summary.null_rows_dropped += drop_empty_rows(table);

    summary.rows_flagged = annotate_suspicious_rows(table);

    let duplicates: HashSet<usize> = table.duplicate_rows().into_iter().collect();
    summary.duplicates_dropped += table.remove_rows(&duplicates);
}

/// Delete the rows a report pinpointed. Positions already gone are ignored.
pub fn targeted(table: &mut Table, issues: &IssueMetadata) -> usize {
    let rows: HashSet<usize> = issues
        .duplicate_indices
        .iter()
        .chain(&issues.integrity_fail_indices)
        .copied()
        .filter(|&row| row < table.row_count())
        .collect();
    let requested = issues.duplicate_indices.len() + issues.integrity_fail_indices.len();
    if rows.len() < requested {
        debug!(
            requested,
            present = rows.len(),
            "Some flagged rows were already removed"
        );
    }

    let removed = table.remove_rows(&rows);
    metrics::processing::rows_dropped("targeted", removed);
    info!(removed, remaining = table.row_count(), "Targeted remediation complete");
    removed
}

/// Trim text and turn null tokens into nulls
fn normalize_strings(column: &mut Column) {
    for cell in column.cells.iter_mut() {
        let replacement = match &*cell {
            Cell::Text(s) => {
                let trimmed = s.trim();
                if NULL_TOKENS.contains(&trimmed) {
                    Some(Cell::Null)
                } else if trimmed.len() != s.len() {
                    Some(Cell::text(trimmed))
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(replacement) = replacement {
            *cell = replacement;
        }
    }
}

/// Values that differ only by letter case take the spelling seen first.
/// Applies to every non-metadata text column, identifier-like ones
/// included: `aB12` and `Ab12` are treated as the same value.
fn unify_case_variants(column: &mut Column) {
    let mut first_seen: HashMap<String, String> = HashMap::new();
    for cell in column.cells.iter_mut() {
        if let Cell::Text(s) = cell {
            let spelling = first_seen
                .entry(s.to_lowercase())
                .or_insert_with(|| s.clone());
            if spelling != s {
                *s = spelling.clone();
            }
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Convert the column to numbers when enough values parse; the rest become
/// null. Returns true when the column ends up numeric.
fn coerce_numeric(column: &mut Column) -> bool {
    let mut non_null = 0usize;
    let mut parsed = 0usize;
    for cell in column.non_null() {
        non_null += 1;
        let ok = match cell {
            Cell::Number(n) => n.is_finite(),
            Cell::Text(s) => parse_number(s).is_some(),
            Cell::Null => false,
        };
        if ok {
            parsed += 1;
        }
    }
    if non_null == 0 || (parsed as f64 / non_null as f64) <= NUMERIC_COERCION_RATIO {
        return false;
    }

    for cell in column.cells.iter_mut() {
        *cell = match std::mem::take(cell) {
            Cell::Number(n) if n.is_finite() => Cell::Number(n),
            Cell::Text(s) => parse_number(&s).map_or(Cell::Null, Cell::Number),
            _ => Cell::Null,
        };
    }
    true
}

/// Rewrite timestamps in the canonical layout; unparseable values become null
fn coerce_timestamps(column: &mut Column) {
    let mut failed = 0usize;
    for cell in column.cells.iter_mut() {
        let parsed = match &*cell {
            Cell::Null => continue,
            Cell::Text(s) => parse_timestamp(s),
            Cell::Number(_) => None,
        };
        *cell = match parsed {
            Some(ts) => Cell::Text(canonical(&ts)),
            None => {
                failed += 1;
                Cell::Null
            }
        };
    }
    if failed > 0 {
        debug!(column = %column.name, failed, "Unparseable timestamps set to null");
    }
}

/// Remove rows with no value outside the lineage and annotation columns
fn drop_empty_rows(table: &mut Table) -> usize {
    let data: Vec<&Column> = table
        .columns()
        .iter()
        .filter(|c| !is_metadata_column(&c.name))
        .collect();
    let keep: Vec<bool> = (0..table.row_count())
        .map(|row| data.iter().any(|c| !c.cells[row].is_null()))
        .collect();
    table.retain_rows(|row| keep[row])
}

/// Append the suspicious-value note to rows holding a null or zero in a
/// numeric column, or any null at all when no column is numeric. Rows
/// already carrying the note are counted but not appended to again.
fn annotate_suspicious_rows(table: &mut Table) -> usize {
    let numeric: Vec<&Column> = table
        .columns()
        .iter()
        .filter(|c| !is_metadata_column(&c.name) && c.is_numeric())
        .collect();
    let mask: Vec<bool> = if numeric.is_empty() {
        let data: Vec<&Column> = table
            .columns()
            .iter()
            .filter(|c| !is_metadata_column(&c.name))
            .collect();
        (0..table.row_count())
            .map(|row| data.iter().any(|c| c.cells[row].is_null()))
            .collect()
    } else {
        (0..table.row_count())
            .map(|row| {
                numeric
                    .iter()
                    .any(|c| matches!(c.cells[row], Cell::Null) || c.cells[row].as_number() == Some(0.0))
            })
            .collect()
    };

    if !table.has_column(REMEDIATION_NOTES_COLUMN) {
        let idx = table.add_column(REMEDIATION_NOTES_COLUMN);
        for cell in table.columns_mut()[idx].cells.iter_mut() {
            *cell = Cell::text("");
        }
    }
    let Some(notes) = table.column_mut(REMEDIATION_NOTES_COLUMN) else {
        return 0;
    };

    let mut flagged = 0;
    for (cell, suspicious) in notes.cells.iter_mut().zip(mask) {
        let current = cell.render().unwrap_or_default();
        if suspicious {
            flagged += 1;
            if !current.contains(SUSPICIOUS_VALUE_NOTE) {
                *cell = Cell::Text(format!("{current}{SUSPICIOUS_VALUE_NOTE}"));
                continue;
            }
        }
        *cell = Cell::Text(current);
    }
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Record;

    fn table(rows: &[&[(&str, &str)]]) -> Table {
        let records: Vec<Record> = rows
            .iter()
            .map(|r| r.iter().map(|(k, v)| (*k, Cell::text(*v))).collect())
            .collect();
        Table::from_records(&records)
    }

    fn notes(table: &Table, row: usize) -> String {
        table
            .cell(row, REMEDIATION_NOTES_COLUMN)
            .and_then(|c| c.render())
            .unwrap_or_default()
    }

    #[test]
    fn null_tokens_and_whitespace() {
        let t = table(&[
            &[("city", "  Oslo "), ("note", "None"), ("source", "S")],
            &[("city", "nan"), ("note", "—"), ("source", "S")],
            &[("city", "Bergen"), ("note", ""), ("source", "S")],
        ]);
        let (cleaned, summary) = bulk(t);
        assert_eq!(cleaned.cell(0, "city"), Some(&Cell::text("Oslo")));
        assert!(!cleaned.has_column("note"));
        assert_eq!(summary.null_columns_dropped, vec!["note".to_string()]);
        // second row has no data left outside lineage
        assert_eq!(cleaned.row_count(), 2);
        assert_eq!(summary.null_rows_dropped, 1);
    }

    #[test]
    fn numeric_coercion_needs_more_than_eighty_percent() {
        let five = |vals: [&str; 5]| {
            let rows: Vec<Vec<(&str, &str)>> = vals.iter().map(|v| vec![("v", *v)]).collect();
            let refs: Vec<&[(&str, &str)]> = rows.iter().map(|r| r.as_slice()).collect();
            bulk(table(&refs)).0
        };
        // 4 of 5 is exactly 80%: stays text
        let t = five(["1", "2", "3", "4", "x"]);
        assert_eq!(t.cell(4, "v"), Some(&Cell::text("x")));

        let mut rows: Vec<Vec<(&str, &str)>> = ["1", "2", "3", "4", "5", "6", "7", "8", "9"]
            .iter()
            .map(|v| vec![("v", *v), ("k", "row")])
            .collect();
        rows.push(vec![("v", "oops"), ("k", "row")]);
        let refs: Vec<&[(&str, &str)]> = rows.iter().map(|r| r.as_slice()).collect();
        let (t, summary) = bulk(table(&refs));
        assert_eq!(summary.numeric_columns, vec!["v".to_string()]);
        assert_eq!(t.cell(0, "v"), Some(&Cell::Number(1.0)));
        assert_eq!(t.cell(9, "v"), Some(&Cell::Null));
    }

    #[test]
    fn timestamps_are_canonical_and_failures_null() {
        let t = table(&[
            &[("created_date", "2024-03-05T08:09:10Z"), ("id", "a")],
            &[("created_date", "05/03/2024"), ("id", "b")],
            &[("created_date", "soon"), ("id", "c")],
        ]);
        let (cleaned, summary) = bulk(t);
        assert_eq!(summary.timestamp_columns, vec!["created_date".to_string()]);
        assert_eq!(cleaned.cell(0, "created_date"), Some(&Cell::text("2024-03-05 08:09:10")));
        assert_eq!(cleaned.cell(1, "created_date"), Some(&Cell::text("2024-05-03 00:00:00")));
        assert_eq!(cleaned.cell(2, "created_date"), Some(&Cell::Null));
    }

    #[test]
    fn case_variants_take_first_spelling() {
        let t = table(&[&[("c", "Oslo")], &[("c", "OSLO")], &[("c", "oslo ")]]);
        let (cleaned, summary) = bulk(t);
        assert_eq!(cleaned.row_count(), 1);
        assert_eq!(summary.duplicates_dropped, 2);
        assert_eq!(cleaned.cell(0, "c"), Some(&Cell::text("Oslo")));
    }

    #[test]
    fn flags_null_or_zero_in_numeric_columns() {
        let t = table(&[
            &[("name", "a"), ("price", "10")],
            &[("name", "b"), ("price", "0")],
            &[("name", ""), ("price", "12")],
            &[("name", "d"), ("price", "13")],
            &[("name", "e"), ("price", "14")],
        ]);
        let (cleaned, summary) = bulk(t);
        assert_eq!(summary.rows_flagged, 1);
        assert_eq!(notes(&cleaned, 0), "");
        assert_eq!(notes(&cleaned, 1), SUSPICIOUS_VALUE_NOTE);
        // null in a text column does not count while numeric columns exist
        assert_eq!(notes(&cleaned, 2), "");
    }

    #[test]
    fn flags_any_null_without_numeric_columns() {
        let t = table(&[&[("a", "x"), ("b", "y")], &[("a", "z"), ("b", "")]]);
        let (cleaned, _) = bulk(t);
        assert_eq!(notes(&cleaned, 0), "");
        assert_eq!(notes(&cleaned, 1), SUSPICIOUS_VALUE_NOTE);
    }

    #[test]
    fn bulk_is_idempotent() {
        let t = table(&[
            &[("name", " Ada "), ("score", "0"), ("seen_at", "2024-01-01T10:00:00Z"), ("source", "S")],
            &[("name", "ada"), ("score", "0"), ("seen_at", "2024-01-01 10:00:00"), ("source", "S")],
            &[("name", "Bo"), ("score", "7"), ("seen_at", "bad"), ("source", "S")],
            &[("name", "None"), ("score", "nan"), ("seen_at", ""), ("source", "S")],
        ]);
        let (once, _) = bulk(t);
        let (twice, summary) = bulk(once.clone());
        assert_eq!(once, twice);
        assert_eq!(summary.duplicates_dropped, 0);
        assert_eq!(summary.null_rows_dropped, 0);
    }

    #[test]
    fn numeric_share_is_judged_after_duplicates_go() {
        // 5 of 7 values parse, but 5 of 6 once the repeated "x" row is dropped
        let t = table(&[
            &[("v", "x"), ("k", "a")],
            &[("v", "x"), ("k", "a")],
            &[("v", "1"), ("k", "b")],
            &[("v", "2"), ("k", "c")],
            &[("v", "3"), ("k", "d")],
            &[("v", "4"), ("k", "e")],
            &[("v", "5"), ("k", "f")],
        ]);
        let (once, summary) = bulk(t);
        assert_eq!(summary.numeric_columns, vec!["v".to_string()]);
        assert_eq!(summary.duplicates_dropped, 1);
        assert_eq!(once.row_count(), 6);
        assert_eq!(once.cell(0, "v"), Some(&Cell::Null));
        assert_eq!(notes(&once, 0), SUSPICIOUS_VALUE_NOTE);

        let (twice, again) = bulk(once.clone());
        assert_eq!(once, twice);
        assert_eq!(again.rows_flagged, 1);
        assert_eq!(notes(&twice, 0), SUSPICIOUS_VALUE_NOTE);
    }

    #[test]
    fn case_folding_reaches_identifier_columns() {
        let t = table(&[&[("code", "aB12"), ("n", "1")], &[("code", "Ab12"), ("n", "2")]]);
        let (cleaned, _) = bulk(t);
        assert_eq!(cleaned.cell(1, "code"), Some(&Cell::text("aB12")));
    }

    #[test]
    fn lineage_columns_are_not_trimmed() {
        let t = table(&[&[("v", "1"), ("source", " API_Source ")]]);
        let (cleaned, _) = bulk(t);
        assert_eq!(cleaned.cell(0, "source"), Some(&Cell::text(" API_Source ")));
    }

    #[test]
    fn targeted_ignores_missing_positions() {
        let mut t = table(&[&[("a", "1")], &[("a", "2")], &[("a", "3")]]);
        let issues = IssueMetadata {
            duplicate_indices: vec![1, 9],
            integrity_fail_indices: vec![1, 2],
        };
        assert_eq!(targeted(&mut t, &issues), 2);
        assert_eq!(t.row_count(), 1);
        assert_eq!(t.cell(0, "a"), Some(&Cell::text("1")));
    }
}
