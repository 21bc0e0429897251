use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::constants::{STATUS_NO_DATA, STATUS_SUCCESS};
use crate::error::Result;
use crate::metrics;
use crate::pipeline::processing::table::Table;
use crate::pipeline::storage;

pub mod dimensions;

/// Scores for the seven trust dimensions, each within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DimensionScores {
    pub completeness: f64,
    pub accuracy: f64,
    pub validity: f64,
    pub consistency: f64,
    pub uniqueness: f64,
    pub integrity: f64,
    pub lineage: f64,
}

impl DimensionScores {
    pub fn as_array(&self) -> [f64; 7] {
        [
            self.completeness,
            self.accuracy,
            self.validity,
            self.consistency,
            self.uniqueness,
            self.integrity,
            self.lineage,
        ]
    }

    /// Unweighted mean of the seven scores, rounded to 2 decimals
    pub fn mean(&self) -> f64 {
        round2(self.as_array().iter().sum::<f64>() / 7.0)
    }
}

/// Row positions responsible for uniqueness and integrity defects. This is
/// the only input the targeted remediation pass receives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueMetadata {
    pub duplicate_indices: Vec<usize>,
    pub integrity_fail_indices: Vec<usize>,
}

impl IssueMetadata {
    pub fn is_empty(&self) -> bool {
        self.duplicate_indices.is_empty() && self.integrity_fail_indices.is_empty()
    }
}

/// Outcome of scoring one table. Built fresh on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_records: usize,
    pub overall_trustability: f64,
    pub status: String,
    pub dimensions: DimensionScores,
    pub issue_metadata: IssueMetadata,
}

impl QualityReport {
    /// Zero-valued report for an empty table or an empty period
    pub fn no_data() -> Self {
        Self {
            total_records: 0,
            overall_trustability: 0.0,
            status: STATUS_NO_DATA.to_string(),
            dimensions: DimensionScores::default(),
            issue_metadata: IssueMetadata::default(),
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.total_records == 0 && self.status == STATUS_NO_DATA
    }
}

/// Trait for computing the trust report of a table. Alternative engines
/// plug in here and must honour the same seven-dimension contract.
pub trait QualityScorer: Send + Sync {
    fn score(&self, table: &Table) -> Result<QualityReport>;
}

/// Heuristic scorer that is always available
#[derive(Debug, Clone, Default)]
pub struct NativeScorer {
    pub config: ScorerConfig,
}

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Absolute z-score above which a numeric cell counts as an outlier
    pub outlier_z: f64,
    /// Fixed reference time for the consistency check; `None` means now
    pub reference_time: Option<DateTime<Utc>>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            outlier_z: 3.0,
            reference_time: None,
        }
    }
}

impl NativeScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Score against an explicit reference time
    pub fn score_at(&self, table: &Table, now: DateTime<Utc>) -> QualityReport {
        if table.is_empty() {
            debug!("Scoring empty table");
            return QualityReport::no_data();
        }

        let duplicate_indices = table.duplicate_rows();
        let dimensions = DimensionScores {
            completeness: round2(dimensions::completeness(table)),
            accuracy: round2(dimensions::accuracy(table, self.config.outlier_z)),
            validity: round2(dimensions::validity(table)),
            consistency: round2(dimensions::consistency(table, now)),
            uniqueness: round2(dimensions::uniqueness(table, duplicate_indices.len())),
            integrity: round2(dimensions::integrity(table)),
            lineage: round2(dimensions::lineage(table)),
        };

        QualityReport {
            total_records: table.row_count(),
            overall_trustability: dimensions.mean(),
            status: STATUS_SUCCESS.to_string(),
            dimensions,
            issue_metadata: IssueMetadata {
                duplicate_indices,
                integrity_fail_indices: dimensions::integrity_failures(table),
            },
        }
    }
}

impl QualityScorer for NativeScorer {
    #[instrument(skip_all, fields(rows = table.row_count()))]
    fn score(&self, table: &Table) -> Result<QualityReport> {
        let now = self.config.reference_time.unwrap_or_else(Utc::now);
        let report = self.score_at(table, now);
        info!(
            overall = report.overall_trustability,
            duplicates = report.issue_metadata.duplicate_indices.len(),
            integrity_failures = report.issue_metadata.integrity_fail_indices.len(),
            "Quality report computed"
        );
        Ok(report)
    }
}

/// Load a parquet or CSV table from disk and score it
pub fn score_file(scorer: &dyn QualityScorer, path: &Path) -> Result<QualityReport> {
    let table = storage::load_table(path)?;
    let report = scorer.score(&table)?;
    metrics::processing::quality_score("adhoc", report.overall_trustability);
    Ok(report)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cell, Record};

    fn table(rows: &[&[(&str, Cell)]]) -> Table {
        let records: Vec<Record> = rows.iter().map(|r| r.iter().cloned().collect()).collect();
        Table::from_records(&records)
    }

    fn lineage(source: &str) -> [(&'static str, Cell); 2] {
        [
            ("source", Cell::text(source)),
            ("ingested_at", Cell::text("2024-01-01 00:00:00")),
        ]
    }

    fn row(name: &str, source: &str) -> Vec<(&'static str, Cell)> {
        let mut r = vec![("name", Cell::text(name))];
        r.extend(lineage(source));
        r
    }

    #[test]
    fn empty_table_is_no_data() {
        let report = NativeScorer::new().score(&Table::new()).unwrap();
        assert!(report.is_no_data());
        assert_eq!(report.dimensions.as_array(), [0.0; 7]);
        assert!(report.issue_metadata.is_empty());
    }

    #[test]
    fn one_duplicate_pair_in_four_rows() {
        let rows = [row("a", "S"), row("b", "S"), row("a", "S"), row("c", "S")];
        let refs: Vec<&[(&str, Cell)]> = rows.iter().map(|r| r.as_slice()).collect();
        let report = NativeScorer::new().score(&table(&refs)).unwrap();
        assert_eq!(report.dimensions.uniqueness, 75.0);
        assert_eq!(report.issue_metadata.duplicate_indices, vec![2]);
        assert_eq!(report.status, "Success");
    }

    #[test]
    fn missing_source_column() {
        let t = table(&[&[("name", Cell::text("a")), ("ingested_at", Cell::text("2024-01-01"))]]);
        let report = NativeScorer::new().score(&t).unwrap();
        assert_eq!(report.dimensions.lineage, 0.0);
        assert_eq!(report.dimensions.integrity, 50.0);
    }

    #[test]
    fn overall_is_mean_of_dimensions() {
        let t = table(&[
            &[("v", Cell::Number(1.0)), ("w", Cell::Null)],
            &[("v", Cell::Number(2.0)), ("w", Cell::text("x"))],
            &[("v", Cell::Null), ("w", Cell::text("y"))],
        ]);
        let report = NativeScorer::new().score(&t).unwrap();
        for score in report.dimensions.as_array() {
            assert!((0.0..=100.0).contains(&score));
        }
        assert_eq!(report.overall_trustability, report.dimensions.mean());
    }

    #[test]
    fn report_serializes_with_dimension_names() {
        let rows = [row("a", "S")];
        let refs: Vec<&[(&str, Cell)]> = rows.iter().map(|r| r.as_slice()).collect();
        let report = NativeScorer::new().score(&table(&refs)).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dimensions"]["Completeness"], 100.0);
        assert_eq!(json["dimensions"]["Lineage"], 100.0);
        assert!(json["issue_metadata"]["duplicate_indices"].is_array());
    }

    #[test]
    fn rescoring_is_deterministic() {
        let rows = [row("a", "S"), row("a", "S"), row("b", "T")];
        let refs: Vec<&[(&str, Cell)]> = rows.iter().map(|r| r.as_slice()).collect();
        let t = table(&refs);
        let scorer = NativeScorer::with_config(ScorerConfig {
            reference_time: Some(Utc::now()),
            ..ScorerConfig::default()
        });
        let first = serde_json::to_string(&scorer.score(&t).unwrap()).unwrap();
        let second = serde_json::to_string(&scorer.score(&t).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
