//! Metrics for the unify/score/remediate loop.
//!
//! Recording goes through the `metrics` facade; nothing is recorded until
//! [`init`] installs the Prometheus recorder, so library users and tests can
//! ignore this module entirely.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

/// All metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    IngestArtifactsStored,
    IngestFetchErrors,
    ExtractRecords,
    ExtractFailures,
    UnifyRows,
    RemediationRowsDropped,
    RemediationRowsFlagged,
    QualityScore,
    FeedbackPasses,
    PipelineFailures,
    PurgeFailures,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::IngestArtifactsStored => "trust_ingest_artifacts_stored_total",
            MetricName::IngestFetchErrors => "trust_ingest_fetch_errors_total",
            MetricName::ExtractRecords => "trust_extract_records_total",
            MetricName::ExtractFailures => "trust_extract_failures_total",
            MetricName::UnifyRows => "trust_unify_rows",
            MetricName::RemediationRowsDropped => "trust_remediation_rows_dropped_total",
            MetricName::RemediationRowsFlagged => "trust_remediation_rows_flagged_total",
            MetricName::QualityScore => "trust_quality_score",
            MetricName::FeedbackPasses => "trust_feedback_passes_total",
            MetricName::PipelineFailures => "trust_pipeline_failures_total",
            MetricName::PurgeFailures => "trust_purge_failures_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once per process
pub fn init() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
            info!("Metrics recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Render the current snapshot in Prometheus text format
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub mod ingest {
    use super::MetricName;

    pub fn artifact_stored(kind: &str) {
        ::metrics::counter!(MetricName::IngestArtifactsStored.as_str(), "kind" => kind.to_string())
            .increment(1);
    }

    pub fn fetch_error(kind: &str) {
        ::metrics::counter!(MetricName::IngestFetchErrors.as_str(), "kind" => kind.to_string())
            .increment(1);
    }
}

pub mod extract {
    use super::MetricName;

    pub fn records(kind: &str, count: usize) {
        ::metrics::counter!(MetricName::ExtractRecords.as_str(), "kind" => kind.to_string())
            .increment(count as u64);
    }

    pub fn failure(kind: &str) {
        ::metrics::counter!(MetricName::ExtractFailures.as_str(), "kind" => kind.to_string())
            .increment(1);
    }
}

pub mod processing {
    use super::MetricName;

    pub fn unified_rows(rows: usize) {
        ::metrics::gauge!(MetricName::UnifyRows.as_str()).set(rows as f64);
    }

    pub fn rows_dropped(mode: &str, count: usize) {
        ::metrics::counter!(MetricName::RemediationRowsDropped.as_str(), "mode" => mode.to_string())
            .increment(count as u64);
    }

    pub fn rows_flagged(count: usize) {
        ::metrics::counter!(MetricName::RemediationRowsFlagged.as_str()).increment(count as u64);
    }

    pub fn quality_score(pass: &str, score: f64) {
        ::metrics::histogram!(MetricName::QualityScore.as_str(), "pass" => pass.to_string())
            .record(score);
    }
}

pub mod pipeline {
    use super::MetricName;

    pub fn feedback_pass() {
        ::metrics::counter!(MetricName::FeedbackPasses.as_str()).increment(1);
    }

    pub fn failure(step: &str) {
        ::metrics::counter!(MetricName::PipelineFailures.as_str(), "step" => step.to_string())
            .increment(1);
    }

    pub fn purge_failure() {
        ::metrics::counter!(MetricName::PurgeFailures.as_str()).increment(1);
    }
}
