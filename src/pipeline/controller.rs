use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::Result;
use crate::metrics;
use crate::pipeline::ingestion::{Fetcher, HttpFetcher, IngestRequest, Ingestor};
use crate::pipeline::processing::extract::{self, ExtractContext};
use crate::pipeline::processing::quality_gate::{NativeScorer, QualityReport, QualityScorer};
use crate::pipeline::processing::remediate::{BulkOutcome, Remediation, Remediator};
use crate::pipeline::processing::unify::{self, ExtractedBatch, UnifyOutcome};
use crate::pipeline::storage::{Canonical, CanonicalStore, RawStore};

/// States of one pipeline run, in the order they can be visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Ingesting,
    Unifying,
    RemediatingBulk,
    ScoringInitial,
    RemediatingTargeted,
    ScoringFinal,
    Done,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Ingesting => "ingestion",
            PipelineStep::Unifying => "unification",
            PipelineStep::RemediatingBulk => "remediation",
            PipelineStep::ScoringInitial => "validation",
            PipelineStep::RemediatingTargeted => "targeted_remediation",
            PipelineStep::ScoringFinal => "revalidation",
            PipelineStep::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure categories surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    NoDataFound,
    UnificationFailed,
    RemediationFailed,
    QaFailed,
    PipelineError,
}

impl FailureKind {
    pub fn status(&self) -> &'static str {
        match self {
            FailureKind::NoDataFound => crate::constants::STATUS_NO_DATA,
            FailureKind::UnificationFailed => "Unification Failed",
            FailureKind::RemediationFailed => "Remediation Failed",
            FailureKind::QaFailed => "QA Failed",
            FailureKind::PipelineError => "Error",
        }
    }
}

/// A failed run: the step that was active and what went wrong
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub step: PipelineStep,
    pub kind: FailureKind,
    pub error: String,
}

impl StepFailure {
    pub fn new(step: PipelineStep, kind: FailureKind, error: impl fmt::Display) -> Self {
        Self {
            step,
            kind,
            error: error.to_string(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind.status(), self.step, self.error)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Nothing was extracted; remediation and scoring never ran
    NoData,
    /// Scored at least once; `final_report` is set when the feedback pass ran
    Scored {
        initial: QualityReport,
        final_report: Option<QualityReport>,
    },
    Failed(StepFailure),
}

/// Everything a caller learns about one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Steps entered, in order
    pub trace: Vec<PipelineStep>,
}

impl RunReport {
    /// The report that stands for the run: the re-score when the feedback
    /// pass ran, else the initial score, else the zero-valued no-data report
    pub fn quality_report(&self) -> Option<QualityReport> {
        match &self.outcome {
            RunOutcome::NoData => Some(QualityReport::no_data()),
            RunOutcome::Scored {
                initial,
                final_report,
            } => Some(final_report.clone().unwrap_or_else(|| initial.clone())),
            RunOutcome::Failed(_) => None,
        }
    }

    pub fn feedback_applied(&self) -> bool {
        self.trace.contains(&PipelineStep::RemediatingTargeted)
    }

    /// Report-shaped value handed to the trigger boundary. Failures keep the
    /// same top-level keys with zero counts.
    pub fn to_json(&self) -> Value {
        match (&self.outcome, self.quality_report()) {
            (RunOutcome::Failed(failure), _) => json!({
                "status": failure.kind.status(),
                "error": failure.error,
                "step": failure.step,
                "total_records": 0,
                "overall_trustability": 0.0,
                "dimensions": {},
                "run_id": self.run_id,
            }),
            (outcome, Some(report)) => {
                let mut value = serde_json::to_value(&report).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.insert("run_id".into(), json!(self.run_id));
                    if let RunOutcome::Scored { initial, .. } = outcome {
                        map.insert("feedback_applied".into(), json!(self.feedback_applied()));
                        map.insert(
                            "initial_trustability".into(),
                            json!(initial.overall_trustability),
                        );
                    }
                }
                value
            }
            (_, None) => Value::Null,
        }
    }
}

/// Parameters of one pipeline run
#[derive(Debug, Clone)]
pub struct RunParameters {
    pub request: IngestRequest,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl RunParameters {
    pub fn new(request: IngestRequest) -> Self {
        Self {
            request,
            start: None,
            end: None,
        }
    }

    pub fn with_window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// Sequences ingestion, unification, remediation and scoring, with at most
/// one feedback pass. Runs against the same data directory must not overlap.
pub struct PipelineController {
    settings: Settings,
    raw: RawStore,
    canonical: CanonicalStore,
    fetcher: Arc<dyn Fetcher>,
    remediator: Arc<dyn Remediation>,
    scorer: Arc<dyn QualityScorer>,
}

impl PipelineController {
    /// Controller wired with the HTTP fetcher, native remediator and scorer
    pub fn new(settings: Settings) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&settings.http)?);
        Ok(Self::with_components(
            settings,
            fetcher,
            Arc::new(Remediator::new()),
            Arc::new(NativeScorer::new()),
        ))
    }

    pub fn with_components(
        settings: Settings,
        fetcher: Arc<dyn Fetcher>,
        remediator: Arc<dyn Remediation>,
        scorer: Arc<dyn QualityScorer>,
    ) -> Self {
        let raw = RawStore::new(settings.storage.raw_dir());
        let canonical = CanonicalStore::new(settings.storage.processed_dir());
        Self {
            settings,
            raw,
            canonical,
            fetcher,
            remediator,
            scorer,
        }
    }

    pub fn raw_store(&self) -> &RawStore {
        &self.raw
    }

    pub fn canonical_store(&self) -> &CanonicalStore {
        &self.canonical
    }

    /// Full run from one ingest request. Always returns a report; failures
    /// are carried in the outcome, never raised.
    #[instrument(skip_all, fields(kind = %params.request.kind))]
    pub async fn run(&self, params: RunParameters) -> RunReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut trace = vec![PipelineStep::Ingesting];
        info!(%run_id, "Pipeline run started");

        let batches = match self.ingest(&params).await {
            Ok(batches) => batches,
            Err(e) => {
                let failure = StepFailure::new(PipelineStep::Ingesting, FailureKind::PipelineError, e);
                return self.finish(run_id, RunOutcome::Failed(failure), trace, started);
            }
        };

        let outcome = self.process(batches, &mut trace);
        self.finish(run_id, outcome, trace, started)
    }

    /// Run every stage after ingestion over already-extracted batches
    pub fn run_extracted(&self, batches: Vec<ExtractedBatch>) -> RunReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut trace = Vec::new();
        let outcome = self.process(batches, &mut trace);
        self.finish(run_id, outcome, trace, started)
    }

    /// Clear previous results, archive the new artifact, and extract it
    async fn ingest(&self, params: &RunParameters) -> Result<Vec<ExtractedBatch>> {
        self.purge_all()?;

        let ingestor = Ingestor::new(self.fetcher.as_ref(), &self.raw);
        if ingestor.ingest(&params.request).await?.is_none() {
            info!("Ingestion produced no artifact");
            return Ok(Vec::new());
        }

        let kind = params.request.kind;
        let ctx = ExtractContext::from_http(&self.settings.http).with_window(params.start, params.end);
        let batches = self
            .raw
            .latest(kind)?
            .map(|artifact| ExtractedBatch::new(kind, extract::extract(&artifact, &ctx)))
            .into_iter()
            .collect();
        Ok(batches)
    }

    fn process(&self, batches: Vec<ExtractedBatch>, trace: &mut Vec<PipelineStep>) -> RunOutcome {
        trace.push(PipelineStep::Unifying);
        let unified = match unify::unify(batches) {
            UnifyOutcome::NoData => {
                trace.push(PipelineStep::Done);
                return RunOutcome::NoData;
            }
            UnifyOutcome::Unified(table) => table,
        };
        if let Err(e) = unify::persist(&self.canonical, &unified) {
            return fail(PipelineStep::Unifying, FailureKind::UnificationFailed, e);
        }

        trace.push(PipelineStep::RemediatingBulk);
        match self.remediator.run(&self.canonical) {
            Ok(BulkOutcome::Cleaned(_)) => {}
            Ok(BulkOutcome::NoInput) => {
                return fail(
                    PipelineStep::RemediatingBulk,
                    FailureKind::RemediationFailed,
                    "unified table missing or empty",
                );
            }
            Err(e) => return fail(PipelineStep::RemediatingBulk, FailureKind::RemediationFailed, e),
        }

        trace.push(PipelineStep::ScoringInitial);
        let initial = match self.score_cleaned() {
            Ok(report) => report,
            Err(e) => return fail(PipelineStep::ScoringInitial, FailureKind::QaFailed, e),
        };
        metrics::processing::quality_score("initial", initial.overall_trustability);

        let threshold = self.settings.pipeline.trust_threshold;
        if self.settings.pipeline.max_feedback_passes == 0 || initial.overall_trustability >= threshold {
            trace.push(PipelineStep::Done);
            return RunOutcome::Scored {
                initial,
                final_report: None,
            };
        }

        info!(
            score = initial.overall_trustability,
            threshold, "Trust score below threshold; running feedback pass"
        );
        metrics::pipeline::feedback_pass();
        trace.push(PipelineStep::RemediatingTargeted);
        if let Err(e) = self.remediator.targeted(&self.canonical, &initial.issue_metadata) {
            return fail(PipelineStep::RemediatingTargeted, FailureKind::RemediationFailed, e);
        }

        trace.push(PipelineStep::ScoringFinal);
        let final_report = match self.score_cleaned() {
            Ok(report) => report,
            Err(e) => return fail(PipelineStep::ScoringFinal, FailureKind::QaFailed, e),
        };
        metrics::processing::quality_score("final", final_report.overall_trustability);

        trace.push(PipelineStep::Done);
        RunOutcome::Scored {
            initial,
            final_report: Some(final_report),
        }
    }

    fn score_cleaned(&self) -> Result<QualityReport> {
        let table = self.canonical.read(Canonical::Cleaned)?;
        self.scorer.score(&table)
    }

    fn finish(
        &self,
        run_id: Uuid,
        outcome: RunOutcome,
        trace: Vec<PipelineStep>,
        started: Instant,
    ) -> RunReport {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            RunOutcome::Scored { .. } => {
                self.purge_raw();
                info!(%run_id, elapsed_ms, "Pipeline run finished");
            }
            RunOutcome::NoData => info!(%run_id, elapsed_ms, "Pipeline run found no data"),
            RunOutcome::Failed(failure) => {
                metrics::pipeline::failure(failure.step.as_str());
                error!(%run_id, elapsed_ms, step = %failure.step, error = %failure.error, "Pipeline run failed");
            }
        }
        RunReport {
            run_id,
            outcome,
            trace,
        }
    }

    /// Remove raw artifacts and canonical tables left by a previous run
    pub fn purge_all(&self) -> Result<usize> {
        let removed = self.raw.purge()? + self.canonical.clear()?;
        info!(removed, "Previous run results cleared");
        Ok(removed)
    }

    /// Best-effort removal of this run's raw artifacts
    fn purge_raw(&self) {
        if let Err(e) = self.raw.purge() {
            warn!(error = %e, "Raw purge failed; artifacts remain until the next run");
            metrics::pipeline::purge_failure();
        }
    }
}

fn fail(step: PipelineStep, kind: FailureKind, error: impl fmt::Display) -> RunOutcome {
    RunOutcome::Failed(StepFailure::new(step, kind, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_statuses() {
        assert_eq!(FailureKind::RemediationFailed.status(), "Remediation Failed");
        assert_eq!(FailureKind::NoDataFound.status(), "No Data Found for this period");
        assert_eq!(FailureKind::PipelineError.status(), "Error");
    }

    #[test]
    fn failed_run_is_report_shaped() {
        let report = RunReport {
            run_id: Uuid::nil(),
            outcome: fail(PipelineStep::ScoringInitial, FailureKind::QaFailed, "boom"),
            trace: vec![PipelineStep::Unifying],
        };
        let json = report.to_json();
        assert_eq!(json["status"], "QA Failed");
        assert_eq!(json["error"], "boom");
        assert_eq!(json["step"], "scoring_initial");
        assert_eq!(json["total_records"], 0);
        assert_eq!(json["overall_trustability"], 0.0);
    }

    #[test]
    fn no_data_run_has_zero_dimensions() {
        let report = RunReport {
            run_id: Uuid::nil(),
            outcome: RunOutcome::NoData,
            trace: vec![PipelineStep::Unifying, PipelineStep::Done],
        };
        let json = report.to_json();
        assert_eq!(json["status"], "No Data Found for this period");
        assert_eq!(json["dimensions"]["Accuracy"], 0.0);
        assert!(!report.feedback_applied());
    }
}
