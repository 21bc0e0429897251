// Data processing pipeline: ingestion, processing, storage, and the run controller

pub mod controller;
pub mod ingestion;
pub mod processing;
pub mod storage;

pub use controller::{
    FailureKind, PipelineController, PipelineStep, RunOutcome, RunParameters, RunReport,
    StepFailure,
};
