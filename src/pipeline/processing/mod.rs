// Pipeline processing: extraction, unification, remediation and scoring

pub mod extract;
pub mod quality_gate;
pub mod remediate;
pub mod table;
pub mod temporal;
pub mod unify;

pub use quality_gate::{IssueMetadata, NativeScorer, QualityReport, QualityScorer};
pub use remediate::{BulkOutcome, Remediation, Remediator};
pub use table::Table;
pub use unify::{ExtractedBatch, UnifyOutcome};
