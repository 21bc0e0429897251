pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use config::Settings;
pub use domain::{Cell, RawArtifact, Record, SourceKind};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineController, RunParameters, RunReport};
