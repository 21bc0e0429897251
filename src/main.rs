use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use trust_pipeline::config::Settings;
use trust_pipeline::domain::SourceKind;
use trust_pipeline::logging;
use trust_pipeline::metrics;
use trust_pipeline::pipeline::ingestion::IngestRequest;
use trust_pipeline::pipeline::processing::extract::sensor;
use trust_pipeline::pipeline::processing::quality_gate::{self, NativeScorer};
use trust_pipeline::pipeline::{PipelineController, RunOutcome, RunParameters};

#[derive(Parser)]
#[command(name = "trust-pipeline")]
#[command(about = "Unify raw data, score its trustworthiness, and remediate it")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML config file (defaults to trust-pipeline.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print a Prometheus metrics snapshot after the command finishes
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one source and run the full unify, remediate, score loop
    Run {
        /// Source type: api, scraping, upload, pdf, docx, json_upload,
        /// xlsx_upload, xml_upload, parquet_upload, zip_upload, others_upload
        #[arg(long, default_value = "api")]
        source: SourceKind,
        /// Source URL for api or scraping
        #[arg(long)]
        url: Option<String>,
        /// Local file for upload sources
        #[arg(long)]
        file: Option<PathBuf>,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date (YYYY-MM-DD), inclusive
        #[arg(long)]
        end: Option<NaiveDate>,
        /// API key sent as Bearer and x-api-key headers
        #[arg(long, env = "TRUST_API_KEY")]
        api_key: Option<String>,
    },
    /// Score an existing parquet or CSV table without remediating it
    Score {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print how an unrecognized file would be classified
    Sense {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    logging::init_logging(&settings.logging);
    if cli.metrics {
        metrics::init();
    }

    match cli.command {
        Commands::Run {
            source,
            url,
            file,
            start,
            end,
            api_key,
        } => {
            let request = match (url, file) {
                (Some(url), _) if source.is_remote() => IngestRequest::remote(source, url),
                (_, Some(file)) => IngestRequest::upload(source, file),
                (Some(url), None) => IngestRequest::remote(source, url),
                (None, None) => anyhow::bail!("either --url or --file is required"),
            }
            .with_api_key(api_key);

            println!("🚀 Running pipeline for source '{}'...", source);
            let controller = PipelineController::new(settings)?;
            let report = controller.run(RunParameters::new(request).with_window(start, end)).await;

            match &report.outcome {
                RunOutcome::Scored { .. } => info!(run_id = %report.run_id, "Run complete"),
                RunOutcome::NoData => println!("⚠️  No data found for this period"),
                RunOutcome::Failed(failure) => {
                    error!("Pipeline failed: {}", failure);
                    println!("❌ {}", failure);
                }
            }
            println!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
        Commands::Score { file } => {
            let report = quality_gate::score_file(&NativeScorer::new(), &file)
                .with_context(|| format!("scoring {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Sense { file } => {
            let payload = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let name = file.file_name().map(|n| n.to_string_lossy().into_owned());
            let format = sensor::sense(name.as_deref(), &payload);
            println!("{}: {}", file.display(), format);
        }
    }

    if cli.metrics {
        if let Some(snapshot) = metrics::render() {
            println!("{snapshot}");
        }
    }
    Ok(())
}
