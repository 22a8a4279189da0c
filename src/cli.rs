//! # dtc-report CLI Interface (Module)
//!
//! Command parsing and orchestration glue for the `dtc-report` binary.
//! Extraction, analysis, rendering and the pipeline itself live in the
//! [`dtc-report-core`] crate; this module wires real HTTP clients into it
//! and writes the artifacts to disk.
//!
//! ## How To Use
//! - Command line: `dtc-report --help`.
//! - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
//!
//! [`dtc-report-core`]: ../../dtc-report-core/

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dtc_report_core::extract::extract_with;
use dtc_report_core::pipeline::{process_email_body, process_report_url, RenderedReport};

use crate::fetch::HttpFetcher;
use crate::llm::OpenAiClient;
use crate::load_config::{load_config, AppConfig};

/// CLI for dtc-report: explain scan-tool reports and render them as HTML.
#[derive(Parser)]
#[clap(
    name = "dtc-report",
    version,
    about = "Turn TOPDON diagnostic reports into explained, template-rendered HTML reports"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline for one report and write the HTML artifacts
    Process {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,

        #[clap(flatten)]
        input: ProcessInput,
    },
    /// Extract a DiagnosticReport from a saved report page and print it as JSON
    Extract {
        /// Saved report page (HTML)
        #[clap(long)]
        file: PathBuf,

        /// URL recorded in the report
        #[clap(long, default_value = "")]
        url: String,

        /// Optional YAML config whose `extraction` section is used
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct ProcessInput {
    /// Notification email body to take the report link from (`-` for stdin)
    #[clap(long)]
    pub email: Option<PathBuf>,

    /// Report page URL
    #[clap(long)]
    pub url: Option<String>,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Process { config, input } => {
            let config = load_config(config)?;
            config.trace_loaded();
            tracing::info!(command = "process", "Starting report pipeline");
            let rendered = process(&config, input).await?;
            for path in write_artifacts(&config.output_dir, &rendered)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Commands::Extract { file, url, config } => {
            let extraction = match config {
                Some(path) => load_config(path)?.pipeline.extraction,
                None => Default::default(),
            };
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read report page {}", file.display()))?;
            let outcome = extract_with(&html, &url, &extraction)?;
            tracing::info!(
                command = "extract",
                strategy = ?outcome.strategy,
                dtcs = outcome.report.dtcs.len(),
                "Extraction complete"
            );
            println!("{}", serde_json::to_string_pretty(&outcome.report)?);
            Ok(())
        }
    }
}

async fn process(config: &AppConfig, input: ProcessInput) -> Result<RenderedReport> {
    let fetcher = HttpFetcher::new(config.fetch.timeout_secs)?;
    let client = OpenAiClient::new_from_env(&config.reasoning)
        .map_err(|e| anyhow::anyhow!("Failed to construct reasoning client from env: {e}"))?;

    let result = match (input.email, input.url) {
        (Some(email), _) => {
            let body = read_email(&email)?;
            process_email_body(&config.pipeline, &fetcher, &client, &body).await
        }
        (None, Some(url)) => process_report_url(&config.pipeline, &fetcher, &client, &url).await,
        (None, None) => anyhow::bail!("either --email or --url is required"),
    };

    match result {
        Ok(rendered) => {
            tracing::info!(
                command = "process",
                run_id = %rendered.run_id,
                file_name = %rendered.file_name,
                provenance = ?rendered.analysis.provenance,
                "Report pipeline complete"
            );
            Ok(rendered)
        }
        Err(e) => {
            tracing::error!(command = "process", error = %e, "Report pipeline failed");
            Err(e.into())
        }
    }
}

fn read_email(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("Failed to read email body from stdin")?;
        return Ok(body);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read email body {}", path.display()))
}

/// Write `<file_name>` and, when present, `<file_name>.email.html` into
/// `output_dir`. Returns the written paths.
pub fn write_artifacts(output_dir: &Path, rendered: &RenderedReport) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut written = Vec::new();
    let html_path = output_dir.join(&rendered.file_name);
    std::fs::write(&html_path, &rendered.html)
        .with_context(|| format!("Failed to write {}", html_path.display()))?;
    written.push(html_path);

    if let Some(email_html) = &rendered.email_html {
        let email_path = output_dir.join(format!("{}.email.html", rendered.file_name));
        std::fs::write(&email_path, email_html)
            .with_context(|| format!("Failed to write {}", email_path.display()))?;
        written.push(email_path);
    }

    tracing::info!(count = written.len(), output_dir = %output_dir.display(), "Artifacts written");
    Ok(written)
}
