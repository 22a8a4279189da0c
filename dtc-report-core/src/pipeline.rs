//! Per-report orchestration: link → page → report → analysis → rendered HTML.
//!
//! # Steps
//! 1. ([`process_email_body`] only) find the vendor report link in the mail body
//! 2. fetch the report page through the [`PageFetcher`]
//! 3. extract a [`DiagnosticReport`] with the configured strategy cascade
//! 4. analyze it with the [`ReasoningClient`] (never fails, see [`crate::analyze`])
//! 5. load the template (URL first, then disk) and, for mail, the stylesheet
//! 6. render, absolutize assets, and build the mail variant
//!
//! A fetch failure is terminal for the report and is returned to the caller;
//! nothing here retries it. Every run carries a `run_id` on its tracing span so
//! the log lines of one report can be grouped.
//!
//! The pipeline writes nothing. Persisting the artifact is the caller's job.

use std::path::Path;

use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analyze;
use crate::config::{PipelineConfig, TemplateConfig};
use crate::contract::{FetchError, PageFetcher, ReasoningClient};
use crate::extract::{ExtractionConfigError, ReportExtractor};
use crate::link::extract_report_link;
use crate::model::{AnalysisOutcome, DiagnosticReport};
use crate::render;
use crate::strategy::StrategyKind;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no report link found in message body")]
    NoLink,

    #[error("failed to fetch report page: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to load template: {0}")]
    Template(String),

    #[error("invalid extraction config: {0}")]
    Config(#[from] ExtractionConfigError),
}

/// The finished artifact of one run.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub run_id: Uuid,
    /// `Raport_<VIN>.html`.
    pub file_name: String,
    /// Rendered report with absolute asset URLs.
    pub html: String,
    /// Mail-ready variant: stylesheet inlined, scripts removed. Only set by
    /// [`process_email_body`].
    pub email_html: Option<String>,
    pub report: DiagnosticReport,
    pub strategy: Option<StrategyKind>,
    pub analysis: AnalysisOutcome,
}

/// Run the pipeline for the report linked from a vendor mail body.
pub async fn process_email_body<F, C>(
    config: &PipelineConfig,
    fetcher: &F,
    client: &C,
    body: &str,
) -> Result<RenderedReport, PipelineError>
where
    F: PageFetcher + ?Sized,
    C: ReasoningClient + ?Sized,
{
    let Some(url) = extract_report_link(body) else {
        warn!(body_len = body.len(), "[PIPELINE] No report link in message body");
        return Err(PipelineError::NoLink);
    };
    info!(url = %url, "[PIPELINE] Found report link in message body");
    run(config, fetcher, client, &url, true).await
}

/// Run the pipeline for a report page URL.
pub async fn process_report_url<F, C>(
    config: &PipelineConfig,
    fetcher: &F,
    client: &C,
    url: &str,
) -> Result<RenderedReport, PipelineError>
where
    F: PageFetcher + ?Sized,
    C: ReasoningClient + ?Sized,
{
    run(config, fetcher, client, url, false).await
}

async fn run<F, C>(
    config: &PipelineConfig,
    fetcher: &F,
    client: &C,
    url: &str,
    for_email: bool,
) -> Result<RenderedReport, PipelineError>
where
    F: PageFetcher + ?Sized,
    C: ReasoningClient + ?Sized,
{
    let run_id = Uuid::new_v4();
    let span = info_span!("pipeline", %run_id, url);
    run_inner(config, fetcher, client, url, for_email, run_id)
        .instrument(span)
        .await
}

async fn run_inner<F, C>(
    config: &PipelineConfig,
    fetcher: &F,
    client: &C,
    url: &str,
    for_email: bool,
    run_id: Uuid,
) -> Result<RenderedReport, PipelineError>
where
    F: PageFetcher + ?Sized,
    C: ReasoningClient + ?Sized,
{
    info!("[PIPELINE] Starting report pipeline");
    let extractor = ReportExtractor::new(&config.extraction)?;

    // --- Step 1: Fetch the report page ---
    let page = match fetcher.fetch_text(url).await {
        Ok(page) => page,
        Err(e) => {
            error!(error = %e, "[PIPELINE][ERROR] Report page fetch failed; skipping report");
            return Err(PipelineError::Fetch(e));
        }
    };
    debug!(page_len = page.len(), "[PIPELINE] Fetched report page");

    // --- Step 2: Extract ---
    let extraction = extractor.extract(&page, url);

    // --- Step 3: Analyze ---
    let analysis = analyze::analyze_today(client, &extraction.report).await;
    info!(
        provenance = ?analysis.provenance,
        attempts = analysis.attempts,
        errors = analysis.result.initial_errors.len(),
        todo = analysis.result.todo.len(),
        "[PIPELINE] Analysis complete"
    );

    // --- Step 4: Template and stylesheet, concurrently ---
    let css_url = if for_email && config.template.inline_css {
        config.template.effective_css_url()
    } else {
        None
    };
    let (template, css) = futures::join!(
        load_template(&config.template, fetcher),
        load_stylesheet(css_url.as_deref(), fetcher)
    );
    let template = template?;

    // --- Step 5: Render ---
    let rendered = render::render(&template, &extraction.report, &analysis.result);
    let html = match config.template.assets_base_url.as_deref() {
        Some(base) => render::absolutize_assets(&rendered, base),
        None => rendered,
    };
    let email_html = for_email.then(|| {
        let inlined = match css.as_deref() {
            Some(css) => render::inline_stylesheet(&html, css),
            None => html.clone(),
        };
        render::strip_scripts(&inlined)
    });

    let file_name = render::output_file_name(extraction.report.vin.as_deref());
    info!(
        file_name = %file_name,
        html_len = html.len(),
        email = email_html.is_some(),
        "[PIPELINE] Report rendered"
    );

    Ok(RenderedReport {
        run_id,
        file_name,
        html,
        email_html,
        report: extraction.report,
        strategy: extraction.strategy,
        analysis,
    })
}

/// Template from `url` through the fetcher, else from `path` on disk.
pub async fn load_template<F>(config: &TemplateConfig, fetcher: &F) -> Result<String, PipelineError>
where
    F: PageFetcher + ?Sized,
{
    if let Some(url) = config.url.as_deref().filter(|u| !u.trim().is_empty()) {
        match fetcher.fetch_text(url).await {
            Ok(template) => {
                debug!(url, len = template.len(), "[PIPELINE] Loaded template from URL");
                return Ok(template);
            }
            Err(e) => warn!(url, error = %e, "[PIPELINE] Template URL failed; trying local file"),
        }
    }
    read_template_file(&config.path)
}

fn read_template_file(path: &Path) -> Result<String, PipelineError> {
    match std::fs::read_to_string(path) {
        Ok(template) => {
            debug!(path = %path.display(), len = template.len(), "[PIPELINE] Loaded template from disk");
            Ok(template)
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "[PIPELINE][ERROR] Template unavailable");
            Err(PipelineError::Template(format!("{}: {e}", path.display())))
        }
    }
}

async fn load_stylesheet<F>(css_url: Option<&str>, fetcher: &F) -> Option<String>
where
    F: PageFetcher + ?Sized,
{
    let url = css_url?;
    match fetcher.fetch_text(url).await {
        Ok(css) => Some(css),
        Err(e) => {
            warn!(url, error = %e, "[PIPELINE] Stylesheet fetch failed; keeping link");
            None
        }
    }
}
