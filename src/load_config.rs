use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use dtc_report_core::config::{PipelineConfig, TemplateConfig};
use dtc_report_core::extract::ExtractionConfig;
use serde::Deserialize;
use tracing::{debug, error, info};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5";
pub const DEFAULT_REASONING_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Reasoning service settings. The API key is not part of the file; it comes
/// from `OPENAI_API_KEY`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_REASONING_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

/// Fully merged configuration for one CLI invocation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub reasoning: ReasoningConfig,
    pub fetch: FetchConfig,
    pub pipeline: PipelineConfig,
    pub output_dir: PathBuf,
}

impl AppConfig {
    pub fn trace_loaded(&self) {
        info!(
            endpoint = %self.reasoning.endpoint,
            model = %self.reasoning.model,
            reasoning_timeout_secs = self.reasoning.timeout_secs,
            fetch_timeout_secs = self.fetch.timeout_secs,
            output_dir = %self.output_dir.display(),
            "Loaded AppConfig"
        );
        self.pipeline.trace_loaded();
    }
}

#[derive(Deserialize)]
struct StaticConfig {
    #[serde(default)]
    reasoning: ReasoningConfig,
    #[serde(default)]
    fetch: FetchConfig,
    #[serde(default)]
    template: TemplateConfig,
    #[serde(default)]
    extraction: ExtractionConfig,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./out")
}

/// Loads a static YAML config file (no secrets).
/// Returns the merged AppConfig or an error naming the file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let static_conf: StaticConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML {:?}: {e}", path_ref));
        }
    };

    if let Err(e) = static_conf.extraction.validate() {
        error!(error = %e, config_path = ?path_ref, "Invalid extraction section");
        anyhow::bail!("Invalid extraction config in {:?}: {e}", path_ref);
    }
    if static_conf.reasoning.endpoint.trim().is_empty() {
        error!(config_path = ?path_ref, "reasoning.endpoint is empty");
        anyhow::bail!("reasoning.endpoint must not be empty in {:?}", path_ref);
    }

    let config = AppConfig {
        reasoning: static_conf.reasoning,
        fetch: static_conf.fetch,
        pipeline: PipelineConfig {
            template: static_conf.template,
            extraction: static_conf.extraction,
        },
        output_dir: static_conf.output_dir,
    };
    debug!(?config, "Config loaded and merged (full debug)");
    Ok(config)
}
