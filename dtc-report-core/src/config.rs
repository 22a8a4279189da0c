use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::extract::ExtractionConfig;

pub const DEFAULT_TEMPLATE_PATH: &str = "templates/Raport-Diagnoza-Auto.html";
pub const STYLESHEET_PATH: &str = "assets/css/style.css";

/// Where the report template and its assets come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Tried first, through the page fetcher.
    pub url: Option<String>,
    /// Read from disk when `url` is unset or fails.
    pub path: PathBuf,
    pub assets_base_url: Option<String>,
    pub inline_css: bool,
    pub css_url: Option<String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            assets_base_url: None,
            inline_css: true,
            css_url: None,
        }
    }
}

impl TemplateConfig {
    /// `css_url`, or `<assets_base_url>/assets/css/style.css`.
    pub fn effective_css_url(&self) -> Option<String> {
        if let Some(url) = self.css_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Some(url.to_string());
        }
        self.assets_base_url
            .as_deref()
            .map(|base| base.trim_end_matches('/'))
            .filter(|base| !base.is_empty())
            .map(|base| format!("{base}/{STYLESHEET_PATH}"))
    }
}

/// Everything the per-report pipeline needs besides its I/O collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl PipelineConfig {
    pub fn trace_loaded(&self) {
        info!(
            template_url = self.template.url.as_deref().unwrap_or(""),
            template_path = %self.template.path.display(),
            inline_css = self.template.inline_css,
            css_url = self.template.effective_css_url().as_deref().unwrap_or(""),
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
        self.extraction.trace_loaded();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_url_derives_from_assets_base() {
        let config = TemplateConfig {
            assets_base_url: Some("https://cdn.example.com/".into()),
            ..Default::default()
        };
        assert_eq!(
            config.effective_css_url().as_deref(),
            Some("https://cdn.example.com/assets/css/style.css")
        );
    }

    #[test]
    fn explicit_css_url_wins() {
        let config = TemplateConfig {
            assets_base_url: Some("https://cdn.example.com".into()),
            css_url: Some("https://other.example.com/s.css".into()),
            ..Default::default()
        };
        assert_eq!(
            config.effective_css_url().as_deref(),
            Some("https://other.example.com/s.css")
        );
        assert_eq!(TemplateConfig::default().effective_css_url(), None);
    }
}
