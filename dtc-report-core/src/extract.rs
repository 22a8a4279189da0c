//! ReportExtractor: vendor report page → [`DiagnosticReport`].
//!
//! Extraction never fails. The page is reduced to its visible text, scalar
//! metadata is picked from `Label: value` pairs, and DTCs come from the first
//! strategy in the cascade (see [`crate::strategy`]) that finds anything.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::DiagnosticReport;
use crate::strategy::{self, DtcStrategy, StrategyKind};

/// Tunable vocabulary of the extraction strategies.
///
/// Built from vendor exports seen so far; override it in configuration when a
/// new firmware prints different keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Keywords that end a structured DTC line and are kept as its status.
    pub status_keywords: Vec<String>,
    /// Keywords that end a structured DTC line but mean "no status".
    pub unspecified_keywords: Vec<String>,
    /// Extra labels that end a generic OBD-II description.
    pub label_keywords: Vec<String>,
    /// Module name used when the page does not name one.
    pub module_placeholder: String,
    pub tabular_code_min_len: usize,
    pub tabular_code_max_len: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            status_keywords: owned(&[
                "History",
                "Current",
                "Permanent",
                "Intermittent",
                "Memory",
                "Pending",
                "Memorie",
                "Intermitent",
            ]),
            unspecified_keywords: owned(&["Fara status", "Făra status", "Fără status", "No status"]),
            label_keywords: owned(&["Status"]),
            module_placeholder: "ECU".to_string(),
            tabular_code_min_len: 4,
            tabular_code_max_len: 6,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionConfigError {
    #[error("at least one status keyword is required")]
    NoStatusKeywords,

    #[error("invalid tabular code length range {min}..={max}")]
    InvalidCodeLength { min: usize, max: usize },

    #[error("failed to build extraction pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<(), ExtractionConfigError> {
        if self.status_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ExtractionConfigError::NoStatusKeywords);
        }
        let (min, max) = (self.tabular_code_min_len, self.tabular_code_max_len);
        if min == 0 || min > max {
            return Err(ExtractionConfigError::InvalidCodeLength { min, max });
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            status_keywords = self.status_keywords.len(),
            unspecified_keywords = self.unspecified_keywords.len(),
            module_placeholder = %self.module_placeholder,
            "Loaded extraction config"
        );
        debug!(?self, "Extraction config loaded (full debug)");
    }
}

/// A parsed report page: the DOM for table traversal and the collapsed
/// visible text for everything else.
pub struct Page {
    pub text: String,
    document: Html,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let text = visible_text(&document);
        Self { text, document }
    }

    pub fn document(&self) -> &Html {
        &self.document
    }
}

/// Body text with script/style content dropped and whitespace collapsed.
fn visible_text(document: &Html) -> String {
    let body = Selector::parse("body").ok();
    let root = body
        .as_ref()
        .and_then(|sel| document.select(sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bTime:\s*([0-9/:\-\s]+)").expect("static regex must compile")
});
static SN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bSN:\s*([A-Z0-9]+)").expect("static regex must compile")
});
static MAKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bMake:\s*([A-Za-z0-9]+)").expect("static regex must compile")
});
static MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bModel:\s*([A-Za-z0-9/\-\s]+)").expect("static regex must compile")
});
static VIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bVIN:\s*([A-HJ-NPR-Z0-9]{17})\b").expect("static regex must compile")
});
static MILEAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bMileage:\s*([0-9.,]+\s*(?:km|mi))\b").expect("static regex must compile")
});

fn pick(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `Model:` values run into whatever follows; drop a trailing word that is
/// itself the next `Label:`.
fn pick_model(text: &str) -> Option<String> {
    let caps = MODEL_RE.captures(text)?;
    let value = caps.get(1)?;
    let mut model = value.as_str().trim_end().to_string();
    if text[value.end()..].starts_with(':') {
        match model.rfind(char::is_whitespace) {
            Some(idx) => model.truncate(idx),
            None => model.clear(),
        }
    }
    let model = model.trim().to_string();
    (!model.is_empty()).then_some(model)
}

/// Result of one extraction, with the strategy that produced the DTCs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub report: DiagnosticReport,
    pub strategy: Option<StrategyKind>,
}

/// Ordered DTC strategy cascade plus scalar field extraction.
pub struct ReportExtractor {
    strategies: Vec<Box<dyn DtcStrategy>>,
}

static DEFAULT_EXTRACTOR: LazyLock<ReportExtractor> = LazyLock::new(|| {
    ReportExtractor::new(&ExtractionConfig::default())
        .expect("default extraction config must compile")
});

impl ReportExtractor {
    /// Structured-line, then generic OBD-II, then tabular.
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionConfigError> {
        config.validate()?;
        Ok(Self::with_strategies(strategy::default_cascade(config)?))
    }

    pub fn with_strategies(strategies: Vec<Box<dyn DtcStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> impl Iterator<Item = StrategyKind> + '_ {
        self.strategies.iter().map(|s| s.kind())
    }

    pub fn extract(&self, html: &str, url: &str) -> ExtractionOutcome {
        let page = Page::parse(html);
        debug!(url, text_len = page.text.len(), "[EXTRACT] Page reduced to visible text");

        let mut report = DiagnosticReport {
            url: url.to_string(),
            vin: pick(&VIN_RE, &page.text),
            make: pick(&MAKE_RE, &page.text),
            model: pick_model(&page.text),
            mileage: pick(&MILEAGE_RE, &page.text),
            time: pick(&TIME_RE, &page.text),
            serial_number: pick(&SN_RE, &page.text),
            dtcs: Vec::new(),
        };

        let mut winner = None;
        for strategy in &self.strategies {
            let dtcs = strategy.extract(&page);
            debug!(strategy = ?strategy.kind(), found = dtcs.len(), "[EXTRACT] Strategy finished");
            if !dtcs.is_empty() {
                winner = Some(strategy.kind());
                report.dtcs = dtcs;
                break;
            }
        }

        match winner {
            Some(kind) => info!(
                url,
                strategy = ?kind,
                dtcs = report.dtcs.len(),
                vin = report.vin.as_deref().unwrap_or(""),
                "[EXTRACT] Extracted diagnostic report"
            ),
            None => warn!(url, "[EXTRACT] No DTCs found by any strategy"),
        }

        ExtractionOutcome {
            report,
            strategy: winner,
        }
    }
}

/// Extract with the default vocabulary. The report URL is left empty.
pub fn extract(html: &str) -> DiagnosticReport {
    DEFAULT_EXTRACTOR.extract(html, "").report
}

/// Extract with an explicit vocabulary. Only an invalid `config` fails.
pub fn extract_with(
    html: &str,
    url: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, ExtractionConfigError> {
    Ok(ReportExtractor::new(config)?.extract(html, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_text_skips_scripts_and_collapses_whitespace() {
        let page = Page::parse(
            "<html><head><style>td{}</style></head><body>\n<h1>Report</h1>\
             <script>var x = 'VIN: nope';</script><p>Make:\n\n  Dacia</p></body></html>",
        );
        assert_eq!(page.text, "Report Make: Dacia");
    }

    #[test]
    fn scalar_fields_are_order_independent() {
        let report = extract(
            "Mileage: 123,456 km SN: 98765ABC Model: Logan MCV VIN: UU1KSDAF123456789 \
             Time: 2024/05/01 10:22:11 Make: Dacia",
        );
        assert_eq!(report.vin.as_deref(), Some("UU1KSDAF123456789"));
        assert_eq!(report.make.as_deref(), Some("Dacia"));
        assert_eq!(report.model.as_deref(), Some("Logan MCV"));
        assert_eq!(report.mileage.as_deref(), Some("123,456 km"));
        assert_eq!(report.time.as_deref(), Some("2024/05/01 10:22:11"));
        assert_eq!(report.serial_number.as_deref(), Some("98765ABC"));
    }

    #[test]
    fn vin_must_be_exactly_seventeen_valid_characters() {
        assert_eq!(extract("VIN: 1HGCM82633A00435").vin, None);
        assert_eq!(extract("VIN: 1HGCM82633A004352X").vin, None);
        assert_eq!(extract("VIN: 1HGCM82633A0O4352").vin, None);
    }

    #[test]
    fn missing_data_yields_empty_report() {
        let report = extract("<html><body><p>Nothing to see</p></body></html>");
        assert_eq!(
            report,
            DiagnosticReport {
                url: String::new(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn rejects_config_without_status_keywords() {
        let config = ExtractionConfig {
            status_keywords: vec!["  ".into()],
            ..Default::default()
        };
        assert!(matches!(
            ReportExtractor::new(&config),
            Err(ExtractionConfigError::NoStatusKeywords)
        ));
    }

    #[test]
    fn rejects_inverted_code_length_range() {
        let config = ExtractionConfig {
            tabular_code_min_len: 6,
            tabular_code_max_len: 4,
            ..Default::default()
        };
        assert!(matches!(
            ReportExtractor::new(&config),
            Err(ExtractionConfigError::InvalidCodeLength { min: 6, max: 4 })
        ));
    }
}
