//! TemplateRenderer: fills the report template.
//!
//! Two mechanisms, both plain string work:
//!
//! - [`ScalarMap`] replaces `{{token}}` placeholders in a single pass, so a
//!   substituted value is never expanded again. Values are HTML-escaped on
//!   insertion. Unknown tokens are left alone.
//! - [`LoopBlock`] finds `<tbody id="...">`, takes the row template between
//!   the `BEGIN:<TOKEN>` / `END:<TOKEN>` comments and repeats it once per
//!   record.
//!
//! A missing container or sentinel leaves that part of the template as it
//! was. The module also holds the post-processing applied to the rendered
//! artifact (asset URLs, stylesheet inlining, script removal, file name).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, NoExpand, Regex};
use tracing::debug;

use crate::model::{AnalysisResult, DiagnosticReport, InitialError, TodoItem};

pub const ERRORS_CONTAINER_ID: &str = "rows_pas1";
pub const ERRORS_ROW_TOKEN: &str = "ROW_TEMPLATE_PAS1";
pub const TODO_CONTAINER_ID: &str = "rows_todo";
pub const TODO_ROW_TOKEN: &str = "ROW_TEMPLATE_TODO";
pub const LAST_ROW_MARKER: &str = "<!--__LASTROW__-->";

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("static regex must compile")
});
static LAST_ROW_CLEANUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!--__LASTROW__-->\s*(?:<tr[^>]*class=["'][^"']*\brow-sep\b[^"']*["'][^>]*>[\s\S]*?</tr>)?"#)
        .expect("static regex must compile")
});
static SEPARATOR_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<tr[^>]*class=["'][^"']*\brow-sep\b"#).expect("static regex must compile")
});
static ASSET_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(src|href)=(["'])(?:\./)?assets/"#).expect("static regex must compile")
});
static STYLESHEET_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<link[^>]+href=["'][^"']*assets/css/style\.css["'][^>]*>"#)
        .expect("static regex must compile")
});
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>").expect("static regex must compile")
});

/// Token → value table for `{{token}}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalarMap(BTreeMap<String, String>);

impl ScalarMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` renders as an empty string.
    pub fn set(&mut self, token: &str, value: Option<&str>) -> &mut Self {
        self.0
            .insert(token.to_string(), value.unwrap_or_default().to_string());
        self
    }

    pub fn with(mut self, token: &str, value: &str) -> Self {
        self.set(token, Some(value));
        self
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.0.get(token).map(String::as_str)
    }

    pub fn apply(&self, text: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures| match self.0.get(&caps[1]) {
                Some(value) => escape_html(value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Vendor and model text is data, never markup.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// A repeated row region and the records to render into it.
#[derive(Debug, Clone)]
pub struct LoopBlock<'a> {
    pub container_id: &'a str,
    pub token: &'a str,
    pub rows: Vec<ScalarMap>,
}

impl LoopBlock<'_> {
    /// Replace the container's content with one rendered row per record.
    /// The last row is tagged with [`LAST_ROW_MARKER`] for [`cleanup`].
    pub fn render(&self, html: &str) -> String {
        let Some(region) = self.locate(html) else {
            debug!(
                container = self.container_id,
                token = self.token,
                "[RENDER] Loop container or sentinels not found; left unchanged"
            );
            return html.to_string();
        };

        let row_template = &html[region.row_start..region.row_end];
        let last = self.rows.len().saturating_sub(1);
        let rendered: Vec<String> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let row_html = row.apply(row_template);
                if i == last {
                    mark_last_row(&row_html)
                } else {
                    row_html
                }
            })
            .collect();

        let mut out = String::with_capacity(html.len());
        out.push_str(&html[..region.inner_start]);
        out.push_str(&rendered.join("\n"));
        out.push_str(&html[region.inner_end..]);
        out
    }

    fn locate(&self, html: &str) -> Option<LoopRegion> {
        let open_re = Regex::new(&format!(
            r#"<tbody\b[^>]*\bid=["']{}["'][^>]*>"#,
            regex::escape(self.container_id)
        ))
        .ok()?;
        let open = open_re.find(html)?;
        let inner_start = open.end();
        let inner_end = inner_start + html[inner_start..].find("</tbody>")?;
        let inner = &html[inner_start..inner_end];

        let begin = inner.find(&format!("BEGIN:{}", self.token))?;
        let row_start = begin + inner[begin..].find("-->")? + "-->".len();
        let end = row_start + inner[row_start..].find(&format!("END:{}", self.token))?;
        let row_end = inner[row_start..end].rfind("<!--").map_or(end, |i| row_start + i);

        Some(LoopRegion {
            inner_start,
            inner_end,
            row_start: inner_start + row_start,
            row_end: inner_start + row_end,
        })
    }
}

struct LoopRegion {
    inner_start: usize,
    inner_end: usize,
    row_start: usize,
    row_end: usize,
}

/// Put the last-row marker in front of the row's separator, or after the row
/// when it has none.
fn mark_last_row(row_html: &str) -> String {
    match SEPARATOR_ROW_RE.find(row_html) {
        Some(sep) => format!(
            "{}{}{}",
            &row_html[..sep.start()],
            LAST_ROW_MARKER,
            &row_html[sep.start()..]
        ),
        None => format!("{row_html}{LAST_ROW_MARKER}"),
    }
}

/// Drop the separator after the last row and any stray marker.
pub fn cleanup(html: &str) -> String {
    let html = LAST_ROW_CLEANUP_RE.replace_all(html, "");
    html.replace(LAST_ROW_MARKER, "")
}

/// Header and conclusion placeholders.
pub fn scalar_map(report: &DiagnosticReport, analysis: &AnalysisResult) -> ScalarMap {
    let vehicle = &analysis.vehicle;
    let mut map = ScalarMap::new();
    map.set("vin", report.vin.as_deref())
        .set("vehicul.brand", vehicle.brand.as_deref())
        .set("vehicul.model", vehicle.model.as_deref())
        .set("vehicul.an", vehicle.year.as_deref())
        .set("vehicul.motorizare", vehicle.engine.as_deref())
        .set("vehicul.kilometraj", vehicle.mileage.as_deref())
        .set("vehicul.data_scanarii", Some(&vehicle.scan_date))
        .set("concluzie", Some(&analysis.conclusion));
    map
}

fn error_row(e: &InitialError) -> ScalarMap {
    ScalarMap::new()
        .with("cod", &e.code)
        .with("descriere", &e.description)
        .with("cauza_posibila", &e.possible_cause)
        .with("recomandare", &e.recommendation)
}

fn todo_row(t: &TodoItem) -> ScalarMap {
    ScalarMap::new().with("nr", &t.nr).with("text", &t.text)
}

/// Fill `template` with the report header, the explained errors and the
/// todo list.
pub fn render(template: &str, report: &DiagnosticReport, analysis: &AnalysisResult) -> String {
    let html = scalar_map(report, analysis).apply(template);
    let html = LoopBlock {
        container_id: ERRORS_CONTAINER_ID,
        token: ERRORS_ROW_TOKEN,
        rows: analysis.initial_errors.iter().map(error_row).collect(),
    }
    .render(&html);
    let html = LoopBlock {
        container_id: TODO_CONTAINER_ID,
        token: TODO_ROW_TOKEN,
        rows: analysis.todo.iter().map(todo_row).collect(),
    }
    .render(&html);
    cleanup(&html)
}

/// Point relative `assets/` references at `base`. An empty base is a no-op.
pub fn absolutize_assets(html: &str, base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return html.to_string();
    }
    ASSET_ATTR_RE
        .replace_all(html, |caps: &Captures| {
            format!("{}={}{}/assets/", &caps[1], &caps[2], base)
        })
        .into_owned()
}

/// Swap the `assets/css/style.css` link for an inline `<style>` block.
pub fn inline_stylesheet(html: &str, css: &str) -> String {
    STYLESHEET_LINK_RE
        .replacen(html, 1, NoExpand(&format!("<style>{css}</style>")))
        .into_owned()
}

/// Remove every `<script>` element; mail clients ignore them anyway.
pub fn strip_scripts(html: &str) -> String {
    SCRIPT_RE.replace_all(html, "").into_owned()
}

/// `Raport_<VIN>.html`, or `Raport_FARA_VIN.html` without a VIN.
pub fn output_file_name(vin: Option<&str>) -> String {
    let stem: String = match vin.map(str::trim).filter(|v| !v.is_empty()) {
        Some(vin) => vin
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
        None => "FARA_VIN".to_string(),
    };
    format!("Raport_{stem}.html")
}
