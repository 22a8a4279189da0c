//! DTC extraction strategies, tried in order by [`crate::extract::ReportExtractor`].
//!
//! 1. [`StructuredLinePass`]: `MODULE NAME  HEXCODE  description  STATUS`
//! 2. [`GenericObdPass`]: any `[PBCU]dddd` code with trailing free text
//! 3. [`TabularPass`]: table rows that contain a code-looking cell
//!
//! Each pass is a pure function of the page. The extractor stops at the first
//! pass that returns at least one record.

use regex::Regex;
use scraper::Selector;
use serde::Serialize;

use mockall::{automock, predicate::*};

use crate::extract::{collapse_whitespace, ExtractionConfig, ExtractionConfigError, Page};
use crate::model::{DtcRecord, STATUS_UNSPECIFIED};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StrategyKind {
    StructuredLine,
    GenericObd,
    Tabular,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DtcStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Records in document order; empty when the pass does not apply.
    fn extract(&self, page: &Page) -> Vec<DtcRecord>;
}

/// The three built-in passes in cascade order.
pub fn default_cascade(
    config: &ExtractionConfig,
) -> Result<Vec<Box<dyn DtcStrategy>>, ExtractionConfigError> {
    let vocabulary = StatusVocabulary::from_config(config);
    let cascade: Vec<Box<dyn DtcStrategy>> = vec![
        Box::new(StructuredLinePass::new(vocabulary.clone())?),
        Box::new(GenericObdPass::new(config)?),
        Box::new(TabularPass::new(config, vocabulary)?),
    ];
    Ok(cascade)
}

/// Maps keyword spellings found in a report onto the status we store.
#[derive(Debug, Clone)]
pub struct StatusVocabulary {
    keywords: Vec<String>,
    unspecified: Vec<String>,
}

impl StatusVocabulary {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let clean = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|k| collapse_whitespace(k))
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            keywords: clean(&config.status_keywords),
            unspecified: clean(&config.unspecified_keywords),
        }
    }

    /// Canonical status for `word`, or `None` if it is not a known keyword.
    pub fn classify(&self, word: &str) -> Option<String> {
        let word = collapse_whitespace(word);
        if self.unspecified.iter().any(|k| k.eq_ignore_ascii_case(&word)) {
            return Some(STATUS_UNSPECIFIED.to_string());
        }
        self.keywords
            .iter()
            .find(|k| k.eq_ignore_ascii_case(&word))
            .cloned()
    }

    fn all(&self) -> impl Iterator<Item = &String> {
        self.keywords.iter().chain(self.unspecified.iter())
    }
}

/// Alternation, longest keyword first, tolerant to the spacing inside
/// multi-word keywords.
fn keyword_alternation<'a>(keywords: impl Iterator<Item = &'a String>) -> String {
    let mut keywords: Vec<&String> = keywords.filter(|k| !k.trim().is_empty()).collect();
    keywords.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    keywords.dedup();
    keywords
        .iter()
        .map(|k| {
            k.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s*")
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Each keyword as configured plus its UPPERCASE form. Lowercase prose such
/// as "current" in a description is not a keyword.
fn spelling_variants<'a>(keywords: impl Iterator<Item = &'a String>) -> Vec<String> {
    keywords
        .flat_map(|k| [k.clone(), k.to_uppercase()])
        .collect()
}

const MODULE_TOKEN: &str = r"\p{Lu}[\p{Lu}0-9/_\-]+";

/// Splits the page text into one chunk per `MODULE HEX` run and reads each
/// chunk on its own, so a description never spills into the next record.
pub struct StructuredLinePass {
    start_re: Regex,
    record_re: Regex,
    status_prefix_re: Regex,
    label_re: Regex,
    vocabulary: StatusVocabulary,
}

impl StructuredLinePass {
    pub fn new(vocabulary: StatusVocabulary) -> Result<Self, ExtractionConfigError> {
        let head = format!(
            r"(?P<module>{tok}(?: {tok})*(?: \([^)]*\))?) (?P<code>[0-9A-F]{{3,6}})\b",
            tok = MODULE_TOKEN
        );
        let kw = keyword_alternation(spelling_variants(vocabulary.all()).iter());
        Ok(Self {
            start_re: Regex::new(&format!(r"\b{head}"))?,
            record_re: Regex::new(&format!(
                r"^{head}\s+(?P<desc>.+?)\s+(?P<status>{kw})(?:\s|$)"
            ))?,
            status_prefix_re: Regex::new(&format!(r"^(?:{kw})\s+"))?,
            label_re: Regex::new(r"\s\p{Lu}\p{L}*:(?:\s|$)")?,
            vocabulary,
        })
    }

    /// Byte offsets where records begin. A status keyword that closes the
    /// previous record is not part of the next module name.
    fn record_starts(&self, text: &str) -> Vec<usize> {
        self.start_re
            .find_iter(text)
            .map(|m| {
                let mut start = m.start();
                while let Some(lead) = self.status_prefix_re.find(&text[start..m.end()]) {
                    if !text[start + lead.end()..m.end()].contains(' ') {
                        break;
                    }
                    start += lead.end();
                }
                start
            })
            .collect()
    }

    fn read_chunk(&self, chunk: &str) -> Option<DtcRecord> {
        let chunk = match self.label_re.find(chunk) {
            Some(label) => &chunk[..label.start()],
            None => chunk,
        };
        let caps = self.record_re.captures(chunk)?;
        let status = self
            .vocabulary
            .classify(&caps["status"])
            .unwrap_or_else(|| STATUS_UNSPECIFIED.to_string());
        Some(DtcRecord {
            module: caps["module"].to_string(),
            code: caps["code"].to_string(),
            raw_description: normalize_description(&caps["desc"]),
            status,
        })
    }
}

fn normalize_description(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    collapsed
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(", ")
        .trim()
        .to_string()
}

impl DtcStrategy for StructuredLinePass {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StructuredLine
    }

    fn extract(&self, page: &Page) -> Vec<DtcRecord> {
        let text = page.text.as_str();
        let starts = self.record_starts(text);
        starts
            .iter()
            .enumerate()
            .filter_map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(text.len());
                self.read_chunk(&text[start..end])
            })
            .collect()
    }
}

pub struct GenericObdPass {
    code_re: Regex,
    module_placeholder: String,
}

impl GenericObdPass {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionConfigError> {
        let terminators = keyword_alternation(
            spelling_variants(
                config
                    .status_keywords
                    .iter()
                    .chain(&config.unspecified_keywords)
                    .chain(&config.label_keywords),
            )
            .iter(),
        );
        let code_re = Regex::new(&format!(
            r"\b(?P<code>[PBCU][0-9]{{4}})\b[:\-\s]*(?P<desc>[A-Za-z0-9 ,.'()/\-+]+?)\s*(?:(?:{terminators})\b|$)"
        ))?;
        Ok(Self {
            code_re,
            module_placeholder: config.module_placeholder.clone(),
        })
    }
}

impl DtcStrategy for GenericObdPass {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GenericObd
    }

    fn extract(&self, page: &Page) -> Vec<DtcRecord> {
        self.code_re
            .captures_iter(&page.text)
            .map(|caps| DtcRecord {
                module: self.module_placeholder.clone(),
                code: caps["code"].to_string(),
                raw_description: caps["desc"].trim().to_string(),
                status: STATUS_UNSPECIFIED.to_string(),
            })
            .collect()
    }
}

pub struct TabularPass {
    cell_code_re: Regex,
    vocabulary: StatusVocabulary,
    module_placeholder: String,
}

impl TabularPass {
    pub fn new(
        config: &ExtractionConfig,
        vocabulary: StatusVocabulary,
    ) -> Result<Self, ExtractionConfigError> {
        let cell_code_re = Regex::new(&format!(
            r"^(?:[PBCU][0-9]{{4}}|[0-9A-F]{{{},{}}})$",
            config.tabular_code_min_len, config.tabular_code_max_len
        ))?;
        Ok(Self {
            cell_code_re,
            vocabulary,
            module_placeholder: config.module_placeholder.clone(),
        })
    }

    /// A hex code needs at least one letter, so years and odometer readings
    /// in vehicle-info tables are not codes.
    fn is_code(&self, cell: &str) -> bool {
        self.cell_code_re.is_match(cell) && cell.bytes().any(|b| b.is_ascii_alphabetic())
    }

    fn row_to_record(&self, cells: &[String]) -> Option<DtcRecord> {
        if cells.len() < 2 {
            return None;
        }
        let code_idx = cells.iter().position(|c| self.is_code(c))?;
        let module_idx = (code_idx != 0).then_some(0);
        let module = module_idx
            .map(|i| cells[i].clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.module_placeholder.clone());

        let mut status = None;
        let mut description = Vec::new();
        for (idx, cell) in cells.iter().enumerate() {
            if idx == code_idx || Some(idx) == module_idx || cell.is_empty() {
                continue;
            }
            if status.is_none() {
                if let Some(found) = self.vocabulary.classify(cell) {
                    status = Some(found);
                    continue;
                }
            }
            description.push(cell.as_str());
        }

        Some(DtcRecord {
            module,
            code: cells[code_idx].clone(),
            raw_description: description.join(" "),
            status: status.unwrap_or_else(|| STATUS_UNSPECIFIED.to_string()),
        })
    }
}

impl DtcStrategy for TabularPass {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Tabular
    }

    fn extract(&self, page: &Page) -> Vec<DtcRecord> {
        let (Ok(row_sel), Ok(cell_sel)) = (Selector::parse("table tr"), Selector::parse("td, th"))
        else {
            return Vec::new();
        };
        page.document()
            .select(&row_sel)
            .filter_map(|row| {
                let cells: Vec<String> = row
                    .select(&cell_sel)
                    .map(|cell| collapse_whitespace(&cell.text().collect::<Vec<_>>().join(" ")))
                    .collect();
                self.row_to_record(&cells)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExtractionConfig {
        ExtractionConfig::default()
    }

    fn structured() -> StructuredLinePass {
        StructuredLinePass::new(StatusVocabulary::from_config(&config())).unwrap()
    }

    #[test]
    fn structured_line_captures_module_code_description_and_status() {
        let page = Page::parse("ENGINE CTRL 1A2B Misfire detected Cylinder 2 Permanent");
        let records = structured().extract(&page);
        assert_eq!(
            records,
            vec![DtcRecord {
                module: "ENGINE CTRL".into(),
                code: "1A2B".into(),
                raw_description: "Misfire detected Cylinder 2".into(),
                status: "Permanent".into(),
            }]
        );
    }

    #[test]
    fn structured_line_handles_parenthetical_module_and_several_lines() {
        let page = Page::parse(
            "<table><tr><td>ECM (Engine Control Module)</td><td>0A1F</td>\
             <td>Fuel trim , bank 1 too lean</td><td>MEMORIE</td></tr>\
             <tr><td>ABS</td><td>C1234</td><td>Wheel speed sensor</td><td>Fara status</td></tr></table>",
        );
        let records = structured().extract(&page);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].module, "ECM (Engine Control Module)");
        assert_eq!(records[0].code, "0A1F");
        assert_eq!(records[0].raw_description, "Fuel trim, bank 1 too lean");
        assert_eq!(records[0].status, "Memorie");
        assert_eq!(records[1].module, "ABS");
        assert_eq!(records[1].code, "C1234");
        assert_eq!(records[1].status, STATUS_UNSPECIFIED);
    }

    #[test]
    fn generic_obd_pass_stops_at_labels_and_end_of_text() {
        let pass = GenericObdPass::new(&config()).unwrap();
        let page = Page::parse("P0301: Cylinder 1 Misfire Detected Status: active U0100 Lost communication with ECM");
        let records = pass.extract(&page);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "P0301");
        assert_eq!(records[0].module, "ECU");
        assert_eq!(records[0].raw_description, "Cylinder 1 Misfire Detected");
        assert_eq!(records[1].code, "U0100");
        assert_eq!(records[1].raw_description, "Lost communication with ECM");
        assert!(records.iter().all(|r| r.status == STATUS_UNSPECIFIED));
    }

    #[test]
    fn tabular_pass_reads_qualifying_rows_only() {
        let pass = TabularPass::new(&config(), StatusVocabulary::from_config(&config())).unwrap();
        let page = Page::parse(
            "<table>\
               <tr><th>Module</th><th>Code</th><th>Description</th></tr>\
               <tr><td>Airbag</td><td>B1000</td><td>Driver squib</td><td>open circuit</td><td>History</td></tr>\
               <tr><td>9A0B1</td><td>Unknown fault</td></tr>\
               <tr><td>only one cell</td></tr>\
             </table>",
        );
        let records = pass.extract(&page);
        assert_eq!(
            records,
            vec![
                DtcRecord {
                    module: "Airbag".into(),
                    code: "B1000".into(),
                    raw_description: "Driver squib open circuit".into(),
                    status: "History".into(),
                },
                DtcRecord {
                    module: "ECU".into(),
                    code: "9A0B1".into(),
                    raw_description: "Unknown fault".into(),
                    status: STATUS_UNSPECIFIED.into(),
                },
            ]
        );
    }

    #[test]
    fn tabular_pass_skips_digit_only_vehicle_fields() {
        let pass = TabularPass::new(&config(), StatusVocabulary::from_config(&config())).unwrap();
        let page = Page::parse(
            "<table>\
               <tr><td>Mileage</td><td>120000</td></tr>\
               <tr><td>Year</td><td>2017</td></tr>\
               <tr><td>SN</td><td>98765</td><td>Scanner</td></tr>\
               <tr><td>Engine</td><td>0A1F</td><td>Fuel trim lean</td></tr>\
             </table>",
        );
        let codes: Vec<String> = pass.extract(&page).into_iter().map(|r| r.code).collect();
        assert_eq!(codes, ["0A1F"]);
    }

    #[test]
    fn structured_line_ignores_lowercase_status_words_in_description() {
        let page = Page::parse("ENGINE CTRL 1A2B Injector current too low Memory");
        let records = structured().extract(&page);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].raw_description, "Injector current too low");
        assert_eq!(records[0].status, "Memory");
    }

    #[test]
    fn uppercase_status_does_not_join_the_next_module_name() {
        let page = Page::parse("ENGINE 2B1C Injector circuit HISTORY ABS 5E10 Wheel speed sensor Current");
        let records = structured().extract(&page);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, "History");
        assert_eq!(records[1].module, "ABS");
        assert_eq!(records[1].code, "5E10");
    }

    #[test]
    fn spelling_variants_add_uppercase_forms_only() {
        let keywords = vec!["Memorie".to_string(), "Fara status".to_string()];
        assert_eq!(
            spelling_variants(keywords.iter()),
            ["Memorie", "MEMORIE", "Fara status", "FARA STATUS"]
        );
    }

    #[test]
    fn keyword_alternation_prefers_longest_and_escapes() {
        let keywords = vec!["Memory".to_string(), "Fara  status".to_string(), "a+b".to_string()];
        assert_eq!(keyword_alternation(keywords.iter()), r"Fara\s*status|Memory|a\+b");
    }
}
