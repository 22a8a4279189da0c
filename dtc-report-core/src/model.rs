//! Data model shared by every pipeline stage.
//!
//! [`DiagnosticReport`] is what the extractor pulls out of a scan-tool page.
//! [`AnalysisResult`] is what the reasoning service hands back; it serializes
//! with the service's wire keys (`vehicul`, `pas_1_erori_initiale`, ...) while
//! the Rust fields keep English names. All analysis fields are lenient on
//! input: missing keys default, `null` becomes empty, numbers become strings.

use serde::{Deserialize, Serialize};

/// Status used when the report does not say anything usable about a DTC.
pub const STATUS_UNSPECIFIED: &str = "Unspecified";

/// Structured content of one vendor report page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub url: String,
    pub vin: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub mileage: Option<String>,
    pub time: Option<String>,
    pub serial_number: Option<String>,
    /// Document order.
    pub dtcs: Vec<DtcRecord>,
}

/// A single fault code as it appeared in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtcRecord {
    pub module: String,
    pub code: String,
    pub raw_description: String,
    pub status: String,
}

/// Vehicle header of an analysis. Only `scan_date` is guaranteed to be filled
/// once the analyzer has finished with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub model: Option<String>,
    #[serde(rename = "an", default, deserialize_with = "lenient::opt_string")]
    pub year: Option<String>,
    #[serde(rename = "motorizare", default, deserialize_with = "lenient::opt_string")]
    pub engine: Option<String>,
    #[serde(rename = "kilometraj", default, deserialize_with = "lenient::opt_string")]
    pub mileage: Option<String>,
    #[serde(rename = "data_scanarii", default, deserialize_with = "lenient::string")]
    pub scan_date: String,
}

/// One explained fault code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialError {
    #[serde(rename = "cod", default, deserialize_with = "lenient::string")]
    pub code: String,
    #[serde(rename = "descriere", default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(rename = "cauza_posibila", default, deserialize_with = "lenient::string")]
    pub possible_cause: String,
    #[serde(rename = "recomandare", default, deserialize_with = "lenient::string")]
    pub recommendation: String,
}

/// One entry of the "what to do now" list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    #[serde(default, deserialize_with = "lenient::string")]
    pub nr: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub text: String,
}

impl TodoItem {
    pub fn new(nr: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            nr: nr.into(),
            text: text.into(),
        }
    }
}

/// Strict-shape analysis of a [`DiagnosticReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "vehicul", default, deserialize_with = "lenient::or_default")]
    pub vehicle: VehicleInfo,
    #[serde(
        rename = "pas_1_erori_initiale",
        default,
        deserialize_with = "lenient::or_default"
    )]
    pub initial_errors: Vec<InitialError>,
    #[serde(rename = "concluzie", default, deserialize_with = "lenient::string")]
    pub conclusion: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub todo: Vec<TodoItem>,
}

/// How an [`AnalysisResult`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Provenance {
    /// The service answered with valid JSON straight away.
    Parsed,
    /// The answer only parsed after fence/quote/brace repair.
    Repaired,
    /// No attempt produced a usable answer; synthesized from the raw DTCs.
    Fallback,
}

/// Analysis plus the bookkeeping the orchestrator logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub provenance: Provenance,
    pub attempts: u32,
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn value_to_string(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(value_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
    }

    /// Blank strings count as missing so report metadata can fill them in.
    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(value_to_string(Value::deserialize(deserializer)?).filter(|s| !s.trim().is_empty()))
    }

    /// `null` deserializes to the default value instead of failing.
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }
}
