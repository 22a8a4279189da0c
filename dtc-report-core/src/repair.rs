//! Best-effort recovery of a JSON object from chatty model output.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("static regex must compile"));

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("no JSON object found in response")]
    NoObject,

    #[error("response is JSON but not an object")]
    NotAnObject,

    #[error("invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// JSON object recovered from raw text, and whether repair was needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub object: Map<String, Value>,
    pub repaired: bool,
}

/// Parse `raw` as a JSON object, repairing it if a direct parse fails.
///
/// Repair strips code fences, then tries the outermost balanced `{...}`
/// first as-is and then with typographic quotes replaced by ASCII ones.
pub fn recover_object(raw: &str) -> Result<Recovered, RepairError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return match value {
            Value::Object(object) => Ok(Recovered {
                object,
                repaired: false,
            }),
            _ => Err(RepairError::NotAnObject),
        };
    }

    let unfenced = strip_code_fences(raw);
    let mut last_err = RepairError::NoObject;
    for candidate in [Cow::Borrowed(unfenced.as_str()), normalize_quotes(&unfenced)] {
        let Some(slice) = outermost_object(&candidate) else {
            continue;
        };
        match serde_json::from_str::<Value>(slice) {
            Ok(Value::Object(object)) => {
                return Ok(Recovered {
                    object,
                    repaired: true,
                })
            }
            Ok(_) => last_err = RepairError::NotAnObject,
            Err(e) => last_err = RepairError::Invalid(e),
        }
    }
    Err(last_err)
}

pub fn strip_code_fences(raw: &str) -> String {
    FENCE_RE.replace_all(raw, "").trim().to_string()
}

pub fn normalize_quotes(s: &str) -> Cow<'_, str> {
    const DOUBLE: [char; 6] = ['\u{201C}', '\u{201D}', '\u{201E}', '\u{201F}', '\u{2033}', '\u{00AB}'];
    const SINGLE: [char; 5] = ['\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}', '\u{2032}'];
    if !s.chars().any(|c| DOUBLE.contains(&c) || SINGLE.contains(&c) || c == '\u{00BB}') {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.chars()
            .map(|c| {
                if DOUBLE.contains(&c) || c == '\u{00BB}' {
                    '"'
                } else if SINGLE.contains(&c) {
                    '\''
                } else {
                    c
                }
            })
            .collect(),
    )
}

/// Slice from the first `{` to its matching `}`, skipping braces inside
/// string literals. Falls back to the last `}` when the braces never balance.
pub fn outermost_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}
