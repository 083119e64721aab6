//! Response interpreter: turns raw model text into a structured record.
//!
//! This is the only place malformed model output is absorbed. Anything that
//! does not decode to a JSON object becomes [`Interpretation::Fallback`],
//! which renders as `{"tasks": [], "references": []}`.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

/// Result of interpreting one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// The response decoded to a JSON object.
    Extracted(Map<String, Value>),
    /// The response could not be used; carries why.
    Fallback { reason: String },
}

impl Interpretation {
    /// Interpret raw model text. Never fails.
    pub fn parse(raw: &str) -> Self {
        let body = strip_fences(raw);
        let interpretation = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(record)) => Self::Extracted(record),
            Ok(other) => Self::Fallback {
                reason: format!("expected a JSON object, got {}", kind(&other)),
            },
            Err(e) => Self::Fallback {
                reason: format!("invalid JSON: {e}"),
            },
        };

        if let Self::Fallback { reason } = &interpretation {
            warn!(%reason, raw_chars = raw.chars().count(), "Model output not usable, falling back to empty extraction");
        }
        interpretation
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// Entries of the `tasks` array. Empty if absent or not an array.
    pub fn task_records(&self) -> &[Value] {
        self.array("tasks")
    }

    /// Entries of the `references` array. Empty if absent or not an array.
    pub fn references(&self) -> &[Value] {
        self.array("references")
    }

    /// The record as a JSON object.
    pub fn to_record(&self) -> Value {
        match self {
            Self::Extracted(record) => Value::Object(record.clone()),
            Self::Fallback { .. } => fallback_record(),
        }
    }

    fn array(&self, key: &str) -> &[Value] {
        match self {
            Self::Extracted(record) => record
                .get(key)
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            Self::Fallback { .. } => &[],
        }
    }
}

impl Serialize for Interpretation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

fn fallback_record() -> Value {
    let mut record = Map::new();
    record.insert("tasks".into(), Value::Array(Vec::new()));
    record.insert("references".into(), Value::Array(Vec::new()));
    Value::Object(record)
}

/// Trim, then drop a leading ```` ``` ```` marker with an optional language
/// tag (`json`, `JSON`, ...) and a trailing ```` ``` ```` marker. The tag may
/// end the line or be followed by the body on the same line.
fn strip_fences(raw: &str) -> &str {
    let mut body = raw.trim();

    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.trim_start();
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        let after_tag = &rest[tag_len..];
        // Records start with `{`, never with an alphanumeric.
        body = if after_tag.is_empty() || after_tag.starts_with(char::is_whitespace) {
            after_tag
        } else {
            rest
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }

    body.trim()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
