//! Uniform text extraction from process-exec responses.
//!
//! The process endpoint answers either with a JSON object describing the
//! finished process (combined output under `logs`) or with a bare text body.
//! Diagnostics want the trimmed text; content checks want it untouched.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Structured process response. Only the fields the harness reads; a field
/// of an unexpected type reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    #[serde(default, deserialize_with = "lenient_string")]
    pub logs: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub exit_code: Option<i32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    Ok(Value::deserialize(d)?
        .as_i64()
        .and_then(|c| i32::try_from(c).ok()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutput {
    Structured(ProcessResponse),
    Text(String),
}

impl ExecOutput {
    /// Classify a raw response body. Never fails: anything that is not a
    /// JSON object is kept as text.
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value @ Value::Object(_)) => {
                ExecOutput::Structured(serde_json::from_value(value).unwrap_or_default())
            }
            Ok(Value::String(s)) => ExecOutput::Text(s),
            _ => ExecOutput::Text(body.to_string()),
        }
    }

    /// Combined output exactly as returned. A structured response without
    /// `logs` yields an empty string.
    pub fn raw(&self) -> &str {
        match self {
            ExecOutput::Structured(resp) => resp.logs.as_deref().unwrap_or(""),
            ExecOutput::Text(s) => s,
        }
    }

    /// Trimmed combined output.
    pub fn text(&self) -> String {
        self.raw().trim().to_string()
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecOutput::Structured(resp) => resp.exit_code,
            ExecOutput::Text(_) => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            ExecOutput::Structured(resp) => resp.status.as_deref(),
            ExecOutput::Text(_) => None,
        }
    }
}
