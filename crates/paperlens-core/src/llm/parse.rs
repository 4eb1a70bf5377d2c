//! Best-effort recovery of a JSON object from free-form model output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::text_utils::{clean_text, truncate_chars};
use crate::{ChunkFacts, ChunkSummary, TextChunk};

pub const FALLBACK_MAX_CHARS: usize = 2000;

static LEADING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json)?").unwrap());
static TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub fields: Map<String, Value>,
    /// The reply did not contain a JSON object; `fields` holds the raw-text fallback.
    pub degraded: bool,
}

/// Parse a model reply as a JSON object. Never fails.
///
/// A leading code fence is stripped, then the text between the first `{` and
/// the last `}` is parsed. Anything that is not an object yields a fallback
/// whose `key_points` holds the cleaned, truncated text.
pub fn parse_json_response(text: &str) -> ParsedReply {
    let candidate = strip_fences(text.trim());
    let sliced = match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if end > start => &candidate[start..=end],
        _ => candidate.as_str(),
    };

    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(sliced) {
        return ParsedReply {
            fields,
            degraded: false,
        };
    }

    let key_points = if sliced.is_empty() {
        Vec::new()
    } else {
        vec![Value::String(
            truncate_chars(&clean_text(sliced), FALLBACK_MAX_CHARS).to_string(),
        )]
    };
    let mut fields = Map::new();
    fields.insert("key_points".into(), Value::Array(key_points));
    for key in ["method_details", "experiment_details", "resources", "reasoning_brief"] {
        fields.insert(key.into(), Value::Array(Vec::new()));
    }
    ParsedReply {
        fields,
        degraded: true,
    }
}

fn strip_fences(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }
    let inner = LEADING_FENCE.replace(text, "");
    TRAILING_FENCE.replace(inner.trim(), "").trim().to_string()
}

/// Coerce one structured field into a list of strings.
///
/// Strings become single-item lists (blank ones empty); non-string list items
/// are rendered as compact JSON; null items and missing keys are skipped.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
        Some(other) => vec![other.to_string()],
    }
}

impl ChunkFacts {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            key_points: string_list(fields.get("key_points")),
            method_details: string_list(fields.get("method_details")),
            experiment_details: string_list(fields.get("experiment_details")),
            resources: string_list(fields.get("resources")),
            reasoning_brief: string_list(fields.get("reasoning_brief")),
        }
    }
}

impl ChunkSummary {
    /// Build the summary of `chunk` from a raw model reply.
    pub fn from_reply(chunk: &TextChunk, reply: &str) -> Self {
        let parsed = parse_json_response(reply);
        Self {
            chunk_id: chunk.id,
            evidence_pointer: chunk.evidence.to_string(),
            facts: ChunkFacts::from_fields(&parsed.fields),
            degraded: parsed.degraded,
        }
    }
}
