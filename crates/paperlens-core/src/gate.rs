//! Heuristic check that an extracted body is the real paper.
//!
//! Length alone does not prove much (a cookie wall can be long), so the body
//! must also show a method-flavored and an experiment-flavored heading.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::ExtractionResult;
use crate::text_utils::char_len;

pub const METHOD_KEYWORDS: &[&str] = &["method", "approach", "model", "architecture", "training"];
pub const EXPERIMENT_KEYWORDS: &[&str] = &["experiment", "evaluation", "results", "ablation"];

static METHOD_HEADING: Lazy<Regex> = Lazy::new(|| heading_pattern(METHOD_KEYWORDS));
static EXPERIMENT_HEADING: Lazy<Regex> = Lazy::new(|| heading_pattern(EXPERIMENT_KEYWORDS));

/// Line-anchored heading shape: optional `1.2 ` numbering, optional short
/// capitalized phrase, then a keyword on a word boundary. Case-insensitive.
fn heading_pattern(keywords: &[&str]) -> Regex {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?im)^\s*(?:\d+(?:\.\d+)*\s+)?(?:[A-Z][A-Za-z0-9\-,: ]{{0,80}})?\b({alternation})\b"
    ))
    .unwrap()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    #[error("body too short ({chars} <= {min_chars} chars)")]
    TooShort { chars: usize, min_chars: usize },
    #[error("no method or approach section found")]
    MissingMethod,
    #[error("no experiment or evaluation section found")]
    MissingExperiment,
}

/// Accept `result` as sufficient full text, or say why not.
///
/// Section headings are checked first (substring match); the full text is
/// scanned with the heading pattern only for a category the headings missed.
pub fn check(result: &ExtractionResult, min_chars: usize) -> Result<(), GateRejection> {
    let chars = char_len(&result.full_text);
    if chars <= min_chars {
        return Err(GateRejection::TooShort { chars, min_chars });
    }

    let headings: Vec<String> = result
        .sections()
        .iter()
        .map(|s| s.heading.to_lowercase())
        .collect();
    let heading_hit = |keywords: &[&str]| {
        headings
            .iter()
            .any(|h| keywords.iter().any(|k| h.contains(k)))
    };

    let method_ok =
        heading_hit(METHOD_KEYWORDS) || METHOD_HEADING.is_match(&result.full_text);
    if !method_ok {
        return Err(GateRejection::MissingMethod);
    }
    let experiment_ok =
        heading_hit(EXPERIMENT_KEYWORDS) || EXPERIMENT_HEADING.is_match(&result.full_text);
    if !experiment_ok {
        return Err(GateRejection::MissingExperiment);
    }
    Ok(())
}
