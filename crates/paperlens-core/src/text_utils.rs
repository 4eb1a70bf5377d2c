use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse every whitespace run to a single space and trim the ends.
pub fn clean_text(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Length in characters, which is what every size threshold in the crate counts.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Short, single-line rendering of a list for log output.
pub fn preview_list(values: &[String], max_items: usize, max_chars: usize) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|v| clean_text(v))
        .filter(|v| !v.is_empty())
        .collect();
    if items.is_empty() {
        return String::new();
    }
    let mut preview = items
        .iter()
        .take(max_items)
        .map(|v| truncate_chars(v, max_chars))
        .collect::<Vec<_>>()
        .join(" | ");
    if items.len() > max_items {
        preview.push_str(" | ...");
    }
    preview
}
