//! arXiv identifier handling.

use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)v\d+$").unwrap());
static UNSAFE_FILENAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9A-Za-z._-]").unwrap());

/// Reduce a raw id or arXiv URL to a bare identifier.
///
/// Drops query strings, fragments and a `.pdf` suffix, keeps whatever follows
/// `/abs/`, `/pdf/` or `/html/`, and trims slashes.
pub fn normalize_arxiv_id(raw: &str) -> String {
    let mut value = raw.trim();
    if value.is_empty() {
        return String::new();
    }
    if let Some(idx) = value.find('?') {
        value = &value[..idx];
    }
    if let Some(idx) = value.find('#') {
        value = &value[..idx];
    }
    if let Some(stripped) = value.strip_suffix(".pdf") {
        value = stripped;
    }
    for marker in ["/abs/", "/pdf/", "/html/"] {
        if let Some((_, rest)) = value.split_once(marker) {
            value = rest;
            break;
        }
    }
    value.trim_matches('/').to_string()
}

/// Normalized id with any trailing version suffix (`v2`, `V10`) removed.
pub fn canonical_arxiv_id(raw: &str) -> String {
    let normalized = normalize_arxiv_id(raw);
    VERSION_SUFFIX.replace(&normalized, "").into_owned()
}

/// True when both ids name the same paper, ignoring versions.
pub fn same_paper(a: &str, b: &str) -> bool {
    canonical_arxiv_id(a) == canonical_arxiv_id(b)
}

pub fn sanitize_for_filename(arxiv_id: &str) -> String {
    UNSAFE_FILENAME_CHARS.replace_all(arxiv_id, "_").into_owned()
}

/// HTML and PDF locations of a paper on the document host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedUrls {
    pub html: String,
    pub pdf: String,
}

pub fn derive_urls(host: &str, arxiv_id: &str) -> DerivedUrls {
    let host = host.trim_end_matches('/');
    DerivedUrls {
        html: format!("https://{host}/html/{arxiv_id}"),
        pdf: format!("https://{host}/pdf/{arxiv_id}.pdf"),
    }
}
