//! Loading and selecting paper records from a JSON listing.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::ids::{canonical_arxiv_id, derive_urls, normalize_arxiv_id};
use crate::{InputError, PaperRecord};

/// Read records from a `.json` file.
///
/// Accepts a bare list, `{"papers": [...]}` and `{"fields": [{"papers": [...]}]}`
/// (both keys may be present). Rows without an id are dropped, as are
/// duplicate ids after the first.
pub fn load_records(path: &Path, document_host: &str) -> Result<Vec<PaperRecord>, InputError> {
    if !path.exists() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        return Err(InputError::UnsupportedFormat);
    }

    let raw = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let payload: Value = serde_json::from_str(&raw).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let rows = collect_rows(&payload)?;
    let mut seen = HashSet::new();
    let records: Vec<PaperRecord> = rows
        .into_iter()
        .filter_map(|row| normalize_record(row, document_host))
        .filter(|record| seen.insert(record.arxiv_id.clone()))
        .collect();

    tracing::info!(path = %path.display(), records = records.len(), "loaded paper records");
    Ok(records)
}

fn objects(list: &Value) -> Vec<&Value> {
    list.as_array()
        .map(|items| items.iter().filter(|r| r.is_object()).collect())
        .unwrap_or_default()
}

fn collect_rows(payload: &Value) -> Result<Vec<&Value>, InputError> {
    match payload {
        Value::Array(_) => Ok(objects(payload)),
        Value::Object(map) => {
            let mut rows = map.get("papers").map(objects).unwrap_or_default();
            if let Some(Value::Array(fields)) = map.get("fields") {
                for field in fields {
                    if let Some(papers) = field.get("papers") {
                        rows.extend(objects(papers));
                    }
                }
            }
            Ok(rows)
        }
        _ => Err(InputError::UnsupportedStructure),
    }
}

/// First value that renders to non-blank text.
fn coalesce(values: &[Option<&Value>]) -> String {
    values
        .iter()
        .flatten()
        .filter_map(|value| match value {
            Value::Null => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        })
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Map one JSON row onto a [`PaperRecord`], deriving missing URLs.
pub fn normalize_record(row: &Value, document_host: &str) -> Option<PaperRecord> {
    let arxiv_id = normalize_arxiv_id(&coalesce(&[row.get("arxiv_id"), row.get("id")]));
    if arxiv_id.is_empty() {
        return None;
    }
    let derived = derive_urls(document_host, &arxiv_id);
    let or_derived = |value: String, fallback: String| {
        if value.is_empty() { fallback } else { value }
    };

    let title = coalesce(&[row.get("title")]);
    Some(PaperRecord {
        title: if title.is_empty() {
            "Untitled".to_string()
        } else {
            title
        },
        html_url: or_derived(coalesce(&[row.get("html_url")]), derived.html),
        pdf_url: or_derived(coalesce(&[row.get("pdf_url")]), derived.pdf),
        published_date: coalesce(&[row.get("published_date"), row.get("published")]),
        abstract_text: coalesce(&[row.get("summary"), row.get("abstract")]),
        arxiv_id,
    })
}

/// Parse an RFC 3339 timestamp, a naive ISO datetime (taken as UTC) or a bare date.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Newest first; records with unparseable dates keep their order at the end.
pub fn sort_newest(mut records: Vec<PaperRecord>) -> Vec<PaperRecord> {
    records.sort_by_cached_key(|r| std::cmp::Reverse(parse_published(&r.published_date)));
    records
}

/// Calendar day of `published_date` in UTC+8.
fn day_key(record: &PaperRecord) -> Option<NaiveDate> {
    parse_published(&record.published_date).map(|dt| (dt + Duration::hours(8)).date_naive())
}

/// All records published on the newest UTC+8 calendar day present.
pub fn latest_day(records: &[PaperRecord]) -> Vec<PaperRecord> {
    let Some(latest) = records.iter().filter_map(day_key).max() else {
        return Vec::new();
    };
    records
        .iter()
        .filter(|r| day_key(r) == Some(latest))
        .cloned()
        .collect()
}

/// Select one record by arXiv id (version-insensitive) or by position.
pub fn pick_one(
    records: &[PaperRecord],
    arxiv_id: Option<&str>,
    index: Option<usize>,
) -> Result<PaperRecord, InputError> {
    if let Some(raw) = arxiv_id.filter(|id| !id.trim().is_empty()) {
        let target = canonical_arxiv_id(raw);
        return records
            .iter()
            .find(|r| canonical_arxiv_id(&r.arxiv_id) == target)
            .cloned()
            .ok_or(InputError::UnknownId(target));
    }
    let index = index.ok_or(InputError::NoSelector)?;
    records
        .get(index)
        .cloned()
        .ok_or(InputError::IndexOutOfRange(index))
}

/// Like [`pick_one`] by id, but an unknown id yields a minimal record with
/// derived URLs and no abstract instead of an error.
pub fn pick_or_synthesize(
    records: &[PaperRecord],
    arxiv_id: &str,
    document_host: &str,
) -> Result<PaperRecord, InputError> {
    let target = normalize_arxiv_id(arxiv_id);
    if target.is_empty() {
        return Err(InputError::MissingId);
    }
    let canonical = canonical_arxiv_id(&target);
    if let Some(found) = records
        .iter()
        .find(|r| canonical_arxiv_id(&r.arxiv_id) == canonical)
    {
        return Ok(found.clone());
    }

    tracing::debug!(arxiv_id = %target, "id not in input, synthesizing record");
    let derived = derive_urls(document_host, &target);
    Ok(PaperRecord {
        title: format!("arXiv {target}"),
        html_url: derived.html,
        pdf_url: derived.pdf,
        arxiv_id: target,
        ..Default::default()
    })
}
