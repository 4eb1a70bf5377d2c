//! Output directory layout: summaries, run records, daily digests and the
//! summary index.
//!
//! Writes are plain read-modify-write on the local filesystem; concurrent
//! processes sharing a directory are not coordinated.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ids::{canonical_arxiv_id, normalize_arxiv_id, sanitize_for_filename};
use crate::input::parse_published;
use crate::{PaperRecord, RunRecord};

pub const INDEX_FILE: &str = "summary_index.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One index entry, shared by the raw and canonical id keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub arxiv_id: String,
    pub summary_file: String,
    pub summary_path: String,
    pub updated_at: String,
}

/// On-disk `summary_index.json`. Unknown top-level keys survive a rewrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryIndex {
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub items: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SummaryIndex {
    /// Read the index at `path`; a missing or unreadable file starts empty.
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "summary index unreadable, starting fresh"
                );
                Self::default()
            }
        }
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Writes artifacts under one output directory, creating it on demand.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// `{YYYY-MM-DD}_{sanitized id}.md`, dated by publication or `today`.
    pub fn summary_filename(paper: &PaperRecord, today: NaiveDate) -> String {
        let date = parse_published(&paper.published_date)
            .map(|dt| dt.date_naive())
            .unwrap_or(today);
        format!(
            "{}_{}.md",
            date.format("%Y-%m-%d"),
            sanitize_for_filename(&paper.arxiv_id)
        )
    }

    pub fn summary_path(&self, paper: &PaperRecord) -> PathBuf {
        self.dir
            .join(Self::summary_filename(paper, Utc::now().date_naive()))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, contents).map_err(io_err)
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        self.write(path, &body)
    }

    pub fn write_summary(
        &self,
        paper: &PaperRecord,
        markdown: &str,
    ) -> Result<PathBuf, StoreError> {
        let path = self.summary_path(paper);
        self.write(&path, markdown.as_bytes())?;
        tracing::info!(arxiv_id = %paper.arxiv_id, path = %path.display(), "summary written");
        Ok(path)
    }

    /// `{YYYYMMDDTHHMMSSZ}_{command}_records.json`
    pub fn write_records(
        &self,
        command: &str,
        records: &[RunRecord],
        now: DateTime<Utc>,
    ) -> Result<PathBuf, StoreError> {
        let path = self
            .dir
            .join(format!("{}_{command}_records.json", now.format("%Y%m%dT%H%M%SZ")));
        self.write_json(&path, records)?;
        tracing::info!(path = %path.display(), records = records.len(), "run records written");
        Ok(path)
    }

    /// `{YYYY-MM-DD}_daily_report.md`
    pub fn write_digest(&self, markdown: &str, today: NaiveDate) -> Result<PathBuf, StoreError> {
        let path = self
            .dir
            .join(format!("{}_daily_report.md", today.format("%Y-%m-%d")));
        self.write(&path, markdown.as_bytes())?;
        tracing::info!(path = %path.display(), "daily digest written");
        Ok(path)
    }

    /// Path recorded in the index: the site-relative `outputs/summaries/{file}`
    /// when this store writes there, else the bare file name.
    fn index_paths(&self, summary_path: &str) -> (String, String) {
        let file = Path::new(summary_path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| summary_path.to_string());
        let tail: Vec<&str> = self
            .dir
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        if tail.ends_with(&["outputs", "summaries"]) {
            (file.clone(), format!("outputs/summaries/{file}"))
        } else {
            (file.clone(), file)
        }
    }

    /// Merge successful records into the summary index and write it back.
    ///
    /// Each record is keyed by its normalized id and, when different, its
    /// canonical id. Existing entries for other ids are kept.
    pub fn upsert_index(
        &self,
        records: &[RunRecord],
        now: DateTime<Utc>,
    ) -> Result<PathBuf, StoreError> {
        let path = self.index_path();
        let mut index = SummaryIndex::load(&path);
        let ts = rfc3339(now);

        let mut updated = 0;
        for record in records.iter().filter(|r| r.is_success()) {
            let arxiv_id = normalize_arxiv_id(&record.arxiv_id);
            let summary_path = record.summary_path.trim();
            if arxiv_id.is_empty() || summary_path.is_empty() {
                continue;
            }
            let (summary_file, web_path) = self.index_paths(summary_path);
            let entry = IndexEntry {
                arxiv_id: arxiv_id.clone(),
                summary_file,
                summary_path: web_path,
                updated_at: ts.clone(),
            };
            let value = serde_json::to_value(&entry).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?;

            let canonical = canonical_arxiv_id(&arxiv_id);
            if !canonical.is_empty() && canonical != arxiv_id {
                index.items.insert(canonical, value.clone());
            }
            index.items.insert(arxiv_id, value);
            updated += 1;
        }

        index.updated_at = ts;
        self.write_json(&path, &index)?;
        tracing::info!(
            path = %path.display(),
            updated,
            total = index.items.len(),
            "summary index updated"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, h, 6, 7).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn success(id: &str, path: &str) -> RunRecord {
        RunRecord {
            summary_path: path.into(),
            ..RunRecord::success(id)
        }
    }

    #[test]
    fn summary_filename_dating() {
        let dated = PaperRecord {
            arxiv_id: "cs/0101001v2".into(),
            published_date: "2024-01-31T23:00:00Z".into(),
            ..Default::default()
        };
        assert_eq!(
            OutputStore::summary_filename(&dated, today()),
            "2024-01-31_cs_0101001v2.md"
        );
        let undated = PaperRecord {
            arxiv_id: "2401.00001".into(),
            ..Default::default()
        };
        assert_eq!(
            OutputStore::summary_filename(&undated, today()),
            "2024-03-05_2401.00001.md"
        );
    }

    #[test]
    fn records_and_digest_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("nested"));
        let records = vec![RunRecord::failed("2401.00001", "boom")];

        let path = store.write_records("summarize_new", &records, at(1)).unwrap();
        assert_eq!(
            path.file_name().unwrap(),
            "20240305T010607Z_summarize_new_records.json"
        );
        let saved: Vec<RunRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, records);

        let digest = store.write_digest("# Daily", today()).unwrap();
        assert_eq!(digest.file_name().unwrap(), "2024-03-05_daily_report.md");
    }

    #[test]
    fn rerun_overwrites_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());

        store
            .upsert_index(&[success("2401.99999", "/tmp/a/2024-01-01_2401.99999.md")], at(1))
            .unwrap();
        store
            .upsert_index(&[success("2401.99999", "/tmp/b/2024-01-02_2401.99999.md")], at(2))
            .unwrap();

        let index = SummaryIndex::load(&store.index_path());
        assert_eq!(index.items.len(), 1);
        let entry: IndexEntry = serde_json::from_value(index.items["2401.99999"].clone()).unwrap();
        assert_eq!(entry.summary_file, "2024-01-02_2401.99999.md");
        assert_eq!(entry.updated_at, "2024-03-05T02:06:07Z");
        assert_eq!(index.updated_at, "2024-03-05T02:06:07Z");
    }

    #[test]
    fn versioned_ids_also_keyed_canonically() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs").join("summaries"));

        store
            .upsert_index(
                &[
                    success("2401.00001v2", "x/2024-01-01_2401.00001v2.md"),
                    RunRecord::failed("2401.00002", "nope"),
                    success("2401.00003", ""),
                ],
                at(1),
            )
            .unwrap();

        let index = SummaryIndex::load(&store.index_path());
        let keys: Vec<&str> = index.items.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["2401.00001", "2401.00001v2"]);
        assert_eq!(index.items["2401.00001"], index.items["2401.00001v2"]);
        assert_eq!(
            index.items["2401.00001"]["summary_path"],
            "outputs/summaries/2024-01-01_2401.00001v2.md"
        );
    }

    #[test]
    fn unrelated_entries_and_keys_survive() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        std::fs::write(
            store.index_path(),
            r#"{"updated_at": "old", "site": "mine", "items": {"other": {"arxiv_id": "other"}}}"#,
        )
        .unwrap();

        store
            .upsert_index(&[success("2401.00001", "f.md")], at(1))
            .unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.index_path()).unwrap()).unwrap();
        assert_eq!(raw["site"], "mine");
        assert_eq!(raw["items"]["other"]["arxiv_id"], "other");
        assert_eq!(raw["items"]["2401.00001"]["summary_path"], "f.md");
    }

    #[test]
    fn corrupt_index_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        std::fs::write(store.index_path(), "{not json").unwrap();

        store
            .upsert_index(&[success("2401.00001", "f.md")], at(1))
            .unwrap();
        let index = SummaryIndex::load(&store.index_path());
        assert_eq!(index.items.len(), 1);
    }
}
