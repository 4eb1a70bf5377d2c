//! Sequential multi-paper runs with per-paper isolation.

use std::path::PathBuf;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{PaperOutcome, RunOptions, SummarizationPipeline};
use crate::store::{OutputStore, StoreError};
use crate::text_utils::{clean_text, truncate_chars};
use crate::{PaperRecord, RunRecord, SummaryStrategy};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub strategy: SummaryStrategy,
    pub run: RunOptions,
    /// Write summaries, the index and the run records.
    pub save: bool,
    /// Synthesize a daily digest over the successes (requires `save`).
    pub daily_report: bool,
    /// Tag used in the run-records file name, e.g. `summarize_new`.
    pub command: String,
}

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchProgress {
    /// `index` is 1-based.
    Started {
        index: usize,
        total: usize,
        arxiv_id: String,
    },
    Finished {
        index: usize,
        total: usize,
        record: RunRecord,
    },
    DigestWritten {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PaperOutcome>,
    pub digest_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    pub records_path: Option<PathBuf>,
}

impl BatchReport {
    pub fn records(&self) -> Vec<RunRecord> {
        self.outcomes.iter().map(|o| o.record.clone()).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.record.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// 0 when anything succeeded or nothing failed, 2 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() > 0 || self.failed() == 0 {
            0
        } else {
            2
        }
    }
}

/// Summarize `papers` one at a time.
///
/// A paper's failure is recorded in its outcome and never stops the batch.
/// Only writing the index or the run records can fail the whole run.
pub async fn run_batch(
    pipeline: &SummarizationPipeline,
    papers: &[PaperRecord],
    opts: &BatchOptions,
    store: &OutputStore,
    progress: impl Fn(BatchProgress) + Send + Sync,
    cancel: &CancellationToken,
) -> Result<BatchReport, StoreError> {
    let total = papers.len();
    tracing::info!(
        mode = ?opts.run.mode,
        strategy = ?opts.strategy,
        selected = total,
        "batch start"
    );

    let mut report = BatchReport::default();
    for (i, paper) in papers.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::warn!(remaining = total - i, "batch cancelled");
            break;
        }
        progress(BatchProgress::Started {
            index: i + 1,
            total,
            arxiv_id: paper.arxiv_id.clone(),
        });

        let mut outcome = pipeline
            .summarize_paper(paper, opts.strategy, &opts.run, cancel)
            .await;
        if opts.save {
            persist_summary(store, paper, &mut outcome);
        }

        progress(BatchProgress::Finished {
            index: i + 1,
            total,
            record: outcome.record.clone(),
        });
        report.outcomes.push(outcome);
    }

    if opts.save && opts.daily_report {
        report.digest_path = write_digest(pipeline, store, &report.outcomes, &opts.run).await;
        if let Some(path) = &report.digest_path {
            progress(BatchProgress::DigestWritten { path: path.clone() });
        }
    }

    if opts.save {
        let now = Utc::now();
        let records = report.records();
        report.index_path = Some(store.upsert_index(&records, now)?);
        report.records_path = Some(store.write_records(&opts.command, &records, now)?);
    }

    tracing::info!(
        success = report.succeeded(),
        failed = report.failed(),
        "batch done"
    );
    Ok(report)
}

/// A write failure turns the paper into a failure; the batch carries on.
fn persist_summary(store: &OutputStore, paper: &PaperRecord, outcome: &mut PaperOutcome) {
    let Some(summary) = &outcome.summary else {
        return;
    };
    match store.write_summary(paper, summary) {
        Ok(path) => outcome.record.summary_path = path.display().to_string(),
        Err(e) => {
            tracing::warn!(arxiv_id = %paper.arxiv_id, error = %e, "could not write summary");
            outcome.record = RunRecord::failed(&paper.arxiv_id, e.to_string());
        }
    }
}

async fn write_digest(
    pipeline: &SummarizationPipeline,
    store: &OutputStore,
    outcomes: &[PaperOutcome],
    run: &RunOptions,
) -> Option<PathBuf> {
    let markdown = match pipeline.daily_digest(outcomes, run).await {
        Ok(Some(markdown)) => markdown,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, "daily digest failed");
            return None;
        }
    };
    tracing::debug!(preview = %truncate_chars(&clean_text(&markdown), 220), "daily digest");
    match store.write_digest(&markdown, Utc::now().date_naive()) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(error = %e, "could not write daily digest");
            None
        }
    }
}
