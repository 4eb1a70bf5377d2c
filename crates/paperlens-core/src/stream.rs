//! Single-paper streaming run: full-text pipeline wired to an event
//! emitter, with persistence gated on a completed synthesis.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::events::EventEmitter;
use crate::pipeline::{RunOptions, SummarizationPipeline};
use crate::store::OutputStore;
use crate::{PaperRecord, PipelineError, RunRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
    pub run: RunOptions,
    /// Write the summary file and update the index once synthesis completes.
    pub save: bool,
}

/// Summarize `paper` from full text, streaming progress to `emitter`.
///
/// Ends the stream with exactly one `done` or `error` event unless the
/// consumer went away first. The returned record carries the summary path
/// only when the file was written.
pub async fn stream_one(
    pipeline: &SummarizationPipeline,
    paper: &PaperRecord,
    opts: &StreamOptions,
    store: &OutputStore,
    emitter: &mut EventEmitter,
    cancel: &CancellationToken,
) -> Result<RunRecord, PipelineError> {
    let result = run(pipeline, paper, opts, store, emitter, cancel).await;
    if let Err(e) = &result {
        if e.is_disconnect() {
            tracing::info!(arxiv_id = %paper.arxiv_id, "stream consumer gone, run abandoned");
        } else if !emitter.is_terminated() {
            tracing::warn!(arxiv_id = %paper.arxiv_id, error = %e, "stream failed");
            // Best effort; the consumer may already be gone.
            let _ = emitter.error(&e.to_string()).await;
        }
    }
    result
}

async fn run(
    pipeline: &SummarizationPipeline,
    paper: &PaperRecord,
    opts: &StreamOptions,
    store: &OutputStore,
    emitter: &mut EventEmitter,
    cancel: &CancellationToken,
) -> Result<RunRecord, PipelineError> {
    let summary = pipeline
        .summarize_full_text(paper, &opts.run, emitter, cancel)
        .await?;

    let mut record = RunRecord::success(&paper.arxiv_id);
    let summary_path = if opts.save {
        let path = store.write_summary(paper, &summary.text)?;
        record.summary_path = path.display().to_string();
        store.upsert_index(std::slice::from_ref(&record), Utc::now())?;
        path
    } else {
        store.summary_path(paper)
    };

    emitter
        .done(&paper.arxiv_id, &summary_path.display().to_string(), opts.save)
        .await?;
    tracing::info!(
        arxiv_id = %paper.arxiv_id,
        chunks = summary.chunk_count,
        saved = opts.save,
        "stream complete"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PipelineEvent;
    use crate::mock::{MockChat, MockReply, MockTransport, StubPdf};
    use crate::store::SummaryIndex;
    use crate::{Config, SummaryMode};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    const ID: &str = "2402.00002v2";

    fn paper() -> PaperRecord {
        PaperRecord {
            arxiv_id: ID.into(),
            title: "Streaming".into(),
            html_url: format!("https://arxiv.org/html/{ID}"),
            pdf_url: format!("https://arxiv.org/pdf/{ID}"),
            published_date: "2024-02-03T10:00:00Z".into(),
            abstract_text: "abs".into(),
        }
    }

    fn html() -> String {
        let filler = "with enough words to survive filtering. ".repeat(2);
        let para = |t: &str| format!("<p>{t} {filler}</p>");
        format!(
            "<article><h2 id=\"S2\">2 Approach</h2>{}<h2 id=\"S4\">4 Evaluation</h2>{}</article>",
            para("Approach text"),
            para("Evaluation text")
        )
    }

    fn pipeline(transport: MockTransport, chat: MockChat) -> SummarizationPipeline {
        let config = Config {
            http_max_attempts: 1,
            model_max_attempts: 1,
            min_chars: 100,
            chunk_max_chars: 1000,
            ..Config::default()
        };
        SummarizationPipeline::new(
            Arc::new(config),
            Arc::new(transport),
            Arc::new(StubPdf::pages(&[])),
            Arc::new(chat),
        )
    }

    fn opts(save: bool) -> StreamOptions {
        StreamOptions {
            run: RunOptions {
                mode: SummaryMode::Deep,
                model_override: None,
                min_chars: 100,
                chunk_max_chars: 1000,
            },
            save,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn saves_after_synthesis_and_ends_with_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let transport = MockTransport::new()
            .route(&format!("https://arxiv.org/html/{ID}"), vec![MockReply::ok(&html())]);
        let p = pipeline(transport, MockChat::fixed("## [1] Summary C001"));
        let (tx, rx) = mpsc::channel(64);
        let mut emitter = EventEmitter::new(tx);

        let cancel = CancellationToken::new();
        let record = stream_one(&p, &paper(), &opts(true), &store, &mut emitter, &cancel)
            .await
            .unwrap();
        drop(emitter);
        let events = collect(rx).await;

        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(&names[..3], &["stage", "stage", "stage"]);
        assert_eq!(names.last(), Some(&"done"));
        assert_eq!(names.iter().filter(|n| **n == "done" || **n == "error").count(), 1);

        let PipelineEvent::Done(done) = events.last().unwrap() else {
            panic!("expected done");
        };
        assert!(done.saved);
        assert!(done.summary_path.ends_with("2024-02-03_2402.00002v2.md"));
        assert_eq!(record.summary_path, done.summary_path);
        assert_eq!(std::fs::read_to_string(&done.summary_path).unwrap(), "## [1] Summary C001");

        let index = SummaryIndex::load(&store.index_path());
        assert!(index.items.contains_key("2402.00002v2"));
        assert!(index.items.contains_key("2402.00002"));
    }

    #[tokio::test]
    async fn no_save_reports_path_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let transport = MockTransport::new()
            .route(&format!("https://arxiv.org/html/{ID}"), vec![MockReply::ok(&html())]);
        let p = pipeline(transport, MockChat::fixed("summary"));
        let (tx, rx) = mpsc::channel(64);
        let mut emitter = EventEmitter::new(tx);

        let cancel = CancellationToken::new();
        let record = stream_one(&p, &paper(), &opts(false), &store, &mut emitter, &cancel)
            .await
            .unwrap();
        drop(emitter);
        let events = collect(rx).await;

        let PipelineEvent::Done(done) = events.last().unwrap() else {
            panic!("expected done");
        };
        assert!(!done.saved);
        assert!(done.summary_path.ends_with(".md"));
        assert!(record.summary_path.is_empty());
        assert!(!store.index_path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unavailable_full_text_ends_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let p = pipeline(MockTransport::new(), MockChat::fixed("unused"));
        let (tx, rx) = mpsc::channel(64);
        let mut emitter = EventEmitter::new(tx);

        let cancel = CancellationToken::new();
        let err = stream_one(&p, &paper(), &opts(true), &store, &mut emitter, &cancel)
            .await
            .unwrap_err();
        drop(emitter);
        let events = collect(rx).await;

        assert!(matches!(err, PipelineError::FullTextUnavailable { .. }));
        let PipelineEvent::Error(error) = events.last().unwrap() else {
            panic!("expected error");
        };
        assert!(!error.ok);
        assert_eq!(error.message, "Full text not available; cannot summarize.");
        assert!(!store.index_path().exists());
    }

    #[tokio::test]
    async fn cancellation_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let transport = MockTransport::new()
            .route(&format!("https://arxiv.org/html/{ID}"), vec![MockReply::ok(&html())]);
        let p = pipeline(transport, MockChat::fixed("summary"));
        let (tx, rx) = mpsc::channel(64);
        let mut emitter = EventEmitter::new(tx);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = stream_one(&p, &paper(), &opts(true), &store, &mut emitter, &cancel)
            .await
            .unwrap_err();
        drop(emitter);
        let events = collect(rx).await;

        assert!(err.is_disconnect());
        assert!(events.iter().all(|e| !e.is_terminal()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
