//! Per-paper orchestration: full-text retrieval with ordered fallback,
//! chunked fact extraction, catalog-constrained synthesis, and the
//! abstract-only fast path.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::backend::PdfBackend;
use crate::catalog::EvidenceCatalog;
use crate::events::{EventEmitter, Stage, StageEvent};
use crate::extract::{extract_html, extract_pdf};
use crate::fetch::{HttpTransport, NetworkFetcher};
use crate::ids::derive_urls;
use crate::llm::{ChatBackend, ModelClient, ModelError};
use crate::state::{PaperProgress, PaperState};
use crate::text_utils::{char_len, clean_text, preview_list, truncate_chars};
use crate::{
    ChunkSummary, Config, ExtractionResult, InputError, PaperRecord, PipelineError, RunRecord,
    SourceType, SummaryMode, SummaryStrategy, TextChunk, chunker, gate, prompts,
};

/// Maximum characters of a summary kept as the digest excerpt.
pub const EXCERPT_MAX_CHARS: usize = 1200;

/// Per-run knobs, seeded from [`Config`] and overridable per request.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub mode: SummaryMode,
    /// Replaces both the fast and the deep model when set.
    pub model_override: Option<String>,
    pub min_chars: usize,
    pub chunk_max_chars: usize,
}

impl RunOptions {
    pub fn from_config(config: &Config, mode: SummaryMode) -> Self {
        Self {
            mode,
            model_override: None,
            min_chars: config.min_chars,
            chunk_max_chars: config.chunk_max_chars,
        }
    }
}

/// Result of summarizing one paper in a batch or single run.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperOutcome {
    pub record: RunRecord,
    pub summary: Option<String>,
    pub summary_excerpt: String,
}

impl PaperOutcome {
    pub fn success(paper: &PaperRecord, summary: String) -> Self {
        Self {
            record: RunRecord::success(&paper.arxiv_id),
            summary_excerpt: truncate_chars(&clean_text(&summary), EXCERPT_MAX_CHARS).to_string(),
            summary: Some(summary),
        }
    }

    pub fn failed(paper: &PaperRecord, error: &PipelineError) -> Self {
        Self {
            record: RunRecord::failed(&paper.arxiv_id, error.to_string()),
            summary: None,
            summary_excerpt: String::new(),
        }
    }
}

/// Full-text synthesis together with the extraction it was grounded on.
#[derive(Debug, Clone)]
pub struct FullTextSummary {
    pub extraction: ExtractionResult,
    pub chunk_count: usize,
    pub text: String,
}

#[derive(Clone)]
pub struct SummarizationPipeline {
    config: Arc<Config>,
    fetcher: NetworkFetcher,
    pdf: Arc<dyn PdfBackend>,
    model: ModelClient,
}

impl SummarizationPipeline {
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn HttpTransport>,
        pdf: Arc<dyn PdfBackend>,
        chat: Arc<dyn ChatBackend>,
    ) -> Self {
        let fetcher = NetworkFetcher::new(transport, config.http_retry());
        let model = ModelClient::new(chat, config.model_retry());
        Self {
            config,
            fetcher,
            pdf,
            model,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Chunk extraction always runs on the fast tier.
    fn chunk_model<'a>(&'a self, opts: &'a RunOptions) -> &'a str {
        opts.model_override
            .as_deref()
            .unwrap_or(&self.config.model_fast)
    }

    /// Synthesis, abstract and digest calls follow the mode.
    fn mode_model<'a>(&'a self, opts: &'a RunOptions) -> &'a str {
        match (&opts.model_override, opts.mode) {
            (Some(model), _) => model,
            (None, SummaryMode::Fast) => &self.config.model_fast,
            (None, SummaryMode::Deep) => &self.config.model_deep,
        }
    }

    fn candidates(primary: &str, derived: String) -> Vec<String> {
        let mut urls = Vec::new();
        if !primary.trim().is_empty() {
            urls.push(primary.trim().to_string());
        }
        if !urls.contains(&derived) {
            urls.push(derived);
        }
        urls
    }

    /// Try HTML candidates, then PDF candidates, returning the first
    /// extraction that passes the gate.
    pub async fn retrieve_full_text(
        &self,
        paper: &PaperRecord,
        min_chars: usize,
        progress: &mut PaperProgress,
    ) -> Result<ExtractionResult, PipelineError> {
        let derived = derive_urls(&self.config.document_host, &paper.arxiv_id);
        let html_candidates = Self::candidates(&paper.html_url, derived.html);
        let pdf_candidates = Self::candidates(&paper.pdf_url, derived.pdf);
        let mut attempts = Vec::new();

        for url in &html_candidates {
            progress.advance(PaperState::Fetching);
            let extracted = match self.fetcher.fetch_text(url).await {
                Ok((html, final_url)) => {
                    extract_html(html, final_url).await.map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            };
            match self.accept(extracted, min_chars, progress) {
                Ok(result) => return Ok(result),
                Err(reason) => {
                    tracing::info!(
                        arxiv_id = %paper.arxiv_id,
                        url = %url,
                        reason = %reason,
                        "HTML candidate failed"
                    );
                    attempts.push(format!("HTML failed ({url}): {reason}"));
                }
            }
        }

        for url in &pdf_candidates {
            progress.advance(PaperState::Fetching);
            let extracted = match self.fetcher.fetch_bytes(url).await {
                Ok((bytes, final_url)) => extract_pdf(self.pdf.clone(), bytes, final_url)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match self.accept(extracted, min_chars, progress) {
                Ok(result) => return Ok(result),
                Err(reason) => {
                    tracing::info!(
                        arxiv_id = %paper.arxiv_id,
                        url = %url,
                        reason = %reason,
                        "PDF candidate failed"
                    );
                    attempts.push(format!("PDF failed ({url}): {reason}"));
                }
            }
        }

        tracing::warn!(
            arxiv_id = %paper.arxiv_id,
            candidates = attempts.len(),
            "full text unavailable"
        );
        Err(PipelineError::FullTextUnavailable { attempts })
    }

    fn accept(
        &self,
        extracted: Result<ExtractionResult, String>,
        min_chars: usize,
        progress: &mut PaperProgress,
    ) -> Result<ExtractionResult, String> {
        let result = extracted?;
        progress.advance(PaperState::Extracted);
        gate::check(&result, min_chars).map_err(|rejection| rejection.to_string())?;
        progress.advance(PaperState::Gated);
        Ok(result)
    }

    /// Extract grounded facts from one chunk. Unparsable replies degrade
    /// to a raw-text summary rather than failing.
    pub async fn summarize_chunk(
        &self,
        paper: &PaperRecord,
        chunk: &TextChunk,
        opts: &RunOptions,
    ) -> Result<ChunkSummary, ModelError> {
        let reply = self
            .model
            .chat(
                self.chunk_model(opts),
                prompts::chunk_messages(paper, chunk),
                self.config.temperature,
            )
            .await?;
        let summary = ChunkSummary::from_reply(chunk, &reply);
        if summary.degraded {
            tracing::warn!(
                arxiv_id = %paper.arxiv_id,
                chunk_id = %chunk.id,
                "chunk reply was not JSON, keeping raw text"
            );
        }
        tracing::debug!(
            arxiv_id = %paper.arxiv_id,
            chunk_id = %chunk.id,
            key_points = %preview_list(&summary.facts.key_points, 2, 120),
            "chunk summarized"
        );
        Ok(summary)
    }

    async fn summarize_chunks(
        &self,
        paper: &PaperRecord,
        chunks: &[TextChunk],
        opts: &RunOptions,
        emitter: &mut EventEmitter,
        cancel: &CancellationToken,
        progress: &mut PaperProgress,
    ) -> Result<Vec<ChunkSummary>, PipelineError> {
        let total = chunks.len();
        let mut summaries = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            progress.advance(PaperState::ChunkSummarizing {
                index: i + 1,
                total,
            });
            emitter.chunk(i + 1, total, chunk).await?;

            let summary = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                summary = self.summarize_chunk(paper, chunk, opts) => summary?,
            };
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Final synthesis over the catalog. Streams tokens to an attached
    /// emitter, otherwise makes a one-shot call.
    async fn synthesize(
        &self,
        paper: &PaperRecord,
        source_type: SourceType,
        summaries: &[ChunkSummary],
        opts: &RunOptions,
        emitter: &mut EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let catalog = EvidenceCatalog::from_summaries(summaries);
        let messages = prompts::synthesis_messages(paper, source_type, &catalog, summaries);
        let model = self.mode_model(opts);
        let temperature = self.config.temperature;

        let text = if emitter.is_attached() {
            let mut stream = self.model.chat_stream(model, messages, temperature).await?;
            let mut text = String::new();
            loop {
                let delta = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    next = stream.next() => next,
                };
                let Some(delta) = delta else { break };
                let delta = delta?;
                emitter.token(&delta).await?;
                text.push_str(&delta);
            }
            text
        } else {
            self.model.chat(model, messages, temperature).await?
        };

        if text.trim().is_empty() {
            return Err(ModelError::EmptyOutput.into());
        }

        let unknown = catalog.unknown_refs(&text);
        if !unknown.is_empty() {
            let ids: Vec<String> = unknown.iter().map(|id| id.to_string()).collect();
            tracing::warn!(
                arxiv_id = %paper.arxiv_id,
                unknown = %ids.join(", "),
                "synthesis cites chunks outside the evidence catalog"
            );
        }
        Ok(text)
    }

    /// Full-text mode: retrieve, gate, chunk, extract per chunk, synthesize.
    ///
    /// Stage and chunk events go to `emitter`; with a detached emitter this
    /// is the plain batch path.
    pub async fn summarize_full_text(
        &self,
        paper: &PaperRecord,
        opts: &RunOptions,
        emitter: &mut EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<FullTextSummary, PipelineError> {
        let mut progress = PaperProgress::new(&paper.arxiv_id);
        let outcome = self
            .full_text_inner(paper, opts, emitter, cancel, &mut progress)
            .await;
        match &outcome {
            Ok(_) => progress.advance(PaperState::Done),
            Err(e) => progress.fail(&e.to_string()),
        }
        outcome
    }

    async fn full_text_inner(
        &self,
        paper: &PaperRecord,
        opts: &RunOptions,
        emitter: &mut EventEmitter,
        cancel: &CancellationToken,
        progress: &mut PaperProgress,
    ) -> Result<FullTextSummary, PipelineError> {
        emitter
            .stage(StageEvent::new(
                Stage::FullTextFetch,
                "Fetching full text (HTML preferred)...",
            ))
            .await?;
        let extraction = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = self.retrieve_full_text(paper, opts.min_chars, progress) => result?,
        };
        let source_type = extraction.source_type();
        tracing::info!(
            arxiv_id = %paper.arxiv_id,
            source_type = %source_type,
            source_url = %extraction.source_url,
            chars = char_len(&extraction.full_text),
            "full text ready"
        );
        emitter
            .stage(
                StageEvent::new(
                    Stage::FullTextReady,
                    format!(
                        "Full text ready via {source_type}, chars={}",
                        char_len(&extraction.full_text)
                    ),
                )
                .with_source(source_type, &extraction.source_url),
            )
            .await?;

        let chunks = chunker::chunk(&extraction, opts.chunk_max_chars);
        progress.advance(PaperState::Chunked);
        tracing::info!(arxiv_id = %paper.arxiv_id, chunks = chunks.len(), "chunked");
        emitter
            .stage(StageEvent::new(
                Stage::ChunkingDone,
                format!("Chunked into {} chunks", chunks.len()),
            ))
            .await?;

        let summaries = self
            .summarize_chunks(paper, &chunks, opts, emitter, cancel, progress)
            .await?;

        progress.advance(PaperState::Synthesizing);
        emitter
            .stage(StageEvent::new(
                Stage::FinalSynthesis,
                "Streaming final synthesis...",
            ))
            .await?;
        let text = self
            .synthesize(paper, source_type, &summaries, opts, emitter, cancel)
            .await?;

        Ok(FullTextSummary {
            extraction,
            chunk_count: chunks.len(),
            text,
        })
    }

    /// Abstract-only mode. A blank abstract fails before any model call.
    pub async fn summarize_abstract(
        &self,
        paper: &PaperRecord,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let mut progress = PaperProgress::new(&paper.arxiv_id);
        let Some(messages) = prompts::abstract_messages(paper) else {
            let err = PipelineError::from(InputError::EmptyAbstract);
            progress.fail(&err.to_string());
            return Err(err);
        };
        progress.advance(PaperState::AbstractReady);
        tracing::info!(
            arxiv_id = %paper.arxiv_id,
            chars = char_len(&clean_text(&paper.abstract_text)),
            mode = ?opts.mode,
            "abstract ready"
        );

        progress.advance(PaperState::Summarizing);
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            reply = self.model.chat(self.mode_model(opts), messages, self.config.temperature) => {
                reply.map_err(PipelineError::from)
            }
        };
        let result = reply.and_then(|text| {
            if text.is_empty() {
                Err(ModelError::EmptyOutput.into())
            } else {
                Ok(text)
            }
        });
        match &result {
            Ok(_) => progress.advance(PaperState::Done),
            Err(e) => progress.fail(&e.to_string()),
        }
        result
    }

    /// Summarize one paper under `strategy`, never failing outward.
    pub async fn summarize_paper(
        &self,
        paper: &PaperRecord,
        strategy: SummaryStrategy,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> PaperOutcome {
        let result = match strategy {
            SummaryStrategy::AbstractOnly => self.summarize_abstract(paper, opts, cancel).await,
            SummaryStrategy::FullText => self.full_text_detached(paper, opts, cancel).await,
            SummaryStrategy::FullTextThenAbstract => {
                match self.full_text_detached(paper, opts, cancel).await {
                    Err(PipelineError::FullTextUnavailable { .. }) => {
                        tracing::info!(arxiv_id = %paper.arxiv_id, "falling back to abstract");
                        self.summarize_abstract(paper, opts, cancel).await
                    }
                    other => other,
                }
            }
        };

        match result {
            Ok(summary) => {
                tracing::debug!(
                    arxiv_id = %paper.arxiv_id,
                    preview = %truncate_chars(&clean_text(&summary), 220),
                    "final summary"
                );
                PaperOutcome::success(paper, summary)
            }
            Err(e) => {
                tracing::warn!(arxiv_id = %paper.arxiv_id, error = %e, "paper failed");
                PaperOutcome::failed(paper, &e)
            }
        }
    }

    async fn full_text_detached(
        &self,
        paper: &PaperRecord,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let mut emitter = EventEmitter::detached();
        self.summarize_full_text(paper, opts, &mut emitter, cancel)
            .await
            .map(|summary| summary.text)
    }

    /// Five-section digest over the successful outcomes; `None` when there
    /// are none.
    pub async fn daily_digest(
        &self,
        outcomes: &[PaperOutcome],
        opts: &RunOptions,
    ) -> Result<Option<String>, ModelError> {
        let Some(messages) = prompts::digest_messages(outcomes) else {
            return Ok(None);
        };
        let sources = outcomes.iter().filter(|o| o.record.is_success()).count();
        tracing::info!(sources, "daily digest start");
        let text = self
            .model
            .chat(self.mode_model(opts), messages, self.config.temperature)
            .await?;
        Ok(Some(text))
    }
}
