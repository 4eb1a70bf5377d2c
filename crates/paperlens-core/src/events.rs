//! Typed progress events for streaming consumers and the emitter that
//! enforces their ordering.
//!
//! A request's `stage`/`chunk` events all precede its `token` events, and
//! exactly one `done` or `error` ends it. The emitter rejects anything that
//! would break that order.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{PaperRecord, SourceType, TextChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadRecords,
    PaperSelected,
    FullTextFetch,
    FullTextReady,
    ChunkingDone,
    FinalSynthesis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageEvent {
    pub name: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper: Option<PaperRecord>,
}

impl StageEvent {
    pub fn new(name: Stage, message: impl Into<String>) -> Self {
        Self {
            name,
            message: message.into(),
            source_type: None,
            source_url: None,
            paper: None,
        }
    }

    pub fn with_source(mut self, source_type: SourceType, source_url: &str) -> Self {
        self.source_type = Some(source_type);
        self.source_url = Some(source_url.to_string());
        self
    }

    pub fn with_paper(mut self, paper: &PaperRecord) -> Self {
        self.paper = Some(paper.clone());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkEvent {
    /// 1-based position in the chunk list.
    pub index: usize,
    pub total: usize,
    pub chunk_id: String,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenEvent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoneEvent {
    pub ok: bool,
    pub arxiv_id: String,
    pub summary_path: String,
    pub saved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Stage(StageEvent),
    Chunk(ChunkEvent),
    Token(TokenEvent),
    Done(DoneEvent),
    Error(ErrorEvent),
}

impl PipelineEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Stage(_) => "stage",
            PipelineEvent::Chunk(_) => "chunk",
            PipelineEvent::Token(_) => "token",
            PipelineEvent::Done(_) => "done",
            PipelineEvent::Error(_) => "error",
        }
    }

    /// JSON payload carried in the SSE `data:` line.
    pub fn data_json(&self) -> String {
        let encoded = match self {
            PipelineEvent::Stage(e) => serde_json::to_string(e),
            PipelineEvent::Chunk(e) => serde_json::to_string(e),
            PipelineEvent::Token(e) => serde_json::to_string(e),
            PipelineEvent::Done(e) => serde_json::to_string(e),
            PipelineEvent::Error(e) => serde_json::to_string(e),
        };
        encoded.unwrap_or_default()
    }

    /// `event: <name>\ndata: <json>\n\n`
    pub fn encode_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name(), self.data_json())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Done(_) | PipelineEvent::Error(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("event consumer disconnected")]
    Disconnected,
    #[error("event emitted after the terminal event")]
    Terminated,
    #[error("progress event emitted after token streaming began")]
    OutOfOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Progress,
    Streaming,
    Terminated,
}

/// Single-producer side of a request's event channel.
///
/// A detached emitter has no consumer; it still enforces ordering so the
/// same pipeline code runs with or without one.
#[derive(Debug)]
pub struct EventEmitter {
    sink: Option<mpsc::Sender<PipelineEvent>>,
    phase: Phase,
}

impl EventEmitter {
    pub fn new(sink: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            sink: Some(sink),
            phase: Phase::Progress,
        }
    }

    pub fn detached() -> Self {
        Self {
            sink: None,
            phase: Phase::Progress,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    pub async fn emit(&mut self, event: PipelineEvent) -> Result<(), EmitError> {
        let next = match (self.phase, &event) {
            (Phase::Terminated, _) => return Err(EmitError::Terminated),
            (Phase::Streaming, PipelineEvent::Stage(_) | PipelineEvent::Chunk(_)) => {
                return Err(EmitError::OutOfOrder);
            }
            (_, PipelineEvent::Done(_) | PipelineEvent::Error(_)) => Phase::Terminated,
            (_, PipelineEvent::Token(_)) => Phase::Streaming,
            (phase, _) => phase,
        };
        self.phase = next;

        if let Some(sink) = &self.sink {
            sink.send(event)
                .await
                .map_err(|_| EmitError::Disconnected)?;
        }
        Ok(())
    }

    pub async fn stage(&mut self, event: StageEvent) -> Result<(), EmitError> {
        tracing::debug!(stage = ?event.name, message = %event.message, "stage");
        self.emit(PipelineEvent::Stage(event)).await
    }

    pub async fn chunk(
        &mut self,
        index: usize,
        total: usize,
        chunk: &TextChunk,
    ) -> Result<(), EmitError> {
        self.emit(PipelineEvent::Chunk(ChunkEvent {
            index,
            total,
            chunk_id: chunk.id.to_string(),
            evidence: chunk.evidence.to_string(),
        }))
        .await
    }

    pub async fn token(&mut self, text: &str) -> Result<(), EmitError> {
        self.emit(PipelineEvent::Token(TokenEvent {
            text: text.to_string(),
        }))
        .await
    }

    pub async fn done(
        &mut self,
        arxiv_id: &str,
        summary_path: &str,
        saved: bool,
    ) -> Result<(), EmitError> {
        self.emit(PipelineEvent::Done(DoneEvent {
            ok: true,
            arxiv_id: arxiv_id.to_string(),
            summary_path: summary_path.to_string(),
            saved,
        }))
        .await
    }

    pub async fn error(&mut self, message: &str) -> Result<(), EmitError> {
        self.emit(PipelineEvent::Error(ErrorEvent {
            ok: false,
            message: message.to_string(),
        }))
        .await
    }
}
