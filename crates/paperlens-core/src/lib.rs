use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod batch;
pub mod catalog;
pub mod chunker;
pub mod config;
pub mod config_file;
pub mod events;
pub mod extract;
pub mod fetch;
pub mod gate;
pub mod ids;
pub mod input;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod state;
pub mod store;
pub mod stream;
pub mod text_utils;

#[cfg(test)]
pub(crate) mod mock;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use batch::{BatchOptions, BatchProgress, BatchReport, run_batch};
pub use config::Config;
pub use events::{EmitError, EventEmitter, PipelineEvent, Stage};
pub use extract::ExtractError;
pub use fetch::{FetchError, HttpResponse, HttpTransport, NetworkFetcher, ReqwestTransport};
pub use gate::GateRejection;
pub use llm::{ChatBackend, ChatMessage, ChatRequest, ModelClient, ModelError, OpenAiCompatible};
pub use pipeline::{PaperOutcome, RunOptions, SummarizationPipeline};
pub use store::{OutputStore, StoreError};
pub use stream::{StreamOptions, stream_one};

/// Metadata for one paper, as handed to the pipeline by a loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub arxiv_id: String,
    pub title: String,
    pub html_url: String,
    pub pdf_url: String,
    pub published_date: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

/// Where an extraction result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Html,
    Pdf,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Html => "html",
            SourceType::Pdf => "pdf",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A heading-delimited run of paragraphs from an HTML rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlSection {
    pub heading: String,
    /// Empty when neither the heading nor any ancestor carries an id.
    pub anchor_id: String,
    pub paragraphs: Vec<String>,
}

/// Text of one PDF page. `number` is the 1-based index in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfPage {
    pub number: usize,
    pub text: String,
}

/// Structured body of an extraction, tagged by source format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedBody {
    Html(Vec<HtmlSection>),
    Pdf(Vec<PdfPage>),
}

/// Normalized output of the document extractors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Post-redirect URL the body was read from.
    pub source_url: String,
    pub full_text: String,
    pub body: ExtractedBody,
}

impl ExtractionResult {
    pub fn source_type(&self) -> SourceType {
        match self.body {
            ExtractedBody::Html(_) => SourceType::Html,
            ExtractedBody::Pdf(_) => SourceType::Pdf,
        }
    }

    /// HTML sections, empty for PDF results.
    pub fn sections(&self) -> &[HtmlSection] {
        match &self.body {
            ExtractedBody::Html(sections) => sections,
            ExtractedBody::Pdf(_) => &[],
        }
    }

    /// PDF pages, empty for HTML results.
    pub fn pages(&self) -> &[PdfPage] {
        match &self.body {
            ExtractedBody::Html(_) => &[],
            ExtractedBody::Pdf(pages) => pages,
        }
    }
}

/// Sequential chunk identifier, rendered as `C001`, `C002`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(pub u32);

impl ChunkId {
    pub fn first() -> Self {
        ChunkId(1)
    }

    pub fn next(self) -> Self {
        ChunkId(self.0 + 1)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{:03}", self.0)
    }
}

/// Locates the source span a chunk was cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidencePointer {
    /// 1-based, inclusive paragraph range within a section.
    Section {
        heading: String,
        first_paragraph: usize,
        last_paragraph: usize,
        anchor: Option<String>,
    },
    /// Inclusive source page range.
    Pages { first: usize, last: usize },
    Unsegmented,
}

impl fmt::Display for EvidencePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidencePointer::Section {
                heading,
                first_paragraph,
                last_paragraph,
                anchor,
            } => write!(
                f,
                "({}, paragraphs {}-{}, anchor {})",
                heading,
                first_paragraph,
                last_paragraph,
                anchor.as_deref().unwrap_or("N/A")
            ),
            EvidencePointer::Pages { first, last } => write!(f, "(pages {}-{})", first, last),
            EvidencePointer::Unsegmented => f.write_str("(document body, location not segmented)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub id: ChunkId,
    pub text: String,
    pub evidence: EvidencePointer,
}

/// Structured facts extracted from one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkFacts {
    pub key_points: Vec<String>,
    pub method_details: Vec<String>,
    pub experiment_details: Vec<String>,
    pub resources: Vec<String>,
    pub reasoning_brief: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub chunk_id: ChunkId,
    pub evidence_pointer: String,
    pub facts: ChunkFacts,
    /// True when the model reply could not be parsed and `facts` holds the raw-text fallback.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Outcome of one paper in one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub arxiv_id: String,
    pub summary_path: String,
    pub status: RunStatus,
    pub error: String,
}

impl RunRecord {
    pub fn success(arxiv_id: &str) -> Self {
        Self {
            arxiv_id: arxiv_id.to_string(),
            summary_path: String::new(),
            status: RunStatus::Success,
            error: String::new(),
        }
    }

    pub fn failed(arxiv_id: &str, error: impl Into<String>) -> Self {
        Self {
            arxiv_id: arxiv_id.to_string(),
            summary_path: String::new(),
            status: RunStatus::Failed,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Which model tier drives synthesis, abstract and digest calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    #[default]
    Fast,
    Deep,
}

impl std::str::FromStr for SummaryMode {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(SummaryMode::Fast),
            "deep" => Ok(SummaryMode::Deep),
            other => Err(InputError::UnknownMode(other.to_string())),
        }
    }
}

/// How a paper is summarized in batch and single-paper runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SummaryStrategy {
    #[default]
    AbstractOnly,
    FullText,
    /// Full text first; on `FullTextUnavailable` only, fall back to the abstract.
    FullTextThenAbstract,
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported input format. Use JSON.")]
    UnsupportedFormat,
    #[error("Unsupported JSON structure for paper input.")]
    UnsupportedStructure,
    #[error("arXiv ID not found in input: {0}")]
    UnknownId(String),
    #[error("index out of range: {0}")]
    IndexOutOfRange(usize),
    #[error("provide an arXiv ID or an index")]
    NoSelector,
    #[error("arxiv_id is required")]
    MissingId,
    #[error("unknown summary mode: {0}")]
    UnknownMode(String),
    #[error("Abstract未提供，无法总结。")]
    EmptyAbstract,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("Full text not available; cannot summarize.")]
    FullTextUnavailable {
        /// One reason per source candidate tried, in order.
        attempts: Vec<String>,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    /// True when the consumer went away, so no terminal event can be delivered.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled | PipelineError::Emit(EmitError::Disconnected)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_zero_padded() {
        assert_eq!(ChunkId::first().to_string(), "C001");
        assert_eq!(ChunkId(42).to_string(), "C042");
        assert_eq!(ChunkId(999).next().to_string(), "C1000");
    }

    #[test]
    fn evidence_pointer_formats() {
        let section = EvidencePointer::Section {
            heading: "3 Method".into(),
            first_paragraph: 1,
            last_paragraph: 4,
            anchor: Some("S3".into()),
        };
        assert_eq!(section.to_string(), "(3 Method, paragraphs 1-4, anchor S3)");

        let no_anchor = EvidencePointer::Section {
            heading: "Results".into(),
            first_paragraph: 5,
            last_paragraph: 5,
            anchor: None,
        };
        assert_eq!(
            no_anchor.to_string(),
            "(Results, paragraphs 5-5, anchor N/A)"
        );
        assert_eq!(
            EvidencePointer::Pages { first: 2, last: 7 }.to_string(),
            "(pages 2-7)"
        );
        assert_eq!(
            EvidencePointer::Unsegmented.to_string(),
            "(document body, location not segmented)"
        );
    }

    #[test]
    fn paper_record_serializes_abstract_key() {
        let paper = PaperRecord {
            arxiv_id: "2401.00001".into(),
            abstract_text: "We study X.".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&paper).unwrap();
        assert_eq!(json["abstract"], "We study X.");
        assert!(json.get("abstract_text").is_none());
    }

    #[test]
    fn summary_mode_parses_case_insensitively() {
        assert_eq!("Deep".parse::<SummaryMode>().unwrap(), SummaryMode::Deep);
        assert_eq!(" fast ".parse::<SummaryMode>().unwrap(), SummaryMode::Fast);
        assert!("turbo".parse::<SummaryMode>().is_err());
    }
}
