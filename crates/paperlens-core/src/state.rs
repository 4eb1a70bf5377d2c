//! Per-paper progress state machine.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperState {
    Pending,
    Fetching,
    Extracted,
    Gated,
    Chunked,
    /// `index` is 1-based.
    ChunkSummarizing { index: usize, total: usize },
    Synthesizing,
    AbstractReady,
    Summarizing,
    Done,
    Failed,
}

impl PaperState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaperState::Done | PaperState::Failed)
    }

    /// Whether `next` may follow `self`.
    ///
    /// A rejected candidate sends `Fetching`/`Extracted` back to `Fetching`
    /// for the next source. `Failed` is reachable from any live state.
    pub fn can_transition_to(&self, next: PaperState) -> bool {
        use PaperState::*;
        if self.is_terminal() {
            return false;
        }
        match (*self, next) {
            (_, Failed) => true,
            (Pending, Fetching) | (Pending, AbstractReady) => true,
            (Fetching, Fetching) | (Fetching, Extracted) => true,
            (Extracted, Fetching) | (Extracted, Gated) => true,
            (Gated, Chunked) => true,
            (Chunked, ChunkSummarizing { index: 1, .. }) => true,
            (ChunkSummarizing { index, total }, ChunkSummarizing { index: i, total: t }) => {
                t == total && i == index + 1 && i <= t
            }
            (ChunkSummarizing { index, total }, Synthesizing) => index == total,
            (Synthesizing, Done) => true,
            (AbstractReady, Summarizing) => true,
            (Summarizing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PaperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperState::Pending => f.write_str("pending"),
            PaperState::Fetching => f.write_str("fetching"),
            PaperState::Extracted => f.write_str("extracted"),
            PaperState::Gated => f.write_str("gated"),
            PaperState::Chunked => f.write_str("chunked"),
            PaperState::ChunkSummarizing { index, total } => {
                write!(f, "chunk_summarizing({index}/{total})")
            }
            PaperState::Synthesizing => f.write_str("synthesizing"),
            PaperState::AbstractReady => f.write_str("abstract_ready"),
            PaperState::Summarizing => f.write_str("summarizing"),
            PaperState::Done => f.write_str("done"),
            PaperState::Failed => f.write_str("failed"),
        }
    }
}

/// Tracks one paper through the pipeline and logs each transition.
#[derive(Debug, Clone)]
pub struct PaperProgress {
    arxiv_id: String,
    state: PaperState,
}

impl PaperProgress {
    pub fn new(arxiv_id: &str) -> Self {
        Self {
            arxiv_id: arxiv_id.to_string(),
            state: PaperState::Pending,
        }
    }

    pub fn state(&self) -> PaperState {
        self.state
    }

    /// Move to `next`. An illegal transition is logged and still applied;
    /// it indicates a pipeline bug, not a paper failure.
    pub fn advance(&mut self, next: PaperState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                arxiv_id = %self.arxiv_id,
                from = %self.state,
                to = %next,
                "unexpected state transition"
            );
        }
        tracing::debug!(arxiv_id = %self.arxiv_id, from = %self.state, to = %next, "state");
        self.state = next;
    }

    pub fn fail(&mut self, reason: &str) {
        tracing::warn!(arxiv_id = %self.arxiv_id, from = %self.state, reason, "paper failed");
        self.state = PaperState::Failed;
    }
}
