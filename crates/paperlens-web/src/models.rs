use std::path::PathBuf;

use axum::response::sse::Event;
use paperlens_core::config::{DEFAULT_BASE_URL, DEFAULT_CHUNK_MAX_CHARS, DEFAULT_MIN_CHARS};
use paperlens_core::{Config, PipelineEvent};
use serde::{Deserialize, Serialize};

pub const RECOMMENDED_MODELS: [&str; 5] = [
    "qwen3.5-397b-a17b",
    "qwen3-max",
    "qwen3-max-2026-01-23",
    "qwen-plus-latest",
    "qwen-plus-2025-12-01",
];

// ── Request ─────────────────────────────────────────────────────────────

/// Body of `POST /api/summarize-one/stream`. Missing fields take defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizeRequest {
    pub arxiv_id: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub mode: String,
    /// Replaces both model tiers when non-blank.
    pub model: String,
    /// Overrides the configured endpoint when non-blank.
    pub base_url: String,
    pub min_chars: usize,
    pub chunk_max_chars: usize,
    pub save: bool,
}

impl Default for SummarizeRequest {
    fn default() -> Self {
        Self {
            arxiv_id: String::new(),
            input_path: PathBuf::from("data/latest_cs_daily.json"),
            output_dir: PathBuf::from("outputs/summaries"),
            mode: "deep".into(),
            model: String::new(),
            base_url: String::new(),
            min_chars: DEFAULT_MIN_CHARS,
            chunk_max_chars: DEFAULT_CHUNK_MAX_CHARS,
            save: true,
        }
    }
}

impl SummarizeRequest {
    /// Server config with this request's endpoint and size overrides applied.
    pub fn resolve(&self, base: &Config) -> Config {
        let mut config = base.clone();
        if !self.base_url.trim().is_empty() {
            config.base_url = self.base_url.trim().to_string();
        }
        config.min_chars = self.min_chars;
        config.chunk_max_chars = self.chunk_max_chars;
        config
    }

    pub fn model_override(&self) -> Option<String> {
        let model = self.model.trim();
        (!model.is_empty()).then(|| model.to_string())
    }
}

// ── Responses ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub base_url_default: &'static str,
    pub recommended_models: Vec<&'static str>,
}

impl Default for ModelsResponse {
    fn default() -> Self {
        Self {
            base_url_default: DEFAULT_BASE_URL,
            recommended_models: RECOMMENDED_MODELS.to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BadRequest {
    pub ok: bool,
    pub error: String,
}

/// Wire form of a pipeline event.
pub fn sse_event(event: &PipelineEvent) -> Event {
    Event::default().event(event.name()).data(event.data_json())
}
