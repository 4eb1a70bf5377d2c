use std::time::Duration;

use crate::config_file::ConfigFile;
use crate::retry::{Backoff, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL_FAST: &str = "qwen-plus-latest";
pub const DEFAULT_MODEL_DEEP: &str = "qwen3.5-397b-a17b";
pub const DEFAULT_MIN_CHARS: usize = 30_000;
pub const DEFAULT_CHUNK_MAX_CHARS: usize = 12_000;

/// Runtime configuration, built once by a binary and shared by reference.
///
/// Nothing in the library reads the process environment; binaries layer
/// config file, environment and flags onto [`Config::default`].
#[derive(Clone)]
pub struct Config {
    /// OpenAI-compatible endpoint root, without `/chat/completions`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Used for chunk extraction always, and for synthesis in fast mode.
    pub model_fast: String,
    pub model_deep: String,
    pub temperature: f32,
    pub model_max_attempts: u32,
    pub model_backoff_step_ms: u64,
    pub model_timeout_secs: u64,
    /// Host used to derive `/html/<id>` and `/pdf/<id>.pdf` candidates.
    pub document_host: String,
    pub user_agent: String,
    pub http_max_attempts: u32,
    pub http_backoff_base: f64,
    pub http_timeout_secs: u64,
    /// Gate threshold: bodies with at most this many characters are rejected.
    pub min_chars: usize,
    pub chunk_max_chars: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model_fast", &self.model_fast)
            .field("model_deep", &self.model_deep)
            .field("temperature", &self.temperature)
            .field("model_max_attempts", &self.model_max_attempts)
            .field("model_backoff_step_ms", &self.model_backoff_step_ms)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("document_host", &self.document_host)
            .field("user_agent", &self.user_agent)
            .field("http_max_attempts", &self.http_max_attempts)
            .field("http_backoff_base", &self.http_backoff_base)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("min_chars", &self.min_chars)
            .field("chunk_max_chars", &self.chunk_max_chars)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model_fast: DEFAULT_MODEL_FAST.to_string(),
            model_deep: DEFAULT_MODEL_DEEP.to_string(),
            temperature: 0.1,
            model_max_attempts: 4,
            model_backoff_step_ms: 1800,
            model_timeout_secs: 120,
            document_host: "arxiv.org".to_string(),
            user_agent: concat!("paperlens/", env!("CARGO_PKG_VERSION"), " (+https://arxiv.org)")
                .to_string(),
            http_max_attempts: 4,
            http_backoff_base: 1.8,
            http_timeout_secs: 45,
            min_chars: DEFAULT_MIN_CHARS,
            chunk_max_chars: DEFAULT_CHUNK_MAX_CHARS,
        }
    }
}

impl Config {
    /// Overlay values from a parsed config file. Unset fields are left alone.
    pub fn apply_file(&mut self, file: &ConfigFile) {
        if let Some(llm) = &file.llm {
            if let Some(v) = &llm.base_url {
                self.base_url = v.clone();
            }
            if let Some(v) = &llm.api_key {
                self.api_key = Some(v.clone());
            }
            if let Some(v) = &llm.model_fast {
                self.model_fast = v.clone();
            }
            if let Some(v) = &llm.model_deep {
                self.model_deep = v.clone();
            }
            if let Some(v) = llm.temperature {
                self.temperature = v;
            }
            if let Some(v) = llm.max_attempts {
                self.model_max_attempts = v;
            }
            if let Some(v) = llm.timeout_secs {
                self.model_timeout_secs = v;
            }
        }
        if let Some(fulltext) = &file.fulltext {
            if let Some(v) = fulltext.min_chars {
                self.min_chars = v;
            }
            if let Some(v) = fulltext.chunk_max_chars {
                self.chunk_max_chars = v;
            }
        }
        if let Some(network) = &file.network {
            if let Some(v) = &network.document_host {
                self.document_host = v.clone();
            }
            if let Some(v) = &network.user_agent {
                self.user_agent = v.clone();
            }
            if let Some(v) = network.http_retries {
                self.http_max_attempts = v;
            }
            if let Some(v) = network.http_backoff {
                self.http_backoff_base = v;
            }
            if let Some(v) = network.http_timeout_secs {
                self.http_timeout_secs = v;
            }
        }
    }

    /// Overlay values from environment-style variables resolved by `lookup`.
    ///
    /// For each setting the first non-empty variable in its alias list wins.
    /// Unparseable numbers are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names.iter().find_map(|name| {
                lookup(name)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
        };

        if let Some(v) = first(&["LLM_BASE_URL", "OPENAI_BASE_URL"]) {
            self.base_url = v;
        }
        if let Some(v) = first(&["LLM_API_KEY", "DASHSCOPE_API_KEY", "OPENAI_API_KEY"]) {
            self.api_key = Some(v);
        }
        if let Some(v) = first(&["LLM_MODEL_FAST", "OPENAI_MODEL_FAST"]) {
            self.model_fast = v;
        }
        if let Some(v) = first(&["LLM_MODEL_DEEP", "OPENAI_MODEL_DEEP"]) {
            self.model_deep = v;
        }
        if let Some(v) =
            first(&["FULLTEXT_MIN_CHARS"]).and_then(|v| parse_var("FULLTEXT_MIN_CHARS", &v))
        {
            self.min_chars = v;
        }
        if let Some(v) = first(&["FULLTEXT_CHUNK_MAX_CHARS"])
            .and_then(|v| parse_var("FULLTEXT_CHUNK_MAX_CHARS", &v))
        {
            self.chunk_max_chars = v;
        }
        if let Some(v) =
            first(&["FULLTEXT_HTTP_RETRIES"]).and_then(|v| parse_var("FULLTEXT_HTTP_RETRIES", &v))
        {
            self.http_max_attempts = v;
        }
        if let Some(v) =
            first(&["FULLTEXT_HTTP_BACKOFF"]).and_then(|v| parse_var("FULLTEXT_HTTP_BACKOFF", &v))
        {
            self.http_backoff_base = v;
        }
    }

    /// Retry policy for document fetches: exponential in the attempt index.
    pub fn http_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.http_max_attempts,
            Backoff::Exponential {
                base: self.http_backoff_base,
            },
        )
    }

    /// Retry policy for model calls: linear in the attempt index.
    pub fn model_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.model_max_attempts,
            Backoff::Linear {
                step: Duration::from_millis(self.model_backoff_step_ms),
            },
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value, "ignoring unparseable setting");
            None
        }
    }
}
