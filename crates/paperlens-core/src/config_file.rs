use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub llm: Option<LlmConfig>,
    pub fulltext: Option<FulltextConfig>,
    pub network: Option<NetworkConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model_fast: Option<String>,
    pub model_deep: Option<String>,
    pub temperature: Option<f32>,
    pub max_attempts: Option<u32>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulltextConfig {
    pub min_chars: Option<usize>,
    pub chunk_max_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub document_host: Option<String>,
    pub user_agent: Option<String>,
    pub http_retries: Option<u32>,
    pub http_backoff: Option<f64>,
    pub http_timeout_secs: Option<u64>,
}

/// Platform config directory path: `<config_dir>/paperlens/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("paperlens").join("config.toml"))
}

/// Load config by cascading CWD `.paperlens.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".paperlens.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file");
            None
        }
    }
}

fn pick<S, T: Clone>(
    overlay: &Option<S>,
    base: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        llm: Some(LlmConfig {
            base_url: pick(&overlay.llm, &base.llm, |l| l.base_url.clone()),
            api_key: pick(&overlay.llm, &base.llm, |l| l.api_key.clone()),
            model_fast: pick(&overlay.llm, &base.llm, |l| l.model_fast.clone()),
            model_deep: pick(&overlay.llm, &base.llm, |l| l.model_deep.clone()),
            temperature: pick(&overlay.llm, &base.llm, |l| l.temperature),
            max_attempts: pick(&overlay.llm, &base.llm, |l| l.max_attempts),
            timeout_secs: pick(&overlay.llm, &base.llm, |l| l.timeout_secs),
        }),
        fulltext: Some(FulltextConfig {
            min_chars: pick(&overlay.fulltext, &base.fulltext, |f| f.min_chars),
            chunk_max_chars: pick(&overlay.fulltext, &base.fulltext, |f| f.chunk_max_chars),
        }),
        network: Some(NetworkConfig {
            document_host: pick(&overlay.network, &base.network, |n| n.document_host.clone()),
            user_agent: pick(&overlay.network, &base.network, |n| n.user_agent.clone()),
            http_retries: pick(&overlay.network, &base.network, |n| n.http_retries),
            http_backoff: pick(&overlay.network, &base.network, |n| n.http_backoff),
            http_timeout_secs: pick(&overlay.network, &base.network, |n| n.http_timeout_secs),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_deserializes() {
        let toml_str = r#"
[llm]
model_deep = "qwen3-max"

[fulltext]
min_chars = 20000
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.llm.as_ref().unwrap().model_deep.as_deref(),
            Some("qwen3-max")
        );
        assert!(config.llm.as_ref().unwrap().api_key.is_none());
        assert_eq!(config.fulltext.unwrap().min_chars, Some(20000));
        assert!(config.network.is_none());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            llm: Some(LlmConfig {
                model_fast: Some("base-fast".into()),
                model_deep: Some("base-deep".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            llm: Some(LlmConfig {
                model_deep: Some("cwd-deep".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let llm = merged.llm.unwrap();
        assert_eq!(llm.model_deep.as_deref(), Some("cwd-deep"));
        assert_eq!(llm.model_fast.as_deref(), Some("base-fast"));
    }

    #[test]
    fn merge_base_preserved_when_overlay_section_absent() {
        let base = ConfigFile {
            network: Some(NetworkConfig {
                http_retries: Some(6),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.network.unwrap().http_retries, Some(6));
    }

    #[test]
    fn load_from_path_handles_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("absent.toml")).is_none());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[llm\nmodel_fast = ").unwrap();
        assert!(load_from_path(&bad).is_none());

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[network]\nhttp_backoff = 2.5\n").unwrap();
        let loaded = load_from_path(&good).unwrap();
        assert_eq!(loaded.network.unwrap().http_backoff, Some(2.5));
    }
}
