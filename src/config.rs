use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{NarrativeError, Result};

pub const CONFIG_ENV: &str = "NARRATIVE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "narrative.yaml";

pub const EXAMPLE_CONFIG: &str = "api_key: \"YOUR_KEY\"\n\
api_base: \"http://localhost:5001/v1\"\n\
model: \"qwen3_30b_a3\"\n\
embedding:\n  model: \"all-MiniLM-L6-v2\"\n\
analysis:\n  similarity_threshold: 0.7\n";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Falls back to the chat `api_base` when unset.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embed_batch")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: None,
            model: default_embedding_model(),
            batch_size: default_embed_batch(),
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_anchors")]
    pub anchors_per_platform: usize,
    #[serde(default = "default_max_posts")]
    pub max_posts_per_platform: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_threshold(),
            batch_size: default_batch_size(),
            language: default_language(),
            anchors_per_platform: default_anchors(),
            max_posts_per_platform: default_max_posts(),
        }
    }
}

fn default_max_tokens() -> u32 {
    200
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_embed_batch() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f32 {
    0.7
}

fn default_batch_size() -> usize {
    8
}

fn default_language() -> String {
    "en".to_string()
}

fn default_anchors() -> usize {
    10
}

fn default_max_posts() -> usize {
    crate::classify::DEFAULT_MAX_POSTS_PER_PLATFORM
}

const MAX_RETRIES: u32 = 10;
const MAX_TIMEOUT_SECS: u64 = 3600;

impl Config {
    pub fn from_yaml(s: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(s)
            .map_err(|e| NarrativeError::Config(format!("invalid config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    fn validate(&self) -> Result<()> {
        if self.analysis.batch_size == 0 || self.embedding.batch_size == 0 {
            return Err(NarrativeError::Config("batch sizes must be positive".into()));
        }
        if !self.analysis.similarity_threshold.is_finite() {
            return Err(NarrativeError::Config("similarity_threshold must be finite".into()));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(NarrativeError::Config(format!(
                "max_retries must be at most {}, got {}",
                MAX_RETRIES, self.max_retries
            )));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(NarrativeError::Config(format!(
                "request_timeout_secs must be between 1 and {}, got {}",
                MAX_TIMEOUT_SECS, self.request_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn embedding_api_base(&self) -> &str {
        self.embedding.api_base.as_deref().unwrap_or(&self.api_base)
    }

    pub fn embedding_api_key(&self) -> &str {
        self.embedding.api_key.as_deref().unwrap_or(&self.api_key)
    }
}

/// CLI flag, then `NARRATIVE_CONFIG`, then `./narrative.yaml`.
pub fn resolve_config_path(cli: Option<&str>) -> PathBuf {
    if let Some(p) = cli {
        return PathBuf::from(p);
    }
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(p);
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg =
            Config::from_yaml("api_base: \"http://localhost:5001/v1\"\nmodel: \"m\"\n").unwrap();
        assert_eq!(cfg.max_tokens, 200);
        assert_eq!(cfg.analysis.batch_size, 8);
        assert!((cfg.analysis.similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.embedding_api_base(), "http://localhost:5001/v1");
    }

    #[test]
    fn example_config_parses() {
        let cfg = Config::from_yaml(EXAMPLE_CONFIG).unwrap();
        assert_eq!(cfg.model, "qwen3_30b_a3");
        assert_eq!(cfg.embedding.model, "all-MiniLM-L6-v2");
    }

    #[test]
    fn zero_batch_is_rejected() {
        let err =
            Config::from_yaml("api_base: a\nmodel: m\nanalysis:\n  batch_size: 0\n").unwrap_err();
        assert!(matches!(err, NarrativeError::Config(_)));
    }

    #[test]
    fn retry_and_timeout_bounds_are_enforced() {
        let base = "api_base: a\nmodel: m\n";
        let err = Config::from_yaml(&format!("{base}max_retries: 50\n")).unwrap_err();
        assert!(err.to_string().contains("max_retries"));
        let err = Config::from_yaml(&format!("{base}request_timeout_secs: 0\n")).unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
        let cfg = Config::from_yaml(&format!("{base}max_retries: 10\nrequest_timeout_secs: 3600\n"))
            .unwrap();
        assert_eq!(cfg.max_retries, 10);
        assert_eq!(
            cfg.analysis.max_posts_per_platform,
            crate::classify::DEFAULT_MAX_POSTS_PER_PLATFORM
        );
    }

    #[test]
    fn cli_path_wins() {
        assert_eq!(resolve_config_path(Some("x.yaml")), PathBuf::from("x.yaml"));
    }
}
