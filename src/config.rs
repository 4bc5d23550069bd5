use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory where uploaded files are written before ingestion.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploaded_files")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_window_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per chat query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    /// Prefix of the document text sent for analysis. Longer documents are
    /// truncated; late clauses are lost (known limitation).
    #[serde(default = "default_max_analysis_chars")]
    pub max_analysis_chars: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            transcription_model: default_transcription_model(),
            max_analysis_chars: default_max_analysis_chars(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_transcription_model() -> String {
    "whisper-1".to_string()
}
fn default_max_analysis_chars() -> usize {
    15_000
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Upper bound on a single background ingestion run, independent of the
    /// upload request's lifetime.
    #[serde(default = "default_ingest_timeout_secs")]
    pub ingest_timeout_secs: u64,
}

fn default_ingest_timeout_secs() -> u64 {
    600
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.window_chars == 0 {
        anyhow::bail!("chunking.window_chars must be > 0");
    }

    // Equal or larger overlap would make the chunker never advance.
    if config.chunking.overlap_chars >= config.chunking.window_chars {
        anyhow::bail!(
            "chunking.overlap_chars ({}) must be < chunking.window_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.window_chars
        );
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.llm.max_analysis_chars == 0 {
        anyhow::bail!("llm.max_analysis_chars must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [db]
            path = "./data/lexvault.sqlite"
            [server]
            bind = "127.0.0.1:8000"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.window_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.llm.max_analysis_chars, 15_000);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn overlap_equal_to_window_rejected() {
        let err = parse(
            r#"
            [db]
            path = "./data/lexvault.sqlite"
            [server]
            bind = "127.0.0.1:8000"
            [chunking]
            window_chars = 200
            overlap_chars = 200
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let err = parse(
            r#"
            [db]
            path = "./data/lexvault.sqlite"
            [server]
            bind = "127.0.0.1:8000"
            [embedding]
            provider = "openai"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }
}
