use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    /// Glob patterns excluded during folder discovery, in addition to
    /// the built-in defaults (VCS metadata, temp files).
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama`, `hashed`, or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
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
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
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
pub struct VectorConfig {
    /// `qdrant` or `memory`.
    #[serde(default = "default_vector_backend")]
    pub backend: String,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: default_qdrant_url(),
            collection: default_collection(),
        }
    }
}

fn default_vector_backend() -> String {
    "qdrant".to_string()
}
fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "bidops_documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_fast_model")]
    pub fast_model: String,
    #[serde(default = "default_strong_model")]
    pub strong_model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            fast_model: default_fast_model(),
            strong_model: default_strong_model(),
            api_key_env: default_api_key_env(),
            url: default_llm_url(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_fast_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_strong_model() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_llm_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
    #[serde(default = "default_rasterize_cmd")]
    pub rasterize_cmd: String,
    /// Tesseract language pack(s), e.g. `eng+ara`.
    #[serde(default = "default_ocr_lang")]
    pub lang: String,
    /// Combined text shorter than this triggers the OCR fallback.
    #[serde(default = "default_min_text_threshold")]
    pub min_text_threshold: usize,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: default_tesseract_cmd(),
            rasterize_cmd: default_rasterize_cmd(),
            lang: default_ocr_lang(),
            min_text_threshold: default_min_text_threshold(),
            timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

fn default_tesseract_cmd() -> String {
    "tesseract".to_string()
}
fn default_rasterize_cmd() -> String {
    "pdftoppm".to_string()
}
fn default_ocr_lang() -> String {
    "eng+ara".to_string()
}
fn default_min_text_threshold() -> usize {
    100
}
fn default_ocr_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConvertConfig {
    /// External DWG → DXF converter binary. Empty disables conversion.
    #[serde(default)]
    pub dwg_converter_path: String,
    #[serde(default = "default_convert_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            dwg_converter_path: String::new(),
            timeout_secs: default_convert_timeout_secs(),
        }
    }
}

fn default_convert_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Confidence cutoff below which a value is flagged for review.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    #[serde(default = "default_max_summary_docs")]
    pub max_summary_docs: usize,
    #[serde(default = "default_summary_char_budget")]
    pub summary_char_budget: usize,
    #[serde(default = "default_max_checklist_docs")]
    pub max_checklist_docs: usize,
    #[serde(default = "default_checklist_char_budget")]
    pub checklist_char_budget: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            review_threshold: default_review_threshold(),
            max_summary_docs: default_max_summary_docs(),
            summary_char_budget: default_summary_char_budget(),
            max_checklist_docs: default_max_checklist_docs(),
            checklist_char_budget: default_checklist_char_budget(),
            min_score: default_min_score(),
        }
    }
}

fn default_review_threshold() -> f64 {
    0.5
}
fn default_max_summary_docs() -> usize {
    10
}
fn default_summary_char_budget() -> usize {
    8000
}
fn default_max_checklist_docs() -> usize {
    8
}
fn default_checklist_char_budget() -> usize {
    6000
}
fn default_min_score() -> f64 {
    0.5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be strictly less than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.embedding.is_enabled() {
        match config.embedding.provider.as_str() {
            "openai" | "ollama" => {
                if config.embedding.model.is_none() {
                    anyhow::bail!(
                        "embedding.model must be specified when provider is '{}'",
                        config.embedding.provider
                    );
                }
                if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                    anyhow::bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        config.embedding.provider
                    );
                }
            }
            "hashed" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be openai, ollama, hashed, or disabled.",
                other
            ),
        }
    }

    match config.vector.backend.as_str() {
        "qdrant" | "memory" => {}
        other => anyhow::bail!("Unknown vector backend: '{}'. Must be qdrant or memory.", other),
    }

    if !(0.0..=1.0).contains(&config.extraction.review_threshold) {
        anyhow::bail!("extraction.review_threshold must be in [0.0, 1.0]");
    }

    if !(0.0..=1.0).contains(&config.extraction.min_score) {
        anyhow::bail!("extraction.min_score must be in [0.0, 1.0]");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let f = write_config("[db]\npath = \"/tmp/bidops.sqlite\"\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.extraction.review_threshold, 0.5);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn overlap_must_be_less_than_chunk_size() {
        let f = write_config(
            "[db]\npath = \"/tmp/bidops.sqlite\"\n\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn enabled_provider_requires_model_and_dims() {
        let f = write_config(
            "[db]\npath = \"/tmp/bidops.sqlite\"\n\n[embedding]\nprovider = \"openai\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn unknown_vector_backend_rejected() {
        let f = write_config(
            "[db]\npath = \"/tmp/bidops.sqlite\"\n\n[vector]\nbackend = \"pinecone\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }
}
