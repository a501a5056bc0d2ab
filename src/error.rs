//! Typed failure taxonomy for the ingestion and extraction pipeline.
//!
//! File-level failures during batch ingestion are captured per file and
//! never abort the batch; single-document operations propagate these
//! errors to the caller. OCR problems are deliberately *not* an error
//! variant — a failed OCR pass downgrades to a warning on an otherwise
//! successful parse.

use std::path::PathBuf;
use std::time::Duration;

/// Errors produced by the document pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A source file, document, or project does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// No registered parser claims the file's extension, or the
    /// container is malformed beyond recovery.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A parser failed partway through a file it should handle.
    #[error("failed to parse {path}: {reason}")]
    ParseFailure { path: PathBuf, reason: String },

    /// The LLM call failed on both the fast and the strong tier.
    #[error("generation failed after tier fallback: {0}")]
    GenerationFailure(String),

    /// The LLM response was not valid JSON or lacked the required shape.
    #[error("response violated expected schema: {0}")]
    SchemaViolation(String),

    /// An external format converter exceeded its time bound.
    #[error("external conversion timed out after {0:?}")]
    ConversionTimeout(Duration),

    /// Embedding or vector store call failed.
    #[error("vector index error: {0}")]
    VectorIndex(String),

    /// Database error while reading or writing pipeline records.
    #[error(transparent)]
    Db(#[from] sqlx::Error),

    /// Filesystem error while reading a source file.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Wrap a parser-internal error with the offending path.
    pub fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ParseFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap an I/O error with the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
