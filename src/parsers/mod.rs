//! Multi-format document parsers and the extension-keyed registry.
//!
//! Each parser declares the extensions it handles and turns raw file
//! bytes into normalized [`ParsedContent`] (text, page list, tables,
//! metadata, warnings). The registry dispatches strictly by lower-cased
//! file extension and is built once at startup — no runtime
//! registration beyond process initialization.
//!
//! Failure semantics: a parser returns [`PipelineError::NotFound`] for
//! a missing file, [`PipelineError::UnsupportedFormat`] for a corrupt
//! container, or a [`PipelineError::ParseFailure`] wrapping the cause.
//! One failing file must never abort a batch — the orchestrator catches
//! per-file errors and records them in the run statistics.

pub mod cad;
pub mod docx;
pub mod email;
pub mod image;
pub mod ocr;
pub(crate) mod ooxml;
pub mod pdf;
pub mod pptx;
pub mod text;
pub mod xer;
pub mod xlsx;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::ParsedContent;

use self::ocr::OcrEngine;

/// A format-specific document parser.
#[async_trait]
pub trait Parser: Send + Sync {
    /// Lower-cased extensions (with leading dot) this parser handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Parse the file into normalized content.
    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError>;

    /// Extract only metadata; cheaper than a full parse where the
    /// format allows it.
    async fn extract_metadata(
        &self,
        path: &Path,
    ) -> Result<BTreeMap<String, serde_json::Value>, PipelineError>;
}

/// Lower-cased extension of a path, with leading dot.
pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
}

/// Registry mapping file extension → parser, assembled at startup.
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn Parser>>,
}

impl ParserRegistry {
    /// Build the registry with every built-in parser, wired to the
    /// given OCR engine and configuration.
    pub fn from_config(config: &Config, ocr: Arc<dyn OcrEngine>) -> Self {
        let mut registry = Self {
            parsers: HashMap::new(),
        };
        registry.register(Arc::new(pdf::PdfParser::new(
            ocr.clone(),
            config.ocr.min_text_threshold,
        )));
        registry.register(Arc::new(docx::DocxParser));
        registry.register(Arc::new(xlsx::XlsxParser));
        registry.register(Arc::new(pptx::PptxParser));
        registry.register(Arc::new(text::TextParser));
        registry.register(Arc::new(image::ImageParser::new(ocr)));
        registry.register(Arc::new(cad::CadParser::new(config.convert.clone())));
        registry.register(Arc::new(xer::XerParser));
        registry.register(Arc::new(email::EmailParser));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn Parser>) {
        for ext in parser.extensions() {
            self.parsers.insert(ext.to_string(), parser.clone());
        }
    }

    /// Find the parser for a path by extension, if any.
    pub fn get(&self, path: &Path) -> Option<Arc<dyn Parser>> {
        let ext = file_extension(path)?;
        self.parsers.get(&ext).cloned()
    }

    /// Pure extension check: can some registered parser handle this path?
    pub fn can_parse(&self, path: &Path) -> bool {
        file_extension(path)
            .map(|ext| self.parsers.contains_key(&ext))
            .unwrap_or(false)
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.parsers.keys().cloned().collect();
        exts.sort();
        exts
    }

    /// Fail with `NotFound` if the path is absent and
    /// `UnsupportedFormat` if no registered parser claims the extension.
    pub fn validate_file(&self, path: &Path) -> Result<(), PipelineError> {
        if !path.exists() {
            return Err(PipelineError::NotFound(path.display().to_string()));
        }
        if !self.can_parse(path) {
            return Err(PipelineError::UnsupportedFormat(format!(
                "{}: no parser registered for this extension",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Shared helper: file size in bytes, with `NotFound` mapping.
pub(crate) fn file_size(path: &Path) -> Result<u64, PipelineError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::NotFound(path.display().to_string()),
            _ => PipelineError::io(path, e),
        })
}

/// Shared helper: fail with `NotFound` when the source file is absent.
pub(crate) fn require_file(path: &Path) -> Result<(), PipelineError> {
    if !path.exists() {
        return Err(PipelineError::NotFound(path.display().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_registry() -> ParserRegistry {
        let config: Config =
            toml::from_str("[db]\npath = \"/tmp/bidops.sqlite\"\n").unwrap();
        ParserRegistry::from_config(&config, Arc::new(ocr::DisabledOcr))
    }

    #[test]
    fn dispatch_is_by_lowercased_extension() {
        let registry = test_registry();
        assert!(registry.can_parse(Path::new("/docs/ITT_Document.PDF")));
        assert!(registry.can_parse(Path::new("/docs/boq.xlsx")));
        assert!(registry.can_parse(Path::new("/docs/drawing.DXF")));
        assert!(!registry.can_parse(Path::new("/docs/archive.rar")));
        assert!(!registry.can_parse(Path::new("/docs/no_extension")));
    }

    #[test]
    fn validate_missing_file_is_not_found() {
        let registry = test_registry();
        let err = registry
            .validate_file(Path::new("/nonexistent/spec.pdf"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn validate_unclaimed_extension_is_unsupported() {
        let registry = test_registry();
        let f = tempfile::NamedTempFile::with_suffix(".zip7").unwrap();
        let err = registry.validate_file(f.path()).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
    }

    #[test]
    fn supported_extensions_cover_core_formats() {
        let registry = test_registry();
        let exts = registry.supported_extensions();
        for ext in [".pdf", ".docx", ".xlsx", ".pptx", ".txt", ".png", ".dxf", ".xer", ".eml"] {
            assert!(exts.iter().any(|e| e == ext), "missing {}", ext);
        }
    }
}
