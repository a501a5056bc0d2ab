//! PDF parser with OCR fallback for scanned documents.
//!
//! Per-page text is preserved as an ordered list aligned with
//! `[Page N]` markers in the combined text so downstream chunking can
//! attribute page numbers. When total extracted text falls below the
//! minimum-content threshold the parser rasterizes and OCRs the pages,
//! substituting the OCR text and recording a warning; OCR failure
//! downgrades to a warning rather than failing the parse.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::ParsedContent;

use super::ocr::OcrEngine;
use super::{file_size, require_file, Parser};

pub struct PdfParser {
    ocr: Arc<dyn OcrEngine>,
    min_text_threshold: usize,
}

impl PdfParser {
    pub fn new(ocr: Arc<dyn OcrEngine>, min_text_threshold: usize) -> Self {
        Self {
            ocr,
            min_text_threshold,
        }
    }
}

/// Join per-page text into one stream with `[Page N]` markers.
fn combine_pages(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, text)| format!("[Page {}]\n{}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Parser for PdfParser {
    fn extensions(&self) -> &'static [&'static str] {
        &[".pdf"]
    }

    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError> {
        require_file(path)?;
        let start = Instant::now();
        let mut warnings = Vec::new();

        let owned = path.to_path_buf();
        let mut pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_by_pages(&owned)
        })
        .await
        .map_err(|e| PipelineError::parse(path, e))?
        .map_err(|e| PipelineError::parse(path, e))?;

        let mut combined = combine_pages(&pages);

        // Scanned documents yield next to no text; try OCR instead.
        if combined.trim().chars().count() < self.min_text_threshold {
            warnings.push("Low text content detected, attempting OCR".to_string());
            match self.ocr.ocr_pdf(path).await {
                Ok(ocr_pages) if ocr_pages.iter().any(|p| !p.trim().is_empty()) => {
                    combined = combine_pages(&ocr_pages);
                    pages = ocr_pages;
                }
                Ok(_) => {
                    warnings.push("OCR produced no text".to_string());
                }
                Err(e) => {
                    warnings.push(format!("OCR failed: {}", e));
                }
            }
        }

        let metadata = self.extract_metadata(path).await?;
        let page_count = pages.len();

        Ok(ParsedContent {
            text: combined,
            metadata,
            pages: Some(pages),
            tables: None,
            language: None,
            page_count: Some(page_count),
            processing_time_ms: Some(start.elapsed().as_millis() as u64),
            warnings,
        })
    }

    async fn extract_metadata(
        &self,
        path: &Path,
    ) -> Result<BTreeMap<String, serde_json::Value>, PipelineError> {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "file_size".to_string(),
            serde_json::json!(file_size(path)?),
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ocr::DisabledOcr;
    use std::io::Write;

    /// Minimal single-page PDF carrying the given phrase, with a valid
    /// xref so the extractor accepts it.
    pub(crate) fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
        let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", phrase);
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let o1 = out.len();
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        let o2 = out.len();
        out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
        let o3 = out.len();
        out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
        let o4 = out.len();
        out.extend_from_slice(
            format!("4 0 obj << /Length {} >> stream\n{}endstream endobj\n", stream.len(), stream)
                .as_bytes(),
        );
        let o5 = out.len();
        out.extend_from_slice(
            b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
        );
        let xref_start = out.len();
        out.extend_from_slice(b"xref\n0 6\n");
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in [o1, o2, o3, o4, o5] {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
        out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    #[tokio::test]
    async fn parses_text_pdf_with_page_markers() {
        let mut f = tempfile::NamedTempFile::with_suffix(".pdf").unwrap();
        f.write_all(&minimal_pdf_with_phrase(
            "The tender submission deadline is 15 March 2024 and all bidders shall comply with every stated requirement of the invitation documents",
        ))
        .unwrap();

        let parser = PdfParser::new(Arc::new(DisabledOcr), 20);
        let parsed = parser.parse(f.path()).await.unwrap();
        assert!(parsed.text.contains("[Page 1]"));
        assert!(parsed.text.contains("submission deadline"));
        assert_eq!(parsed.page_count, Some(1));
        assert!(parsed.warnings.is_empty());
    }

    #[tokio::test]
    async fn low_text_triggers_ocr_and_downgrades_failure_to_warning() {
        let mut f = tempfile::NamedTempFile::with_suffix(".pdf").unwrap();
        f.write_all(&minimal_pdf_with_phrase("x")).unwrap();

        let parser = PdfParser::new(Arc::new(DisabledOcr), 100);
        let parsed = parser.parse(f.path()).await.unwrap();
        assert!(parsed
            .warnings
            .iter()
            .any(|w| w.contains("attempting OCR")));
        assert!(parsed.warnings.iter().any(|w| w.contains("OCR failed")));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let parser = PdfParser::new(Arc::new(DisabledOcr), 100);
        let err = parser.parse(Path::new("/nonexistent/a.pdf")).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn garbage_bytes_fail_to_parse() {
        let mut f = tempfile::NamedTempFile::with_suffix(".pdf").unwrap();
        f.write_all(b"this is not a pdf at all").unwrap();
        let parser = PdfParser::new(Arc::new(DisabledOcr), 10);
        assert!(parser.parse(f.path()).await.is_err());
    }
}
