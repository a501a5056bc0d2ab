//! Plain and structured text parser (.txt, .md, .csv, .json, …).
//!
//! Encoding is auto-detected from the byte order mark; without one the
//! bytes are decoded as strict UTF-8 with a lossy fallback rather than
//! raising.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::ParsedContent;

use super::{require_file, Parser};

pub struct TextParser;

/// Decode file bytes, returning the text and the encoding label used.
fn decode(bytes: &[u8]) -> (String, &'static str) {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return (String::from_utf8_lossy(&bytes[3..]).into_owned(), "utf-8-bom");
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        return (String::from_utf16_lossy(&units), "utf-16-le");
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return (String::from_utf16_lossy(&units), "utf-16-be");
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), "utf-8"),
        Err(_) => (String::from_utf8_lossy(bytes).into_owned(), "utf-8-lossy"),
    }
}

#[async_trait]
impl Parser for TextParser {
    fn extensions(&self) -> &'static [&'static str] {
        &[".txt", ".md", ".csv", ".json", ".xml", ".yaml", ".yml", ".log"]
    }

    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError> {
        require_file(path)?;
        let start = Instant::now();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        let (text, encoding) = decode(&bytes);

        let mut metadata = BTreeMap::new();
        metadata.insert("file_size".to_string(), serde_json::json!(bytes.len()));
        metadata.insert("encoding".to_string(), serde_json::json!(encoding));
        metadata.insert(
            "line_count".to_string(),
            serde_json::json!(text.lines().count()),
        );

        Ok(ParsedContent {
            text,
            metadata,
            pages: None,
            tables: None,
            language: None,
            page_count: None,
            processing_time_ms: Some(start.elapsed().as_millis() as u64),
            warnings: Vec::new(),
        })
    }

    async fn extract_metadata(
        &self,
        path: &Path,
    ) -> Result<BTreeMap<String, serde_json::Value>, PipelineError> {
        require_file(path)?;
        let size = super::file_size(path)?;
        let mut metadata = BTreeMap::new();
        metadata.insert("file_size".to_string(), serde_json::json!(size));
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn utf8_text_parsed_directly() {
        let mut f = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
        f.write_all("Site visit on 12 April.\nBring PPE.".as_bytes())
            .unwrap();
        let parsed = TextParser.parse(f.path()).await.unwrap();
        assert!(parsed.text.contains("Site visit"));
        assert_eq!(parsed.metadata["encoding"], serde_json::json!("utf-8"));
        assert_eq!(parsed.metadata["line_count"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn utf16le_bom_detected() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "tender".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let mut f = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
        f.write_all(&bytes).unwrap();
        let parsed = TextParser.parse(f.path()).await.unwrap();
        assert_eq!(parsed.text, "tender");
        assert_eq!(parsed.metadata["encoding"], serde_json::json!("utf-16-le"));
    }

    #[tokio::test]
    async fn invalid_utf8_decodes_lossily_instead_of_failing() {
        let mut f = tempfile::NamedTempFile::with_suffix(".log").unwrap();
        f.write_all(&[b'o', b'k', 0xFF, 0xFE, b'!', b' ', b'x']).unwrap();
        let parsed = TextParser.parse(f.path()).await.unwrap();
        assert!(parsed.text.starts_with("ok"));
        assert_eq!(parsed.metadata["encoding"], serde_json::json!("utf-8-lossy"));
    }
}
