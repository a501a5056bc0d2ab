//! Image parser with mandatory OCR.
//!
//! Scanned drawings and site photos carry their text in pixels, so OCR
//! is not a fallback here — a failed OCR pass fails the parse. Pixel
//! dimensions are sniffed from the container headers and recorded in
//! the metadata.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::ParsedContent;

use super::ocr::OcrEngine;
use super::{file_extension, file_size, require_file, Parser};

pub struct ImageParser {
    ocr: Arc<dyn OcrEngine>,
}

impl ImageParser {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }
}

/// (width, height) from the image container header, where recognizable.
fn sniff_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    // PNG: IHDR width/height as big-endian u32 at offsets 16 and 20.
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) && bytes.len() >= 24 {
        let w = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let h = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        return Some((w, h));
    }
    // GIF: logical screen width/height as little-endian u16 at offset 6.
    if bytes.starts_with(b"GIF8") && bytes.len() >= 10 {
        let w = u16::from_le_bytes([bytes[6], bytes[7]]) as u32;
        let h = u16::from_le_bytes([bytes[8], bytes[9]]) as u32;
        return Some((w, h));
    }
    // BMP: width/height as little-endian i32 at offsets 18 and 22.
    if bytes.starts_with(b"BM") && bytes.len() >= 26 {
        let w = i32::from_le_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]);
        let h = i32::from_le_bytes([bytes[22], bytes[23], bytes[24], bytes[25]]);
        return Some((w.unsigned_abs(), h.unsigned_abs()));
    }
    // JPEG: walk the marker segments to the first SOF frame header.
    if bytes.starts_with(&[0xFF, 0xD8]) {
        let mut pos = 2usize;
        while pos + 9 < bytes.len() {
            if bytes[pos] != 0xFF {
                break;
            }
            let marker = bytes[pos + 1];
            if (0xC0..=0xCF).contains(&marker) && marker != 0xC4 && marker != 0xC8 && marker != 0xCC
            {
                let h = u16::from_be_bytes([bytes[pos + 5], bytes[pos + 6]]) as u32;
                let w = u16::from_be_bytes([bytes[pos + 7], bytes[pos + 8]]) as u32;
                return Some((w, h));
            }
            let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
            pos += 2 + len;
        }
    }
    None
}

#[async_trait]
impl Parser for ImageParser {
    fn extensions(&self) -> &'static [&'static str] {
        &[".png", ".jpg", ".jpeg", ".tiff", ".tif", ".bmp", ".gif"]
    }

    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError> {
        require_file(path)?;
        let start = Instant::now();

        let text = self.ocr.ocr_image(path).await?;
        let metadata = self.extract_metadata(path).await?;

        Ok(ParsedContent {
            text: text.trim().to_string(),
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
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;

        let mut metadata = BTreeMap::new();
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));
        if let Some(ext) = file_extension(path) {
            metadata.insert(
                "format".to_string(),
                serde_json::json!(ext.trim_start_matches('.')),
            );
        }
        if let Some((w, h)) = sniff_dimensions(&bytes) {
            metadata.insert("width".to_string(), serde_json::json!(w));
            metadata.insert("height".to_string(), serde_json::json!(h));
        }
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ocr::DisabledOcr;
    use std::io::Write;

    fn png_header(w: u32, h: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&w.to_be_bytes());
        bytes.extend_from_slice(&h.to_be_bytes());
        bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
        bytes
    }

    #[test]
    fn png_dimensions_sniffed() {
        assert_eq!(sniff_dimensions(&png_header(640, 480)), Some((640, 480)));
    }

    #[test]
    fn gif_dimensions_sniffed() {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&320u16.to_le_bytes());
        bytes.extend_from_slice(&200u16.to_le_bytes());
        assert_eq!(sniff_dimensions(&bytes), Some((320, 200)));
    }

    #[test]
    fn unknown_container_has_no_dimensions() {
        assert_eq!(sniff_dimensions(b"random bytes here"), None);
    }

    #[tokio::test]
    async fn ocr_failure_fails_the_parse() {
        let mut f = tempfile::NamedTempFile::with_suffix(".png").unwrap();
        f.write_all(&png_header(10, 10)).unwrap();
        let parser = ImageParser::new(Arc::new(DisabledOcr));
        assert!(parser.parse(f.path()).await.is_err());
    }
}
