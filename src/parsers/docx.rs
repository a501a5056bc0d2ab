//! Word document parser (.docx).
//!
//! Extracts paragraphs (headings prefixed with `##`), tables (kept both
//! as structured rows and flattened into the text stream as pipe-joined
//! lines), and core properties. A .docx is a ZIP of XML parts; the
//! document body lives in `word/document.xml`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use quick_xml::events::Event;

use crate::error::PipelineError;
use crate::models::{ExtractedTable, ParsedContent};

use super::ooxml;
use super::{file_size, require_file, Parser};

pub struct DocxParser;

#[async_trait]
impl Parser for DocxParser {
    fn extensions(&self) -> &'static [&'static str] {
        &[".docx"]
    }

    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError> {
        require_file(path)?;
        let start = Instant::now();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        let mut archive = ooxml::open_archive(path, &bytes)?;

        let doc_xml = ooxml::read_entry(path, &mut archive, "word/document.xml").map_err(|_| {
            PipelineError::UnsupportedFormat(format!(
                "{}: word/document.xml not found",
                path.display()
            ))
        })?;

        let body = extract_body(path, &doc_xml)?;

        let mut metadata = ooxml::read_core_properties(path, &mut archive);
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));

        Ok(ParsedContent {
            text: body.lines.join("\n"),
            metadata,
            pages: None,
            tables: if body.tables.is_empty() {
                None
            } else {
                Some(body.tables)
            },
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
        let mut archive = ooxml::open_archive(path, &bytes)?;
        let mut metadata = ooxml::read_core_properties(path, &mut archive);
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));
        Ok(metadata)
    }
}

struct DocxBody {
    lines: Vec<String>,
    tables: Vec<ExtractedTable>,
}

fn extract_body(path: &Path, xml: &[u8]) -> Result<DocxBody, PipelineError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut lines: Vec<String> = Vec::new();
    let mut tables: Vec<ExtractedTable> = Vec::new();

    let mut table_depth = 0usize;
    let mut paragraph = String::new();
    let mut is_heading = false;
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut table_rows: Vec<Vec<String>> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = e.local_name().as_ref().to_vec();
                match tag.as_slice() {
                    b"tbl" => table_depth += 1,
                    b"tr" if table_depth > 0 => row.clear(),
                    b"tc" if table_depth > 0 => cell.clear(),
                    b"p" if table_depth == 0 => {
                        paragraph.clear();
                        is_heading = false;
                    }
                    b"t" => {
                        if let Ok(Event::Text(t)) = reader.read_event_into(&mut buf) {
                            let text = t.unescape().unwrap_or_default();
                            if table_depth > 0 {
                                cell.push_str(&text);
                            } else {
                                paragraph.push_str(&text);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                // Heading style markers are empty elements: <w:pStyle w:val="Heading1"/>.
                if e.local_name().as_ref() == b"pStyle" && table_depth == 0 {
                    let heading = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"val"
                            && String::from_utf8_lossy(&a.value).starts_with("Heading")
                    });
                    if heading {
                        is_heading = true;
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" if table_depth == 0 => {
                    let text = paragraph.trim();
                    if !text.is_empty() {
                        if is_heading {
                            lines.push(format!("\n## {}\n", text));
                        } else {
                            lines.push(text.to_string());
                        }
                    }
                }
                b"tc" if table_depth > 0 => row.push(cell.trim().to_string()),
                b"tr" if table_depth > 0 => table_rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !table_rows.is_empty() {
                        for r in &table_rows {
                            lines.push(r.join(" | "));
                        }
                        tables.push(ExtractedTable {
                            origin: format!("table {}", tables.len()),
                            rows: std::mem::take(&mut table_rows),
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(PipelineError::parse(path, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(DocxBody { lines, tables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn minimal_docx(body_xml: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body_xml
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    fn write_docx(body_xml: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::with_suffix(".docx").unwrap();
        f.write_all(&minimal_docx(body_xml)).unwrap();
        f
    }

    #[tokio::test]
    async fn paragraphs_and_headings_extracted() {
        let f = write_docx(
            "<w:p><w:pPr><w:pStyle w:val=\"Heading1\"/></w:pPr><w:r><w:t>Scope of Works</w:t></w:r></w:p>\
             <w:p><w:r><w:t>The contractor shall provide all labour.</w:t></w:r></w:p>",
        );
        let parsed = DocxParser.parse(f.path()).await.unwrap();
        assert!(parsed.text.contains("## Scope of Works"));
        assert!(parsed.text.contains("The contractor shall provide all labour."));
    }

    #[tokio::test]
    async fn tables_flattened_into_text_and_kept_structured() {
        let f = write_docx(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Item</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Qty</w:t></w:r></w:p></w:tc></w:tr>\
             <w:tr><w:tc><w:p><w:r><w:t>Concrete</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>40</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
        );
        let parsed = DocxParser.parse(f.path()).await.unwrap();
        assert!(parsed.text.contains("Item | Qty"));
        assert!(parsed.text.contains("Concrete | 40"));
        let tables = parsed.tables.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows[1], vec!["Concrete", "40"]);
    }

    #[tokio::test]
    async fn corrupt_container_is_unsupported_format() {
        let mut f = tempfile::NamedTempFile::with_suffix(".docx").unwrap();
        f.write_all(b"not a zip archive").unwrap();
        let err = DocxParser.parse(f.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
    }
}
