//! Slide deck parser (.pptx).
//!
//! Extracts per-slide text, embedded tables, and speaker notes, each
//! demarcated with an `=== Slide N ===` boundary marker. The per-slide
//! texts double as the page list so chunks can be attributed to slides.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use quick_xml::events::Event;

use crate::error::PipelineError;
use crate::models::{ExtractedTable, ParsedContent};

use super::ooxml;
use super::{file_size, require_file, Parser};

pub struct PptxParser;

#[async_trait]
impl Parser for PptxParser {
    fn extensions(&self) -> &'static [&'static str] {
        &[".pptx"]
    }

    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError> {
        require_file(path)?;
        let start = Instant::now();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        let mut archive = ooxml::open_archive(path, &bytes)?;

        let slide_names = ooxml::numbered_entries(&archive, "ppt/slides/slide", ".xml");
        if slide_names.is_empty() {
            return Err(PipelineError::UnsupportedFormat(format!(
                "{}: no slides found in presentation",
                path.display()
            )));
        }

        let mut slides_text: Vec<String> = Vec::new();
        let mut tables: Vec<ExtractedTable> = Vec::new();

        for (slide_idx, name) in slide_names.iter().enumerate() {
            let slide_num = slide_idx + 1;
            let xml = ooxml::read_entry(path, &mut archive, name)?;
            let slide = extract_slide(path, &xml)?;

            let mut content = vec![format!("\n=== Slide {} ===\n", slide_num)];
            content.extend(slide.lines);

            for rows in slide.tables {
                for row in &rows {
                    content.push(row.join(" | "));
                }
                tables.push(ExtractedTable {
                    origin: format!("slide {}", slide_num),
                    rows,
                });
            }

            // Speaker notes live in a sibling part, matched by number.
            let notes_name = format!("ppt/notesSlides/notesSlide{}.xml", slide_num);
            if let Ok(notes_xml) = ooxml::read_entry(path, &mut archive, &notes_name) {
                let notes = extract_slide(path, &notes_xml)?;
                let notes_text = notes.lines.join(" ");
                if !notes_text.trim().is_empty() {
                    content.push(format!("\n[Notes: {}]", notes_text.trim()));
                }
            }

            slides_text.push(content.join("\n"));
        }

        let mut metadata = ooxml::read_core_properties(path, &mut archive);
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));
        metadata.insert(
            "slide_count".to_string(),
            serde_json::json!(slide_names.len()),
        );

        Ok(ParsedContent {
            text: slides_text.join("\n\n"),
            metadata,
            pages: Some(slides_text),
            tables: if tables.is_empty() { None } else { Some(tables) },
            language: None,
            page_count: Some(slide_names.len()),
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
        let slide_count = ooxml::numbered_entries(&archive, "ppt/slides/slide", ".xml").len();
        let mut metadata = ooxml::read_core_properties(path, &mut archive);
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));
        metadata.insert("slide_count".to_string(), serde_json::json!(slide_count));
        Ok(metadata)
    }
}

struct SlideContent {
    lines: Vec<String>,
    tables: Vec<Vec<Vec<String>>>,
}

/// Pull paragraph text and tables out of one slide (or notes) part.
/// DrawingML text runs are `<a:t>` elements grouped under `<a:p>`.
fn extract_slide(path: &Path, xml: &[u8]) -> Result<SlideContent, PipelineError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut lines: Vec<String> = Vec::new();
    let mut tables: Vec<Vec<Vec<String>>> = Vec::new();

    let mut in_table = false;
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut table_rows: Vec<Vec<String>> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = e.local_name().as_ref().to_vec();
                match tag.as_slice() {
                    b"tbl" => in_table = true,
                    b"tr" if in_table => row.clear(),
                    b"tc" if in_table => cell.clear(),
                    b"p" if !in_table => paragraph.clear(),
                    b"t" => {
                        if let Ok(Event::Text(t)) = reader.read_event_into(&mut buf) {
                            let text = t.unescape().unwrap_or_default();
                            if in_table {
                                if !cell.is_empty() {
                                    cell.push(' ');
                                }
                                cell.push_str(&text);
                            } else {
                                paragraph.push_str(&text);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" if !in_table => {
                    let text = paragraph.trim();
                    if !text.is_empty() {
                        lines.push(text.to_string());
                    }
                }
                b"tc" if in_table => row.push(cell.trim().to_string()),
                b"tr" if in_table => table_rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    in_table = false;
                    if !table_rows.is_empty() {
                        tables.push(std::mem::take(&mut table_rows));
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

    Ok(SlideContent { lines, tables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn slide_xml(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?><p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\">{}</p:sld>",
            body
        )
    }

    fn minimal_pptx(slides: &[&str], notes: Option<&str>) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts = zip::write::SimpleFileOptions::default();
            for (i, body) in slides.iter().enumerate() {
                zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), opts)
                    .unwrap();
                zip.write_all(slide_xml(body).as_bytes()).unwrap();
            }
            if let Some(notes_body) = notes {
                zip.start_file("ppt/notesSlides/notesSlide1.xml", opts).unwrap();
                zip.write_all(slide_xml(notes_body).as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn slides_are_demarcated_and_ordered() {
        let mut f = tempfile::NamedTempFile::with_suffix(".pptx").unwrap();
        f.write_all(&minimal_pptx(
            &[
                "<a:p><a:r><a:t>Project kickoff</a:t></a:r></a:p>",
                "<a:p><a:r><a:t>Milestone plan</a:t></a:r></a:p>",
            ],
            None,
        ))
        .unwrap();

        let parsed = PptxParser.parse(f.path()).await.unwrap();
        assert!(parsed.text.contains("=== Slide 1 ==="));
        assert!(parsed.text.contains("=== Slide 2 ==="));
        let kickoff = parsed.text.find("Project kickoff").unwrap();
        let milestone = parsed.text.find("Milestone plan").unwrap();
        assert!(kickoff < milestone);
        assert_eq!(parsed.page_count, Some(2));
    }

    #[tokio::test]
    async fn notes_and_tables_extracted() {
        let table = "<a:tbl><a:tr><a:tc><a:txBody><a:p><a:r><a:t>Phase</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p><a:r><a:t>Date</a:t></a:r></a:p></a:txBody></a:tc></a:tr></a:tbl>";
        let mut f = tempfile::NamedTempFile::with_suffix(".pptx").unwrap();
        f.write_all(&minimal_pptx(
            &[&format!("<a:p><a:r><a:t>Schedule</a:t></a:r></a:p>{}", table)],
            Some("<a:p><a:r><a:t>Mention the site visit</a:t></a:r></a:p>"),
        ))
        .unwrap();

        let parsed = PptxParser.parse(f.path()).await.unwrap();
        assert!(parsed.text.contains("Phase | Date"));
        assert!(parsed.text.contains("[Notes: Mention the site visit]"));
        let tables = parsed.tables.unwrap();
        assert_eq!(tables[0].origin, "slide 1");
    }

    #[tokio::test]
    async fn corrupt_container_is_unsupported_format() {
        let mut f = tempfile::NamedTempFile::with_suffix(".pptx").unwrap();
        f.write_all(b"junk").unwrap();
        assert!(matches!(
            PptxParser.parse(f.path()).await.unwrap_err(),
            PipelineError::UnsupportedFormat(_)
        ));
    }
}
