//! Spreadsheet parser (.xlsx, .xls).
//!
//! Every non-empty row of every sheet becomes both a structured table
//! entry and a pipe-joined text line, so pricing schedules and bills of
//! quantities survive into the chunked text stream. Sheet names are
//! demarcated with `=== Sheet: name ===` markers and recorded in the
//! metadata.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};

use crate::error::PipelineError;
use crate::models::{ExtractedTable, ParsedContent};

use super::{file_size, require_file, Parser};

pub struct XlsxParser;

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

struct WorkbookContent {
    lines: Vec<String>,
    tables: Vec<ExtractedTable>,
    sheet_names: Vec<String>,
}

fn read_workbook(path: &Path) -> Result<WorkbookContent, PipelineError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        PipelineError::UnsupportedFormat(format!(
            "{}: invalid or corrupted workbook: {}",
            path.display(),
            e
        ))
    })?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut lines = Vec::new();
    let mut tables = Vec::new();

    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(range) => range,
            Err(e) => {
                return Err(PipelineError::parse(
                    path,
                    format!("sheet {}: {}", name, e),
                ))
            }
        };

        lines.push(format!("\n=== Sheet: {} ===\n", name));

        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in range.rows() {
            if row.iter().all(|c| matches!(c, Data::Empty)) {
                continue;
            }
            let values: Vec<String> = row.iter().map(cell_to_string).collect();
            lines.push(values.join(" | "));
            rows.push(values);
        }

        if !rows.is_empty() {
            tables.push(ExtractedTable {
                origin: name.clone(),
                rows,
            });
        }
    }

    Ok(WorkbookContent {
        lines,
        tables,
        sheet_names,
    })
}

#[async_trait]
impl Parser for XlsxParser {
    fn extensions(&self) -> &'static [&'static str] {
        &[".xlsx", ".xls"]
    }

    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError> {
        require_file(path)?;
        let start = Instant::now();

        let owned = path.to_path_buf();
        let content = tokio::task::spawn_blocking(move || read_workbook(&owned))
            .await
            .map_err(|e| PipelineError::parse(path, e))??;

        let mut metadata = BTreeMap::new();
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));
        metadata.insert(
            "sheet_count".to_string(),
            serde_json::json!(content.sheet_names.len()),
        );
        metadata.insert(
            "sheet_names".to_string(),
            serde_json::json!(content.sheet_names),
        );

        Ok(ParsedContent {
            text: content.lines.join("\n"),
            metadata,
            pages: None,
            tables: if content.tables.is_empty() {
                None
            } else {
                Some(content.tables)
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
        let owned = path.to_path_buf();
        let content = tokio::task::spawn_blocking(move || read_workbook(&owned))
            .await
            .map_err(|e| PipelineError::parse(path, e))??;

        let mut metadata = BTreeMap::new();
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));
        metadata.insert(
            "sheet_count".to_string(),
            serde_json::json!(content.sheet_names.len()),
        );
        metadata.insert(
            "sheet_names".to_string(),
            serde_json::json!(content.sheet_names),
        );
        Ok(metadata)
    }
}
