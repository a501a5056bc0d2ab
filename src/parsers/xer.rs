//! Primavera P6 schedule parser (.xer).
//!
//! XER exports are tab-separated tables introduced by `%T` (table
//! name), `%F` (field names), and `%R` (data row) records. Projects,
//! activities, WBS nodes, and resources become text lines; counts and
//! summaries go into the metadata.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::ParsedContent;

use super::{file_size, require_file, Parser};

pub struct XerParser;

struct XerTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn parse_tables(content: &str) -> HashMap<String, XerTable> {
    let mut tables: HashMap<String, XerTable> = HashMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(name) = line.strip_prefix("%T\t") {
            let name = name.trim().to_string();
            tables.insert(
                name.clone(),
                XerTable {
                    columns: Vec::new(),
                    rows: Vec::new(),
                },
            );
            current = Some(name);
        } else if let Some(fields) = line.strip_prefix("%F\t") {
            if let Some(table) = current.as_ref().and_then(|n| tables.get_mut(n)) {
                table.columns = fields.split('\t').map(|s| s.trim().to_string()).collect();
            }
        } else if let Some(row) = line.strip_prefix("%R\t") {
            if let Some(table) = current.as_ref().and_then(|n| tables.get_mut(n)) {
                table.rows.push(row.split('\t').map(|s| s.trim().to_string()).collect());
            }
        }
    }

    tables
}

impl XerTable {
    /// Value of a named column in one row, empty values as `None`.
    fn field<'a>(&self, row: &'a [String], column: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        let value = row.get(idx)?.as_str();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

#[async_trait]
impl Parser for XerParser {
    fn extensions(&self) -> &'static [&'static str] {
        &[".xer"]
    }

    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError> {
        require_file(path)?;
        let start = Instant::now();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        let content = String::from_utf8_lossy(&bytes);
        let tables = parse_tables(&content);

        let mut lines: Vec<String> = Vec::new();
        let mut projects: Vec<serde_json::Value> = Vec::new();
        let mut activity_count = 0usize;
        let mut wbs_count = 0usize;
        let mut resource_count = 0usize;

        if let Some(table) = tables.get("PROJECT") {
            for row in &table.rows {
                let name = table.field(row, "proj_short_name").unwrap_or("?");
                let plan_start = table.field(row, "plan_start_date").unwrap_or("?");
                let plan_end = table.field(row, "plan_end_date").unwrap_or("?");
                projects.push(serde_json::json!({
                    "name": name,
                    "start": plan_start,
                    "finish": plan_end,
                }));
                lines.push(format!("Project: {} ({} - {})", name, plan_start, plan_end));
            }
        }

        if let Some(table) = tables.get("TASK") {
            for row in &table.rows {
                let code = table.field(row, "task_code").unwrap_or("?");
                let name = table.field(row, "task_name").unwrap_or("?");
                lines.push(format!("Activity: {} - {}", code, name));
                activity_count += 1;
            }
        }

        if let Some(table) = tables.get("PROJWBS") {
            for row in &table.rows {
                let code = table.field(row, "wbs_short_name").unwrap_or("?");
                let name = table.field(row, "wbs_name").unwrap_or("?");
                lines.push(format!("WBS: {} - {}", code, name));
                wbs_count += 1;
            }
        }

        if let Some(table) = tables.get("RSRC") {
            resource_count = table.rows.len();
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));
        metadata.insert("projects".to_string(), serde_json::json!(projects));
        metadata.insert("activity_count".to_string(), serde_json::json!(activity_count));
        metadata.insert("wbs_count".to_string(), serde_json::json!(wbs_count));
        metadata.insert("resource_count".to_string(), serde_json::json!(resource_count));

        Ok(ParsedContent {
            text: lines.join("\n"),
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
        let parsed = self.parse(path).await?;
        Ok(parsed.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "ERMHDR\t19.12\n\
%T\tPROJECT\n\
%F\tproj_id\tproj_short_name\tplan_start_date\tplan_end_date\n\
%R\t100\tMARINA-T2\t2024-05-01\t2026-04-30\n\
%T\tTASK\n\
%F\ttask_id\ttask_code\ttask_name\n\
%R\t1\tA1000\tMobilization\n\
%R\t2\tA1010\tExcavation works\n\
%T\tPROJWBS\n\
%F\twbs_id\twbs_short_name\twbs_name\n\
%R\t10\t1.1\tSubstructure\n\
%T\tRSRC\n\
%F\trsrc_id\trsrc_name\trsrc_type\n\
%R\t5\tTower Crane\tRT_Equip\n";

    #[tokio::test]
    async fn schedule_entities_become_text_lines() {
        let mut f = tempfile::NamedTempFile::with_suffix(".xer").unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();

        let parsed = XerParser.parse(f.path()).await.unwrap();
        assert!(parsed
            .text
            .contains("Project: MARINA-T2 (2024-05-01 - 2026-04-30)"));
        assert!(parsed.text.contains("Activity: A1000 - Mobilization"));
        assert!(parsed.text.contains("Activity: A1010 - Excavation works"));
        assert!(parsed.text.contains("WBS: 1.1 - Substructure"));
        assert_eq!(parsed.metadata["activity_count"], serde_json::json!(2));
        assert_eq!(parsed.metadata["wbs_count"], serde_json::json!(1));
        assert_eq!(parsed.metadata["resource_count"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn malformed_rows_are_tolerated() {
        let mut f = tempfile::NamedTempFile::with_suffix(".xer").unwrap();
        f.write_all(b"%T\tTASK\n%F\ttask_code\ttask_name\n%R\tA1\n").unwrap();
        let parsed = XerParser.parse(f.path()).await.unwrap();
        assert!(parsed.text.contains("Activity: A1 - ?"));
    }
}
