//! CAD drawing parser (.dxf, .dwg).
//!
//! DXF is a plain-text format of (group code, value) line pairs; the
//! parser walks the pairs and collects text entities, dimension values,
//! and block attributes. Attribute tags that look like title-block
//! fields (title, rev, scale, …) are gathered into a `title_block`
//! metadata sub-map.
//!
//! DWG is binary and is converted to DXF by an external converter run
//! under an explicit timeout. Timeout or nonzero exit is a soft
//! failure: a warning is recorded and a direct parse is attempted so
//! the file ends up failed-with-reason rather than hanging the batch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ConvertConfig;
use crate::error::PipelineError;
use crate::models::ParsedContent;

use super::{file_extension, file_size, require_file, Parser};

/// Attribute tags treated as title-block fields.
const TITLE_BLOCK_KEYS: [&str; 6] = ["title", "dwg", "rev", "date", "scale", "project"];

pub struct CadParser {
    convert: ConvertConfig,
}

impl CadParser {
    pub fn new(convert: ConvertConfig) -> Self {
        Self { convert }
    }

    fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert.timeout_secs)
    }

    /// Convert a DWG to DXF via the configured external converter.
    async fn convert_dwg(&self, dwg: &Path) -> Result<PathBuf, PipelineError> {
        if self.convert.dwg_converter_path.is_empty() {
            return Err(PipelineError::parse(
                dwg,
                "DWG conversion requires convert.dwg_converter_path to be configured",
            ));
        }

        let input_dir = dwg.parent().unwrap_or(Path::new("."));
        let output_dir =
            std::env::temp_dir().join(format!("bidops-dwg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&output_dir).map_err(|e| PipelineError::io(&output_dir, e))?;

        let mut cmd = Command::new(&self.convert.dwg_converter_path);
        cmd.arg(input_dir)
            .arg(&output_dir)
            .arg("ACAD2018")
            .arg("DXF")
            .arg("0")
            .arg("1");

        let output = tokio::time::timeout(self.convert_timeout(), cmd.output())
            .await
            .map_err(|_| PipelineError::ConversionTimeout(self.convert_timeout()))?
            .map_err(|e| PipelineError::io(dwg, e))?;

        if !output.status.success() {
            return Err(PipelineError::parse(
                dwg,
                format!("converter exited with {}", output.status),
            ));
        }

        let stem = dwg.file_stem().unwrap_or_default().to_string_lossy();
        let converted = output_dir.join(format!("{}.dxf", stem));
        if !converted.exists() {
            return Err(PipelineError::parse(dwg, "converter produced no DXF output"));
        }
        Ok(converted)
    }
}

#[async_trait]
impl Parser for CadParser {
    fn extensions(&self) -> &'static [&'static str] {
        &[".dxf", ".dwg"]
    }

    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError> {
        require_file(path)?;
        let start = Instant::now();
        let mut warnings = Vec::new();

        let is_dwg = file_extension(path).as_deref() == Some(".dwg");
        let dxf_path = if is_dwg {
            match self.convert_dwg(path).await {
                Ok(converted) => converted,
                Err(e) => {
                    warnings.push(format!(
                        "DWG conversion failed ({}), attempting direct parse",
                        e
                    ));
                    path.to_path_buf()
                }
            }
        } else {
            path.to_path_buf()
        };

        let bytes = tokio::fs::read(&dxf_path)
            .await
            .map_err(|e| PipelineError::io(&dxf_path, e))?;
        let content = String::from_utf8_lossy(&bytes);
        let parsed = parse_dxf(&content);

        let mut metadata = BTreeMap::new();
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));
        metadata.insert("layers".to_string(), serde_json::json!(parsed.layers));
        metadata.insert("blocks".to_string(), serde_json::json!(parsed.blocks));
        metadata.insert(
            "title_block".to_string(),
            serde_json::json!(parsed.title_block),
        );

        Ok(ParsedContent {
            text: parsed.lines.join("\n"),
            metadata,
            pages: None,
            tables: None,
            language: None,
            page_count: None,
            processing_time_ms: Some(start.elapsed().as_millis() as u64),
            warnings,
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

#[derive(Default)]
struct DxfContent {
    lines: Vec<String>,
    layers: Vec<String>,
    blocks: Vec<String>,
    title_block: BTreeMap<String, String>,
}

/// Walk the DXF (group code, value) pairs and collect text-bearing
/// entities.
fn parse_dxf(content: &str) -> DxfContent {
    let mut out = DxfContent::default();

    let mut entity = String::new();
    let mut attrib_tag: Option<String> = None;

    let mut lines = content.lines();
    while let (Some(code_line), Some(value_line)) = (lines.next(), lines.next()) {
        let code: i32 = match code_line.trim().parse() {
            Ok(code) => code,
            Err(_) => continue,
        };
        let value = value_line.trim();

        match code {
            0 => {
                attrib_tag = None;
                entity = value.to_uppercase();
            }
            1 => match entity.as_str() {
                "TEXT" | "MTEXT" => {
                    if !value.is_empty() {
                        out.lines.push(value.to_string());
                    }
                }
                "ATTRIB" => {
                    if let Some(tag) = attrib_tag.take() {
                        out.lines.push(format!("{}: {}", tag, value));
                        let tag_lower = tag.to_lowercase();
                        if TITLE_BLOCK_KEYS.iter().any(|k| tag_lower.contains(k)) {
                            out.title_block.insert(tag, value.to_string());
                        }
                    }
                }
                _ => {}
            },
            // MTEXT continuation chunks.
            3 if entity == "MTEXT" => {
                if !value.is_empty() {
                    out.lines.push(value.to_string());
                }
            }
            2 => match entity.as_str() {
                "LAYER" => out.layers.push(value.to_string()),
                "INSERT" => out.blocks.push(value.to_string()),
                "ATTRIB" => attrib_tag = Some(value.to_string()),
                _ => {}
            },
            // Actual measurement on dimension entities.
            42 if entity == "DIMENSION" => {
                out.lines.push(format!("Dimension: {}", value));
            }
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dxf_pairs(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .flat_map(|(code, value)| [code.to_string(), value.to_string()])
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn text_entities_and_dimensions_extracted() {
        let content = dxf_pairs(&[
            ("0", "SECTION"),
            ("2", "ENTITIES"),
            ("0", "TEXT"),
            ("1", "GROUND FLOOR PLAN"),
            ("0", "MTEXT"),
            ("1", "SCALE 1:100"),
            ("0", "DIMENSION"),
            ("42", "4500.0"),
            ("0", "ENDSEC"),
        ]);
        let parsed = parse_dxf(&content);
        assert!(parsed.lines.contains(&"GROUND FLOOR PLAN".to_string()));
        assert!(parsed.lines.contains(&"SCALE 1:100".to_string()));
        assert!(parsed.lines.contains(&"Dimension: 4500.0".to_string()));
    }

    #[test]
    fn attributes_feed_the_title_block() {
        let content = dxf_pairs(&[
            ("0", "INSERT"),
            ("2", "TITLEBLOCK"),
            ("0", "ATTRIB"),
            ("2", "DWG_TITLE"),
            ("1", "Marina Tower — Elevation"),
            ("0", "ATTRIB"),
            ("2", "REV"),
            ("1", "C"),
            ("0", "ATTRIB"),
            ("2", "CHECKED_BY"),
            ("1", "KH"),
            ("0", "SEQEND"),
        ]);
        let parsed = parse_dxf(&content);
        assert!(parsed.blocks.contains(&"TITLEBLOCK".to_string()));
        assert_eq!(
            parsed.title_block.get("DWG_TITLE").map(String::as_str),
            Some("Marina Tower — Elevation")
        );
        assert_eq!(parsed.title_block.get("REV").map(String::as_str), Some("C"));
        assert!(!parsed.title_block.contains_key("CHECKED_BY"));
        assert!(parsed.lines.contains(&"CHECKED_BY: KH".to_string()));
    }

    #[test]
    fn layer_names_collected() {
        let content = dxf_pairs(&[
            ("0", "TABLE"),
            ("2", "LAYER"),
            ("0", "LAYER"),
            ("2", "A-WALL"),
            ("0", "LAYER"),
            ("2", "S-GRID"),
            ("0", "ENDTAB"),
        ]);
        let parsed = parse_dxf(&content);
        assert_eq!(parsed.layers, vec!["A-WALL", "S-GRID"]);
    }

    #[tokio::test]
    async fn unconfigured_dwg_conversion_degrades_to_warning() {
        let mut f = tempfile::NamedTempFile::with_suffix(".dwg").unwrap();
        f.write_all(b"\x01\x02 binary dwg").unwrap();
        let parser = CadParser::new(ConvertConfig::default());
        let parsed = parser.parse(f.path()).await.unwrap();
        assert!(parsed
            .warnings
            .iter()
            .any(|w| w.contains("attempting direct parse")));
        assert!(!parsed.has_content());
    }
}
