//! Email parser (.eml).
//!
//! Correspondence carries clarifications and addenda notices, so RFC
//! 822 messages are ingested too: headers and the text body become the
//! document text, attachments are inventoried in the metadata. For
//! multipart messages the first `text/plain` part is preferred, with
//! `text/html` as a last resort.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::ParsedContent;

use super::{file_size, require_file, Parser};

pub struct EmailParser;

struct ParsedEmail {
    headers: BTreeMap<String, String>,
    body: String,
    attachments: Vec<String>,
}

/// Split a message into unfolded headers and the raw body.
fn split_message(raw: &str) -> (BTreeMap<String, String>, &str) {
    let mut headers = BTreeMap::new();
    let mut last_key: Option<String> = None;
    let mut body_start = raw.len();

    let mut offset = 0usize;
    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            body_start = offset + line.len();
            break;
        }
        if (line.starts_with(' ') || line.starts_with('\t')) && last_key.is_some() {
            // Folded continuation of the previous header.
            if let Some(key) = &last_key {
                let entry = headers.entry(key.clone()).or_default();
                *entry = format!("{} {}", entry, trimmed.trim());
            }
        } else if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim().to_lowercase();
            headers.insert(key.clone(), value.trim().to_string());
            last_key = Some(key);
        }
        offset += line.len();
    }

    (headers, &raw[body_start.min(raw.len())..])
}

fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    let idx = lower.find("boundary=")?;
    let rest = &content_type[idx + "boundary=".len()..];
    let rest = rest.trim_start();
    let boundary = if let Some(stripped) = rest.strip_prefix('"') {
        stripped.split('"').next().unwrap_or("")
    } else {
        rest.split(&[';', ' '][..]).next().unwrap_or("")
    };
    if boundary.is_empty() {
        None
    } else {
        Some(boundary.to_string())
    }
}

fn parse_email(raw: &str) -> ParsedEmail {
    let (headers, raw_body) = split_message(raw);

    let content_type = headers.get("content-type").cloned().unwrap_or_default();
    let mut attachments = Vec::new();

    let body = match boundary_from_content_type(&content_type) {
        Some(boundary) => {
            let marker = format!("--{}", boundary);
            let mut plain: Option<String> = None;
            let mut html: Option<String> = None;

            for part in raw_body.split(marker.as_str()).skip(1) {
                let part = part.trim_start_matches(['\r', '\n']);
                if part.starts_with("--") || part.trim().is_empty() {
                    continue;
                }
                let (part_headers, part_body) = split_message(part);
                let part_type = part_headers
                    .get("content-type")
                    .map(|s| s.to_lowercase())
                    .unwrap_or_default();
                let disposition = part_headers
                    .get("content-disposition")
                    .map(|s| s.to_lowercase())
                    .unwrap_or_default();

                if disposition.starts_with("attachment") {
                    if let Some(idx) = disposition.find("filename=") {
                        let name = disposition[idx + "filename=".len()..]
                            .trim_matches(['"', ';', ' '])
                            .to_string();
                        attachments.push(name);
                    } else {
                        attachments.push("(unnamed)".to_string());
                    }
                    continue;
                }

                if part_type.starts_with("text/plain") && plain.is_none() {
                    plain = Some(part_body.trim().to_string());
                } else if part_type.starts_with("text/html") && html.is_none() {
                    html = Some(part_body.trim().to_string());
                }
            }

            plain.or(html).unwrap_or_default()
        }
        None => raw_body.trim().to_string(),
    };

    ParsedEmail {
        headers,
        body,
        attachments,
    }
}

#[async_trait]
impl Parser for EmailParser {
    fn extensions(&self) -> &'static [&'static str] {
        &[".eml"]
    }

    async fn parse(&self, path: &Path) -> Result<ParsedContent, PipelineError> {
        require_file(path)?;
        let start = Instant::now();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::io(path, e))?;
        let raw = String::from_utf8_lossy(&bytes);
        let email = parse_email(&raw);

        let header = |name: &str| email.headers.get(name).cloned().unwrap_or_default();

        let mut lines = vec![
            format!("From: {}", header("from")),
            format!("To: {}", header("to")),
        ];
        if let Some(cc) = email.headers.get("cc") {
            lines.push(format!("CC: {}", cc));
        }
        lines.push(format!("Subject: {}", header("subject")));
        lines.push(format!("Date: {}", header("date")));
        lines.push(String::new());
        lines.push("--- Body ---".to_string());
        lines.push(if email.body.is_empty() {
            "(No body)".to_string()
        } else {
            email.body.clone()
        });

        let mut metadata = BTreeMap::new();
        metadata.insert("file_size".to_string(), serde_json::json!(file_size(path)?));
        for key in ["from", "to", "cc", "subject", "date", "message-id"] {
            if let Some(value) = email.headers.get(key) {
                metadata.insert(key.replace('-', "_"), serde_json::json!(value));
            }
        }
        metadata.insert(
            "attachment_count".to_string(),
            serde_json::json!(email.attachments.len()),
        );
        metadata.insert(
            "attachments".to_string(),
            serde_json::json!(email.attachments),
        );

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

    #[tokio::test]
    async fn simple_message_parsed() {
        let raw = "From: estimator@contractor.example\r\n\
To: tenders@client.example\r\n\
Subject: Clarification request CR-07\r\n\
Date: Mon, 04 Mar 2024 09:12:00 +0400\r\n\
\r\n\
Please confirm the retention percentage stated in clause 14.3.\r\n";
        let mut f = tempfile::NamedTempFile::with_suffix(".eml").unwrap();
        f.write_all(raw.as_bytes()).unwrap();

        let parsed = EmailParser.parse(f.path()).await.unwrap();
        assert!(parsed.text.contains("Subject: Clarification request CR-07"));
        assert!(parsed.text.contains("retention percentage"));
        assert_eq!(
            parsed.metadata["from"],
            serde_json::json!("estimator@contractor.example")
        );
    }

    #[tokio::test]
    async fn multipart_prefers_text_plain_and_lists_attachments() {
        let raw = "From: a@b.c\n\
To: d@e.f\n\
Subject: Addendum 2\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\n\
\n\
--XYZ\n\
Content-Type: text/html\n\
\n\
<p>See attached addendum.</p>\n\
--XYZ\n\
Content-Type: text/plain\n\
\n\
See attached addendum. Submission deadline extended to 22 March.\n\
--XYZ\n\
Content-Type: application/pdf\n\
Content-Disposition: attachment; filename=\"Addendum_02.pdf\"\n\
\n\
%PDF-1.4 ...\n\
--XYZ--\n";
        let mut f = tempfile::NamedTempFile::with_suffix(".eml").unwrap();
        f.write_all(raw.as_bytes()).unwrap();

        let parsed = EmailParser.parse(f.path()).await.unwrap();
        assert!(parsed.text.contains("deadline extended to 22 March"));
        assert!(!parsed.text.contains("<p>"));
        assert_eq!(parsed.metadata["attachment_count"], serde_json::json!(1));
        assert_eq!(
            parsed.metadata["attachments"],
            serde_json::json!(["addendum_02.pdf"])
        );
    }
}
