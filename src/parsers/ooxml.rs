//! Shared helpers for OOXML containers (.docx, .pptx).
//!
//! OOXML files are ZIP archives of XML parts. These helpers read parts
//! with a decompression bound (zip-bomb protection) and pull the common
//! core properties used as document metadata.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;

use crate::error::PipelineError;

/// Maximum decompressed bytes read from a single ZIP entry.
pub const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Open the container, mapping a bad archive to `UnsupportedFormat`.
pub fn open_archive<'a>(path: &Path, bytes: &'a [u8]) -> Result<Archive<'a>, PipelineError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        PipelineError::UnsupportedFormat(format!(
            "{}: invalid or corrupted container: {}",
            path.display(),
            e
        ))
    })
}

/// Read a named entry, bounded to [`MAX_XML_ENTRY_BYTES`].
pub fn read_entry(
    path: &Path,
    archive: &mut Archive<'_>,
    name: &str,
) -> Result<Vec<u8>, PipelineError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| PipelineError::parse(path, format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| PipelineError::parse(path, format!("{}: {}", name, e)))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(PipelineError::parse(
            path,
            format!("{} exceeds size limit ({} bytes)", name, MAX_XML_ENTRY_BYTES),
        ));
    }
    Ok(out)
}

/// Parse `docProps/core.xml` into a metadata map; a missing or broken
/// part yields an empty map rather than an error.
pub fn read_core_properties(
    path: &Path,
    archive: &mut Archive<'_>,
) -> BTreeMap<String, serde_json::Value> {
    let mut metadata = BTreeMap::new();
    let xml = match read_entry(path, archive, "docProps/core.xml") {
        Ok(xml) => xml,
        Err(_) => return metadata,
    };

    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let key = match e.local_name().as_ref() {
                    b"title" => Some("title"),
                    b"creator" => Some("author"),
                    b"subject" => Some("subject"),
                    b"keywords" => Some("keywords"),
                    b"created" => Some("created"),
                    b"modified" => Some("modified"),
                    b"lastModifiedBy" => Some("last_modified_by"),
                    b"revision" => Some("revision"),
                    b"category" => Some("category"),
                    _ => None,
                };
                current = key.map(|k| k.to_string());
            }
            Ok(Event::Text(t)) => {
                if let Some(key) = current.take() {
                    let value = t.unescape().unwrap_or_default().into_owned();
                    if !value.is_empty() {
                        metadata.insert(key, serde_json::json!(value));
                    }
                }
            }
            Ok(Event::End(_)) => {
                current = None;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    metadata
}

/// List archive entries matching `prefix…suffix`, sorted by the numeric
/// middle (slide1.xml, slide2.xml, … slide10.xml).
pub fn numbered_entries(archive: &Archive<'_>, prefix: &str, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(suffix))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(suffix)
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}
