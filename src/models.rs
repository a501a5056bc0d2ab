//! Core data models for the ingestion and extraction pipeline.
//!
//! These types represent the documents, chunks, and extraction results
//! that flow from the project folder through parsing, embedding, and
//! LLM-backed extraction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing lifecycle of a document.
///
/// A document transitions `Pending → Processing → {Indexed|Failed}`.
/// `Indexed` requires non-empty extracted text and at least one chunk;
/// a source with no extractable content ends up `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Indexed,
    Failed,
    Skipped,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => DocumentStatus::Processing,
            "indexed" => DocumentStatus::Indexed,
            "failed" => DocumentStatus::Failed,
            "skipped" => DocumentStatus::Skipped,
            _ => DocumentStatus::Pending,
        }
    }
}

/// Closed classification category for tender documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    /// Invitation to Tender, Instructions to Bidders, RFP.
    Itt,
    /// Technical specifications and requirements.
    Specs,
    /// Bill of Quantities, schedules of rates, pricing schedules.
    Boq,
    /// Architectural/engineering drawings and plans.
    Drawings,
    /// Contract documents, agreements, terms.
    Contract,
    /// Addenda, amendments, revisions.
    Addendum,
    /// Letters, emails, communications.
    Correspondence,
    /// Project schedule, programme, timeline.
    Schedule,
    /// Health, Safety, Environment documents.
    Hse,
    /// Anything else.
    General,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Itt => "itt",
            DocumentCategory::Specs => "specs",
            DocumentCategory::Boq => "boq",
            DocumentCategory::Drawings => "drawings",
            DocumentCategory::Contract => "contract",
            DocumentCategory::Addendum => "addendum",
            DocumentCategory::Correspondence => "correspondence",
            DocumentCategory::Schedule => "schedule",
            DocumentCategory::Hse => "hse",
            DocumentCategory::General => "general",
        }
    }

    /// Parse a category label, coercing anything out of the enumeration
    /// to [`DocumentCategory::General`] rather than rejecting it.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "itt" => DocumentCategory::Itt,
            "specs" => DocumentCategory::Specs,
            "boq" => DocumentCategory::Boq,
            "drawings" => DocumentCategory::Drawings,
            "contract" => DocumentCategory::Contract,
            "addendum" => DocumentCategory::Addendum,
            "correspondence" => DocumentCategory::Correspondence,
            "schedule" => DocumentCategory::Schedule,
            "hse" => DocumentCategory::Hse,
            _ => DocumentCategory::General,
        }
    }
}

/// A source document tracked through the pipeline.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub filename: String,
    pub file_path: String,
    /// Declared type, derived from the extension (e.g. `pdf`, `docx`).
    pub file_type: String,
    pub file_size: i64,
    /// Lowercase hex SHA-256 digest of the file bytes.
    pub content_hash: String,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub extracted_text: Option<String>,
    pub page_count: Option<i64>,
    pub metadata: serde_json::Value,
    pub category: DocumentCategory,
    pub category_confidence: Option<f64>,
    pub language: Option<String>,
    pub version: i64,
    pub is_superseded: bool,
    pub superseded_by_id: Option<String>,
    /// Opaque vector-store point identifiers for this document's chunks.
    pub vector_ids: Vec<String>,
    pub indexed_at: Option<DateTime<Utc>>,
}

/// A bounded, page-attributed slice of a document's text — the unit of
/// embedding and retrieval.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub char_start: i64,
    pub char_end: i64,
    pub page_number: Option<i64>,
    pub vector_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Transient result of parsing one file. Produced by a parser, consumed
/// immediately by the orchestrator, then discarded.
#[derive(Debug, Clone, Default)]
pub struct ParsedContent {
    pub text: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Per-page text aligned with `[Page N]` markers in `text`.
    pub pages: Option<Vec<String>>,
    pub tables: Option<Vec<ExtractedTable>>,
    pub language: Option<String>,
    pub page_count: Option<usize>,
    pub processing_time_ms: Option<u64>,
    pub warnings: Vec<String>,
}

impl ParsedContent {
    /// True if any non-whitespace text was extracted.
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A table extracted from a document, kept alongside its flattened text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// Where the table came from: a page, sheet name, or slide number.
    pub origin: String,
    pub rows: Vec<Vec<String>>,
}

/// A hit returned by the search entry point.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// A document-level search result as exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSearchResult {
    pub document_id: Option<String>,
    pub filename: Option<String>,
    pub chunk_text: String,
    pub page_number: Option<i64>,
    pub score: f64,
    pub metadata: serde_json::Value,
}

/// Aggregate outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub total_files: usize,
    pub processed: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<IngestError>,
}

/// One failed file within a batch.
#[derive(Debug, Clone, Serialize)]
pub struct IngestError {
    pub file: String,
    pub error: String,
}

/// Per-file outcome inside a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed,
    Skipped,
    Failed,
}

impl FileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOutcome::Indexed => "indexed",
            FileOutcome::Skipped => "skipped",
            FileOutcome::Failed => "failed",
        }
    }
}

/// An evidence citation justifying an extracted field's value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub document: String,
    #[serde(default)]
    pub page: Option<serde_json::Value>,
    #[serde(default)]
    pub snippet: String,
}

/// One extracted summary field with confidence and evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: serde_json::Value,
    pub confidence: f64,
    pub evidence: Vec<Citation>,
    /// True iff `confidence` is below the configured review threshold.
    pub requires_review: bool,
    /// Present on date-like fields: whether the value parsed to ISO form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<bool>,
}

/// One generated requirement in a project checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: i64,
    pub category: String,
    pub requirement: String,
    pub description: String,
    pub mandatory: bool,
    pub source_document: Option<String>,
    pub source_reference: Option<String>,
    pub responsible_party: Option<String>,
    pub deadline: Option<String>,
    pub deliverable: Option<String>,
    pub status: String,
    pub notes: Option<String>,
}

/// Result of LLM-assisted document classification.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub document_id: String,
    pub category: DocumentCategory,
    pub confidence: f64,
    pub reasoning: String,
}

/// Answer produced by context-grounded Q&A.
#[derive(Debug, Clone, Serialize)]
pub struct GroundedAnswer {
    pub answer: String,
    pub sources: Vec<AnswerSource>,
    /// Mean retrieval score of the chunks used; 0.0 when nothing matched.
    pub confidence: f64,
}

/// One source chunk cited by a grounded answer.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerSource {
    pub document: Option<String>,
    pub page: Option<i64>,
    pub score: f64,
}

/// A key date pulled out of the project documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDate {
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub source_document: Option<String>,
    #[serde(default)]
    pub source_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_coerces_unknown_to_general() {
        assert_eq!(DocumentCategory::parse("ITT"), DocumentCategory::Itt);
        assert_eq!(DocumentCategory::parse("hse"), DocumentCategory::Hse);
        assert_eq!(
            DocumentCategory::parse("blueprints"),
            DocumentCategory::General
        );
        assert_eq!(DocumentCategory::parse(""), DocumentCategory::General);
    }

    #[test]
    fn status_round_trip() {
        for s in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Indexed,
            DocumentStatus::Failed,
            DocumentStatus::Skipped,
        ] {
            assert_eq!(DocumentStatus::parse(s.as_str()), s);
        }
    }

    #[test]
    fn parsed_content_detects_blank_text() {
        let mut parsed = ParsedContent::default();
        assert!(!parsed.has_content());
        parsed.text = "  \n\t ".to_string();
        assert!(!parsed.has_content());
        parsed.text = "tender".to_string();
        assert!(parsed.has_content());
    }
}
