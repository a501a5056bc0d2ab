//! LLM-backed extraction: project summaries, requirement checklists,
//! document classification, grounded Q&A, and key-date extraction.
//!
//! Every generative workflow follows one shape: gather and prioritize
//! source documents, truncate deterministically, build a single prompt
//! with a fixed instruction/schema block, call the router for
//! strictly-structured JSON, then parse-and-validate into the domain
//! shape before persisting. Malformed responses surface as typed
//! failures; only the field-level coercions below are silent.
//!
//! Review policy: any field or classification whose confidence is
//! below the review threshold is flagged `requires_review` in the
//! persisted output itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

use crate::config::ExtractionConfig;
use crate::error::PipelineError;
use crate::llm::{LlmRouter, ModelTier};
use crate::models::{
    AnswerSource, ChecklistItem, Citation, ClassificationResult, Document, DocumentCategory,
    ExtractedField, GroundedAnswer, KeyDate,
};
use crate::prompts::{
    build_checklist_prompt, build_classification_prompt, build_date_prompt, build_qa_prompt,
    build_summary_prompt, truncate_content, DocContext, CHECKLIST_CATEGORIES, DATE_QUERIES,
    SUMMARY_FIELDS,
};
use crate::store;
use crate::vector::{MetadataFilter, VectorIndex};

/// Date formats tried, in order, when normalizing date-like fields.
const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Answer returned when retrieval finds nothing above the score
/// threshold.
const NOT_FOUND_ANSWER: &str = "I couldn't find relevant information in the project documents.";

pub struct ExtractionEngine {
    pool: SqlitePool,
    index: Arc<VectorIndex>,
    router: Arc<LlmRouter>,
    config: ExtractionConfig,
}

impl ExtractionEngine {
    pub fn new(
        pool: SqlitePool,
        index: Arc<VectorIndex>,
        router: Arc<LlmRouter>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            pool,
            index,
            router,
            config,
        }
    }

    // ============ Summary extraction ============

    /// Extract the structured project summary with evidence citations.
    /// Returns the cached summary unless `force_refresh`.
    pub async fn extract_summary(
        &self,
        project_id: &str,
        force_refresh: bool,
    ) -> Result<BTreeMap<String, ExtractedField>, PipelineError> {
        let project = store::get_project(&self.pool, project_id).await?;

        if !force_refresh {
            if let Some(cached) = project.summary {
                if let Ok(summary) = serde_json::from_value(cached) {
                    return Ok(summary);
                }
            }
        }

        let priorities = [
            DocumentCategory::Itt,
            DocumentCategory::Contract,
            DocumentCategory::Specs,
            DocumentCategory::Addendum,
        ];
        let documents = self.documents_by_priority(project_id, &priorities).await?;
        let contexts =
            doc_contexts(&documents, self.config.max_summary_docs, self.config.summary_char_budget);

        let prompt = build_summary_prompt(&contexts);
        let raw = self
            .router
            .generate_json(&prompt, "summary_extraction", ModelTier::Auto)
            .await?;

        let summary = validate_summary(&raw, self.config.review_threshold);

        let summary_json = serde_json::to_value(&summary)
            .map_err(|e| PipelineError::SchemaViolation(e.to_string()))?;
        store::save_summary(&self.pool, project_id, &summary_json).await?;

        Ok(summary)
    }

    /// Indexed documents sorted by category priority; unprioritized
    /// categories sort last, input order otherwise preserved.
    async fn documents_by_priority(
        &self,
        project_id: &str,
        priorities: &[DocumentCategory],
    ) -> Result<Vec<Document>, PipelineError> {
        let mut documents = store::indexed_documents(&self.pool, project_id).await?;
        if documents.is_empty() {
            return Err(PipelineError::NotFound(format!(
                "no indexed documents for project {}",
                project_id
            )));
        }
        documents.sort_by_key(|doc| {
            priorities
                .iter()
                .position(|p| *p == doc.category)
                .unwrap_or(priorities.len())
        });
        Ok(documents)
    }

    // ============ Checklist generation ============

    /// Generate the requirements checklist. Returns the cached list
    /// unless `force_refresh`.
    pub async fn generate_checklist(
        &self,
        project_id: &str,
        force_refresh: bool,
    ) -> Result<Vec<ChecklistItem>, PipelineError> {
        let project = store::get_project(&self.pool, project_id).await?;

        if !force_refresh {
            if let Some(cached) = project.checklist {
                if let Ok(checklist) = serde_json::from_value(cached) {
                    return Ok(checklist);
                }
            }
        }

        let priorities = [
            DocumentCategory::Itt,
            DocumentCategory::Contract,
            DocumentCategory::Specs,
            DocumentCategory::Hse,
        ];
        let documents = self.documents_by_priority(project_id, &priorities).await?;
        let contexts = doc_contexts(
            &documents,
            self.config.max_checklist_docs,
            self.config.checklist_char_budget,
        );

        let prompt = build_checklist_prompt(&contexts);
        let raw = self
            .router
            .generate_json(&prompt, "checklist_generation", ModelTier::Auto)
            .await?;

        let requirements = raw
            .get("requirements")
            .and_then(|r| r.as_array())
            .cloned()
            .ok_or_else(|| {
                PipelineError::SchemaViolation("response missing requirements array".to_string())
            })?;

        let checklist = validate_checklist(&requirements);

        let checklist_json = serde_json::to_value(&checklist)
            .map_err(|e| PipelineError::SchemaViolation(e.to_string()))?;
        store::save_checklist(&self.pool, project_id, &checklist_json).await?;

        Ok(checklist)
    }

    // ============ Classification ============

    /// LLM-assisted classification of one document; persists the
    /// category and its confidence.
    pub async fn classify_document(
        &self,
        document_id: &str,
    ) -> Result<ClassificationResult, PipelineError> {
        let document = store::get_document(&self.pool, document_id).await?;
        let content = document.extracted_text.as_deref().unwrap_or("");

        let prompt = build_classification_prompt(&document.filename, content);
        let raw = self
            .router
            .generate_json(&prompt, "classification", ModelTier::Auto)
            .await?;

        // Out-of-enumeration answers coerce to the fallback category.
        let category = raw
            .get("category")
            .and_then(|c| c.as_str())
            .map(DocumentCategory::parse)
            .unwrap_or(DocumentCategory::General);
        let confidence = raw.get("confidence").and_then(|c| c.as_f64()).unwrap_or(0.5);
        let reasoning = raw
            .get("reasoning")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();

        store::set_document_category(&self.pool, document_id, category, Some(confidence)).await?;

        Ok(ClassificationResult {
            document_id: document_id.to_string(),
            category,
            confidence,
            reasoning,
        })
    }

    // ============ Grounded Q&A ============

    /// Answer a question strictly from retrieved chunks, citing
    /// sources. Zero retrieved chunks short-circuits to a fixed
    /// not-found answer without calling the LLM.
    pub async fn search_with_context(
        &self,
        query: &str,
        project_id: &str,
        top_k: usize,
    ) -> Result<GroundedAnswer, PipelineError> {
        let filter = MetadataFilter::new().must("project_id", project_id);
        let hits = self
            .index
            .search(query, &filter, top_k, self.config.min_score)
            .await
            .map_err(|e| PipelineError::VectorIndex(e.to_string()))?;

        if hits.is_empty() {
            return Ok(GroundedAnswer {
                answer: NOT_FOUND_ANSWER.to_string(),
                sources: Vec::new(),
                confidence: 0.0,
            });
        }

        let contexts: Vec<(String, Option<i64>, String)> = hits
            .iter()
            .map(|hit| {
                (
                    hit.metadata["filename"].as_str().unwrap_or("Unknown").to_string(),
                    hit.metadata["page_number"].as_i64(),
                    hit.text.clone(),
                )
            })
            .collect();
        let sources: Vec<AnswerSource> = hits
            .iter()
            .map(|hit| AnswerSource {
                document: hit.metadata["filename"].as_str().map(String::from),
                page: hit.metadata["page_number"].as_i64(),
                score: hit.score,
            })
            .collect();

        let prompt = build_qa_prompt(query, &contexts);
        let answer = self
            .router
            .generate(&prompt, "document_understanding", ModelTier::Auto, false)
            .await?;

        let confidence = sources.iter().map(|s| s.score).sum::<f64>() / sources.len() as f64;

        Ok(GroundedAnswer {
            answer: answer.trim().to_string(),
            sources,
            confidence,
        })
    }

    // ============ Key dates ============

    /// Run the fixed semantic queries and extract dated events from the
    /// matching chunks, deduplicated by (date, type).
    pub async fn extract_key_dates(
        &self,
        project_id: &str,
    ) -> Result<Vec<KeyDate>, PipelineError> {
        let filter = MetadataFilter::new().must("project_id", project_id);
        let mut all_dates: Vec<KeyDate> = Vec::new();

        for query in DATE_QUERIES {
            let hits = self
                .index
                .search(query, &filter, 3, 0.6)
                .await
                .map_err(|e| PipelineError::VectorIndex(e.to_string()))?;

            for hit in hits {
                let prompt = build_date_prompt(&hit.text);
                let raw = match self
                    .router
                    .generate_json(&prompt, "entity_extraction", ModelTier::Auto)
                    .await
                {
                    Ok(raw) => raw,
                    Err(e) => {
                        // One bad chunk must not sink the whole sweep.
                        tracing::warn!(query, error = %e, "date extraction failed for chunk");
                        continue;
                    }
                };

                let dates = raw.get("dates").and_then(|d| d.as_array()).cloned().unwrap_or_default();
                for date_value in dates {
                    if let Ok(mut date) = serde_json::from_value::<KeyDate>(date_value) {
                        date.source_document =
                            hit.metadata["filename"].as_str().map(String::from);
                        date.source_page = hit.metadata["page_number"].as_i64();
                        all_dates.push(date);
                    }
                }
            }
        }

        Ok(dedup_dates(all_dates))
    }
}

/// Build prompt contexts from the top documents under a char budget.
fn doc_contexts(documents: &[Document], max_docs: usize, char_budget: usize) -> Vec<DocContext> {
    documents
        .iter()
        .take(max_docs)
        .map(|doc| DocContext {
            filename: doc.filename.clone(),
            content: truncate_content(doc.extracted_text.as_deref().unwrap_or(""), char_budget),
            category: doc.category.as_str().to_string(),
        })
        .collect()
}

/// Normalize the raw summary response: every requested field comes out
/// as `{value, confidence, evidence[], requires_review}`, with missing
/// or malformed fields coerced to `{null, 0.0, []}` and date-like
/// fields run through the format ladder.
pub fn validate_summary(
    raw: &serde_json::Value,
    review_threshold: f64,
) -> BTreeMap<String, ExtractedField> {
    let mut validated = BTreeMap::new();

    for field_name in SUMMARY_FIELDS {
        let field_data = raw.get(field_name);

        let mut field = match field_data {
            Some(serde_json::Value::Object(obj)) => {
                let confidence = obj
                    .get("confidence")
                    .and_then(|c| c.as_f64())
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0);
                let evidence: Vec<Citation> = obj
                    .get("evidence")
                    .and_then(|e| e.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| serde_json::from_value(item.clone()).ok())
                            .collect()
                    })
                    .unwrap_or_default();
                ExtractedField {
                    value: obj.get("value").cloned().unwrap_or(serde_json::Value::Null),
                    confidence,
                    evidence,
                    requires_review: false,
                    parsed: None,
                }
            }
            // A bare scalar still counts, at reduced confidence.
            Some(value) if !value.is_null() => ExtractedField {
                value: value.clone(),
                confidence: 0.5,
                evidence: Vec::new(),
                requires_review: false,
                parsed: None,
            },
            _ => ExtractedField {
                value: serde_json::Value::Null,
                confidence: 0.0,
                evidence: Vec::new(),
                requires_review: false,
                parsed: None,
            },
        };

        field.requires_review = field.confidence < review_threshold;

        if field_name.contains("date") || field_name.contains("deadline") {
            parse_date_field(&mut field);
        }

        validated.insert(field_name.to_string(), field);
    }

    validated
}

/// Try the date format ladder; on success the value becomes canonical
/// ISO and `parsed` is true, on failure the original string is kept
/// with `parsed` false. Failure is intentional ambiguity, never an
/// error.
fn parse_date_field(field: &mut ExtractedField) {
    let value = match field.value.as_str() {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return,
    };

    for format in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&value, format) {
            field.value = serde_json::json!(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
            field.parsed = Some(true);
            return;
        }
        if let Ok(date) = NaiveDate::parse_from_str(&value, format) {
            let dt = date.and_hms_opt(0, 0, 0).unwrap_or_default();
            field.value = serde_json::json!(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
            field.parsed = Some(true);
            return;
        }
    }

    field.parsed = Some(false);
}

/// Standardize raw checklist items: unknown categories coerce to
/// GENERAL, `mandatory` defaults true, `status` starts `open`.
pub fn validate_checklist(requirements: &[serde_json::Value]) -> Vec<ChecklistItem> {
    let mut validated = Vec::new();

    for (i, req) in requirements.iter().enumerate() {
        let obj = match req.as_object() {
            Some(obj) => obj,
            None => continue,
        };

        let category = obj
            .get("category")
            .and_then(|c| c.as_str())
            .unwrap_or("GENERAL")
            .to_uppercase();
        let category = if CHECKLIST_CATEGORIES.contains(&category.as_str()) {
            category
        } else {
            "GENERAL".to_string()
        };

        let opt_str = |key: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };

        validated.push(ChecklistItem {
            id: obj.get("id").and_then(|v| v.as_i64()).unwrap_or(i as i64 + 1),
            category,
            requirement: opt_str("requirement").unwrap_or_default(),
            description: opt_str("description").unwrap_or_default(),
            mandatory: obj.get("mandatory").and_then(|v| v.as_bool()).unwrap_or(true),
            source_document: opt_str("source_document"),
            source_reference: opt_str("source_reference"),
            responsible_party: opt_str("responsible_party"),
            deadline: opt_str("deadline"),
            deliverable: opt_str("deliverable"),
            status: "open".to_string(),
            notes: None,
        });
    }

    validated
}

/// Deduplicate extracted dates by (date, type), keeping first
/// occurrence order.
fn dedup_dates(dates: Vec<KeyDate>) -> Vec<KeyDate> {
    let mut seen = std::collections::HashSet::new();
    dates
        .into_iter()
        .filter(|d| seen.insert((d.date.clone(), d.kind.clone())))
        .collect()
}
