//! Ingestion orchestration: project folder → parsed, chunked,
//! embedded, classified documents.
//!
//! Files are processed sequentially; each file's parse → embed →
//! classify → persist sequence completes (commit or mark-failed) before
//! the next file begins. One file's failure is recorded against that
//! file and never aborts the batch — the run always finishes with a
//! statistics object, even if every file failed.
//!
//! Idempotence: a file whose (project, path, content hash) is already
//! indexed is skipped outright unless a re-index is forced. The content
//! hash is the only deduplication mechanism; concurrent re-ingestion of
//! the same document by two callers is an accepted race.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::SqlitePool;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::Chunker;
use crate::classify::{classify_by_keywords, detect_language};
use crate::config::Config;
use crate::error::PipelineError;
use crate::hash::content_hash;
use crate::models::{
    Document, DocumentCategory, DocumentChunk, DocumentSearchResult, DocumentStatus, FileOutcome,
    IngestError, IngestStats, ParsedContent,
};
use crate::parsers::ParserRegistry;
use crate::progress::{IngestProgressEvent, ProgressReporter};
use crate::store;
use crate::vector::{MetadataFilter, VectorIndex};

/// Always-excluded discovery patterns (VCS metadata, temp droppings).
const DEFAULT_EXCLUDES: [&str; 4] = ["**/.git/**", "**/~$*", "**/.DS_Store", "**/Thumbs.db"];

pub struct IngestOrchestrator {
    pool: SqlitePool,
    registry: Arc<ParserRegistry>,
    index: Arc<VectorIndex>,
    chunker: Chunker,
    exclude_set: GlobSet,
    follow_symlinks: bool,
}

impl IngestOrchestrator {
    pub fn new(
        pool: SqlitePool,
        registry: Arc<ParserRegistry>,
        index: Arc<VectorIndex>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_EXCLUDES {
            builder.add(Glob::new(pattern)?);
        }
        for pattern in &config.ingest.exclude_globs {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            pool,
            registry,
            index,
            chunker: Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap),
            exclude_set: builder.build()?,
            follow_symlinks: config.ingest.follow_symlinks,
        })
    }

    /// Ingest all documents from a project folder.
    pub async fn ingest(
        &self,
        project_id: &str,
        folder_path: Option<&Path>,
        force_reindex: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestStats, PipelineError> {
        let project = store::get_project(&self.pool, project_id).await?;

        let folder = folder_path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(&project.folder_path));
        if !folder.is_dir() {
            return Err(PipelineError::NotFound(folder.display().to_string()));
        }

        progress.report(IngestProgressEvent::Discovering {
            project: project_id.to_string(),
        });
        let files = self.discover_files(&folder)?;

        let mut stats = IngestStats {
            total_files: files.len(),
            ..Default::default()
        };

        store::set_project_status(&self.pool, project_id, "ingesting").await?;

        for (i, file) in files.iter().enumerate() {
            let outcome = match self.process_file(project_id, file, force_reindex).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "file failed during ingest");
                    stats.errors.push(IngestError {
                        file: file.display().to_string(),
                        error: e.to_string(),
                    });
                    FileOutcome::Failed
                }
            };

            match outcome {
                FileOutcome::Indexed => stats.indexed += 1,
                FileOutcome::Skipped => stats.skipped += 1,
                FileOutcome::Failed => stats.failed += 1,
            }
            stats.processed += 1;

            progress.report(IngestProgressEvent::FileDone {
                project: project_id.to_string(),
                file: file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                status: outcome.as_str(),
                n: (i + 1) as u64,
                total: files.len() as u64,
            });
        }

        store::update_project_counts(
            &self.pool,
            project_id,
            stats.total_files,
            stats.indexed,
            stats.failed,
        )
        .await?;
        store::set_project_status(&self.pool, project_id, "ready").await?;

        tracing::info!(
            project = project_id,
            total = stats.total_files,
            indexed = stats.indexed,
            skipped = stats.skipped,
            failed = stats.failed,
            "ingest run finished"
        );

        Ok(stats)
    }

    /// Walk the folder and return candidate files in sorted order.
    /// Every regular file is a candidate — unsupported extensions are
    /// reported as failed during processing rather than silently
    /// dropped here.
    fn discover_files(&self, folder: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let mut files = Vec::new();

        let walker = WalkDir::new(folder).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(folder).unwrap_or(path);
            if self.exclude_set.is_match(relative) {
                continue;
            }
            files.push(path.to_path_buf());
        }

        files.sort();
        Ok(files)
    }

    /// Process a single file end to end.
    async fn process_file(
        &self,
        project_id: &str,
        path: &Path,
        force_reindex: bool,
    ) -> Result<FileOutcome, PipelineError> {
        let hash = content_hash(path)?;

        if !force_reindex
            && store::is_indexed(&self.pool, project_id, &path.display().to_string(), &hash)
                .await?
        {
            tracing::debug!(file = %path.display(), "unchanged, skipping");
            return Ok(FileOutcome::Skipped);
        }

        self.registry.validate_file(path)?;
        let parser = self.registry.get(path).ok_or_else(|| {
            PipelineError::UnsupportedFormat(path.display().to_string())
        })?;

        let doc_id = match store::find_document_id_by_path(
            &self.pool,
            project_id,
            &path.display().to_string(),
        )
        .await?
        {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let parsed = match parser.parse(path).await {
            Ok(parsed) => parsed,
            Err(e) => {
                // Record the failure on the document row, then let the
                // batch loop capture the error.
                let mut failed =
                    self.new_document(&doc_id, project_id, path, &hash, DocumentStatus::Failed);
                failed.error_message = Some(e.to_string());
                store::upsert_document(&self.pool, &failed).await?;
                return Err(e);
            }
        };

        for warning in &parsed.warnings {
            tracing::warn!(file = %path.display(), warning = %warning, "parser warning");
        }

        if !parsed.has_content() {
            let mut doc =
                self.new_document(&doc_id, project_id, path, &hash, DocumentStatus::Skipped);
            doc.error_message = Some("no extractable content".to_string());
            store::upsert_document(&self.pool, &doc).await?;
            return Ok(FileOutcome::Skipped);
        }

        let mut doc = self.new_document(&doc_id, project_id, path, &hash, DocumentStatus::Processing);
        doc.extracted_text = Some(parsed.text.clone());
        doc.page_count = parsed.page_count.map(|n| n as i64);
        doc.metadata = serde_json::json!(parsed.metadata);
        doc.processing_time_ms = parsed.processing_time_ms.map(|ms| ms as i64);
        doc.category = classify_by_keywords(&parsed.text);
        doc.language = Some(detect_language(&parsed.text).to_string());
        store::upsert_document(&self.pool, &doc).await?;

        match self.chunk_and_embed(&mut doc, &parsed).await {
            Ok(chunk_count) if chunk_count > 0 => {
                doc.status = DocumentStatus::Indexed;
                doc.indexed_at = Some(Utc::now());
                store::upsert_document(&self.pool, &doc).await?;
                Ok(FileOutcome::Indexed)
            }
            Ok(_) => {
                // Text was non-empty but produced no chunks; never
                // report such a document as indexed.
                store::set_document_status(
                    &self.pool,
                    &doc.id,
                    DocumentStatus::Skipped,
                    Some("no chunks produced"),
                )
                .await?;
                Ok(FileOutcome::Skipped)
            }
            Err(e) => {
                store::set_document_status(
                    &self.pool,
                    &doc.id,
                    DocumentStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                Err(e)
            }
        }
    }

    fn new_document(
        &self,
        id: &str,
        project_id: &str,
        path: &Path,
        hash: &str,
        status: DocumentStatus,
    ) -> Document {
        Document {
            id: id.to_string(),
            project_id: project_id.to_string(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            file_path: path.display().to_string(),
            file_type: path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            file_size: std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0),
            content_hash: hash.to_string(),
            status,
            error_message: None,
            processing_time_ms: None,
            extracted_text: None,
            page_count: None,
            metadata: serde_json::json!({}),
            category: DocumentCategory::General,
            category_confidence: None,
            language: None,
            version: 1,
            is_superseded: false,
            superseded_by_id: None,
            vector_ids: Vec::new(),
            indexed_at: None,
        }
    }

    /// Chunk the document text, purge its old vectors, embed and store
    /// the new chunks. Returns the chunk count.
    async fn chunk_and_embed(
        &self,
        doc: &mut Document,
        parsed: &ParsedContent,
    ) -> Result<usize, PipelineError> {
        // Purge the document's previous chunks before re-embedding.
        self.index
            .delete_by_filter(&MetadataFilter::new().must("document_id", doc.id.as_str()))
            .await
            .map_err(|e| PipelineError::VectorIndex(e.to_string()))?;

        let spans = self.chunker.chunk(parsed);
        if spans.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        let metadatas: Vec<serde_json::Value> = spans
            .iter()
            .map(|s| {
                serde_json::json!({
                    "document_id": doc.id,
                    "project_id": doc.project_id,
                    "filename": doc.filename,
                    "chunk_index": s.index,
                    "page_number": s.page_number,
                    "category": doc.category.as_str(),
                })
            })
            .collect();

        let vector_ids = self
            .index
            .add_texts(&texts, &metadatas, None)
            .await
            .map_err(|e| PipelineError::VectorIndex(e.to_string()))?;

        let chunks: Vec<DocumentChunk> = spans
            .iter()
            .zip(vector_ids.iter())
            .map(|(span, vector_id)| DocumentChunk {
                id: Uuid::new_v4().to_string(),
                document_id: doc.id.clone(),
                chunk_index: span.index as i64,
                chunk_text: span.text.clone(),
                char_start: span.char_start as i64,
                char_end: span.char_end as i64,
                page_number: span.page_number,
                vector_id: Some(vector_id.clone()),
                metadata: serde_json::json!({
                    "project_id": doc.project_id,
                    "filename": doc.filename,
                    "category": doc.category.as_str(),
                }),
            })
            .collect();

        store::replace_chunks(&self.pool, &doc.id, &chunks).await?;
        doc.vector_ids = vector_ids;

        Ok(chunks.len())
    }

    /// Semantic search across indexed chunks, optionally scoped to a
    /// project and categories. Filters are equality conjunctions, so a
    /// multi-category request runs one search per category and merges.
    pub async fn search(
        &self,
        query: &str,
        project_id: Option<&str>,
        categories: &[DocumentCategory],
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<DocumentSearchResult>, PipelineError> {
        let base_filter = |category: Option<&DocumentCategory>| {
            let mut filter = MetadataFilter::new();
            if let Some(project) = project_id {
                filter = filter.must("project_id", project);
            }
            if let Some(category) = category {
                filter = filter.must("category", category.as_str());
            }
            filter
        };

        let mut hits = if categories.is_empty() {
            self.index
                .search(query, &base_filter(None), limit, min_score)
                .await
                .map_err(|e| PipelineError::VectorIndex(e.to_string()))?
        } else {
            let mut merged = Vec::new();
            for category in categories {
                let filter = base_filter(Some(category));
                let category_hits = self
                    .index
                    .search(query, &filter, limit, min_score)
                    .await
                    .map_err(|e| PipelineError::VectorIndex(e.to_string()))?;
                for hit in category_hits {
                    if !merged.iter().any(|h: &crate::models::SearchHit| h.id == hit.id) {
                        merged.push(hit);
                    }
                }
            }
            merged.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            merged.truncate(limit);
            merged
        };

        hits.truncate(limit);
        Ok(hits
            .into_iter()
            .map(|hit| DocumentSearchResult {
                document_id: hit.metadata["document_id"].as_str().map(String::from),
                filename: hit.metadata["filename"].as_str().map(String::from),
                chunk_text: hit.text,
                page_number: hit.metadata["page_number"].as_i64(),
                score: hit.score,
                metadata: hit.metadata,
            })
            .collect())
    }
}
