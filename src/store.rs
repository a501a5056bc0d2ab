//! SQLite persistence for projects, documents, and chunks.
//!
//! The business CRUD around projects lives elsewhere; this module only
//! stores what the pipeline itself produces and reads back: document
//! records with their processing state, chunk rows with vector ids, and
//! the project-level summary/checklist blobs.

use chrono::{TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::PipelineError;
use crate::models::{Document, DocumentCategory, DocumentChunk, DocumentStatus};

/// A project row as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub folder_path: String,
    pub status: String,
    pub summary: Option<serde_json::Value>,
    pub checklist: Option<serde_json::Value>,
}

pub async fn create_project(
    pool: &SqlitePool,
    name: &str,
    folder_path: &str,
) -> Result<String, PipelineError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO projects (id, name, folder_path, status, created_at, updated_at) \
         VALUES (?, ?, ?, 'draft', ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(folder_path)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn get_project(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Project, PipelineError> {
    let row = sqlx::query(
        "SELECT id, name, folder_path, status, summary_json, checklist_json \
         FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| PipelineError::NotFound(format!("project {}", project_id)))?;

    Ok(Project {
        id: row.get("id"),
        name: row.get("name"),
        folder_path: row.get("folder_path"),
        status: row.get("status"),
        summary: row
            .get::<Option<String>, _>("summary_json")
            .and_then(|s| serde_json::from_str(&s).ok()),
        checklist: row
            .get::<Option<String>, _>("checklist_json")
            .and_then(|s| serde_json::from_str(&s).ok()),
    })
}

pub async fn set_project_status(
    pool: &SqlitePool,
    project_id: &str,
    status: &str,
) -> Result<(), PipelineError> {
    sqlx::query("UPDATE projects SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(Utc::now().timestamp())
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_project_counts(
    pool: &SqlitePool,
    project_id: &str,
    total: usize,
    indexed: usize,
    failed: usize,
) -> Result<(), PipelineError> {
    sqlx::query(
        "UPDATE projects SET total_documents = ?, indexed_documents = ?, \
         failed_documents = ?, updated_at = ? WHERE id = ?",
    )
    .bind(total as i64)
    .bind(indexed as i64)
    .bind(failed as i64)
    .bind(Utc::now().timestamp())
    .bind(project_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn save_summary(
    pool: &SqlitePool,
    project_id: &str,
    summary: &serde_json::Value,
) -> Result<(), PipelineError> {
    sqlx::query("UPDATE projects SET summary_json = ?, status = 'ready', updated_at = ? WHERE id = ?")
        .bind(summary.to_string())
        .bind(Utc::now().timestamp())
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn save_checklist(
    pool: &SqlitePool,
    project_id: &str,
    checklist: &serde_json::Value,
) -> Result<(), PipelineError> {
    sqlx::query("UPDATE projects SET checklist_json = ?, updated_at = ? WHERE id = ?")
        .bind(checklist.to_string())
        .bind(Utc::now().timestamp())
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        project_id: row.get("project_id"),
        filename: row.get("filename"),
        file_path: row.get("file_path"),
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        content_hash: row.get("content_hash"),
        status: DocumentStatus::parse(row.get::<String, _>("status").as_str()),
        error_message: row.get("error_message"),
        processing_time_ms: row.get("processing_time_ms"),
        extracted_text: row.get("extracted_text"),
        page_count: row.get("page_count"),
        metadata: serde_json::from_str(row.get::<String, _>("metadata_json").as_str())
            .unwrap_or_default(),
        category: DocumentCategory::parse(row.get::<String, _>("category").as_str()),
        category_confidence: row.get("category_confidence"),
        language: row.get("language"),
        version: row.get("version"),
        is_superseded: row.get::<i64, _>("is_superseded") != 0,
        superseded_by_id: row.get("superseded_by_id"),
        vector_ids: serde_json::from_str(row.get::<String, _>("vector_ids_json").as_str())
            .unwrap_or_default(),
        indexed_at: row
            .get::<Option<i64>, _>("indexed_at")
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
    }
}

pub async fn get_document(
    pool: &SqlitePool,
    document_id: &str,
) -> Result<Document, PipelineError> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(document_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("document {}", document_id)))?;
    Ok(row_to_document(&row))
}

/// Idempotency check: is this exact file content already indexed for
/// the project?
pub async fn is_indexed(
    pool: &SqlitePool,
    project_id: &str,
    file_path: &str,
    content_hash: &str,
) -> Result<bool, PipelineError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM documents \
         WHERE project_id = ? AND file_path = ? AND content_hash = ? AND status = 'indexed'",
    )
    .bind(project_id)
    .bind(file_path)
    .bind(content_hash)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn find_document_id_by_path(
    pool: &SqlitePool,
    project_id: &str,
    file_path: &str,
) -> Result<Option<String>, PipelineError> {
    let id = sqlx::query_scalar("SELECT id FROM documents WHERE project_id = ? AND file_path = ?")
        .bind(project_id)
        .bind(file_path)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Insert or update a document row keyed on (project, path). A
/// re-ingested path keeps its id and bumps the version counter.
pub async fn upsert_document(pool: &SqlitePool, doc: &Document) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
        INSERT INTO documents (
            id, project_id, filename, file_path, file_type, file_size, content_hash,
            status, error_message, processing_time_ms, extracted_text, page_count,
            metadata_json, category, category_confidence, language, version,
            is_superseded, superseded_by_id, vector_ids_json, indexed_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(project_id, file_path) DO UPDATE SET
            file_type = excluded.file_type,
            file_size = excluded.file_size,
            content_hash = excluded.content_hash,
            status = excluded.status,
            error_message = excluded.error_message,
            processing_time_ms = excluded.processing_time_ms,
            extracted_text = excluded.extracted_text,
            page_count = excluded.page_count,
            metadata_json = excluded.metadata_json,
            category = excluded.category,
            category_confidence = excluded.category_confidence,
            language = excluded.language,
            version = CASE
                WHEN documents.content_hash = excluded.content_hash THEN documents.version
                ELSE documents.version + 1
            END,
            vector_ids_json = excluded.vector_ids_json,
            indexed_at = excluded.indexed_at
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.project_id)
    .bind(&doc.filename)
    .bind(&doc.file_path)
    .bind(&doc.file_type)
    .bind(doc.file_size)
    .bind(&doc.content_hash)
    .bind(doc.status.as_str())
    .bind(&doc.error_message)
    .bind(doc.processing_time_ms)
    .bind(&doc.extracted_text)
    .bind(doc.page_count)
    .bind(doc.metadata.to_string())
    .bind(doc.category.as_str())
    .bind(doc.category_confidence)
    .bind(&doc.language)
    .bind(doc.version)
    .bind(doc.is_superseded as i64)
    .bind(&doc.superseded_by_id)
    .bind(serde_json::json!(doc.vector_ids).to_string())
    .bind(doc.indexed_at.map(|dt| dt.timestamp()))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_document_status(
    pool: &SqlitePool,
    document_id: &str,
    status: DocumentStatus,
    error_message: Option<&str>,
) -> Result<(), PipelineError> {
    sqlx::query("UPDATE documents SET status = ?, error_message = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(error_message)
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_document_category(
    pool: &SqlitePool,
    document_id: &str,
    category: DocumentCategory,
    confidence: Option<f64>,
) -> Result<(), PipelineError> {
    sqlx::query("UPDATE documents SET category = ?, category_confidence = ? WHERE id = ?")
        .bind(category.as_str())
        .bind(confidence)
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark an older document superseded by a newer one (addenda handling).
pub async fn mark_superseded(
    pool: &SqlitePool,
    old_document_id: &str,
    new_document_id: &str,
) -> Result<(), PipelineError> {
    sqlx::query("UPDATE documents SET is_superseded = 1, superseded_by_id = ? WHERE id = ?")
        .bind(new_document_id)
        .bind(old_document_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// All indexed documents of a project.
pub async fn indexed_documents(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<Document>, PipelineError> {
    let rows = sqlx::query("SELECT * FROM documents WHERE project_id = ? AND status = 'indexed'")
        .bind(project_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_document).collect())
}

/// Replace all chunk rows for a document.
pub async fn replace_chunks(
    pool: &SqlitePool,
    document_id: &str,
    chunks: &[DocumentChunk],
) -> Result<(), PipelineError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        sqlx::query(
            "INSERT INTO document_chunks \
             (id, document_id, chunk_index, chunk_text, char_start, char_end, page_number, vector_id, metadata_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.chunk_text)
        .bind(chunk.char_start)
        .bind(chunk.char_end)
        .bind(chunk.page_number)
        .bind(&chunk.vector_id)
        .bind(chunk.metadata.to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn chunks_for_document(
    pool: &SqlitePool,
    document_id: &str,
) -> Result<Vec<DocumentChunk>, PipelineError> {
    let rows = sqlx::query(
        "SELECT * FROM document_chunks WHERE document_id = ? ORDER BY chunk_index",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| DocumentChunk {
            id: row.get("id"),
            document_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
            chunk_text: row.get("chunk_text"),
            char_start: row.get("char_start"),
            char_end: row.get("char_end"),
            page_number: row.get("page_number"),
            vector_id: row.get("vector_id"),
            metadata: serde_json::from_str(row.get::<String, _>("metadata_json").as_str())
                .unwrap_or_default(),
        })
        .collect())
}

/// Per-status document counts for one project.
pub async fn status_counts(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<(String, i64)>, PipelineError> {
    let rows = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM documents WHERE project_id = ? \
         GROUP BY status ORDER BY status",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("status"), row.get("n")))
        .collect())
}

/// Per-category document counts for one project.
pub async fn category_counts(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<(String, i64)>, PipelineError> {
    let rows = sqlx::query(
        "SELECT category, COUNT(*) AS n FROM documents WHERE project_id = ? \
         GROUP BY category ORDER BY category",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("category"), row.get("n")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;

    async fn pool_with_project() -> (SqlitePool, String) {
        let pool = db::connect_memory().await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        let project_id = create_project(&pool, "marina", "/tenders/marina").await.unwrap();
        (pool, project_id)
    }

    fn doc(id: &str, project_id: &str, path: &str, hash: &str) -> Document {
        Document {
            id: id.to_string(),
            project_id: project_id.to_string(),
            filename: path.rsplit('/').next().unwrap_or(path).to_string(),
            file_path: path.to_string(),
            file_type: "pdf".to_string(),
            file_size: 1234,
            content_hash: hash.to_string(),
            status: DocumentStatus::Indexed,
            error_message: None,
            processing_time_ms: Some(12),
            extracted_text: Some("text".to_string()),
            page_count: Some(3),
            metadata: serde_json::json!({}),
            category: DocumentCategory::Itt,
            category_confidence: None,
            language: Some("en".to_string()),
            version: 1,
            is_superseded: false,
            superseded_by_id: None,
            vector_ids: vec!["v1".to_string()],
            indexed_at: None,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_id_and_bumps_version_on_content_change() {
        let (pool, project_id) = pool_with_project().await;
        let record = doc("d1", &project_id, "/tenders/marina/itt.pdf", "aaaa");

        upsert_document(&pool, &record).await.unwrap();
        assert!(is_indexed(&pool, &project_id, "/tenders/marina/itt.pdf", "aaaa")
            .await
            .unwrap());

        // Same content: version unchanged.
        upsert_document(&pool, &record).await.unwrap();
        assert_eq!(get_document(&pool, "d1").await.unwrap().version, 1);

        // Changed content: version bumps, old hash no longer indexed.
        let mut changed = record.clone();
        changed.content_hash = "bbbb".to_string();
        upsert_document(&pool, &changed).await.unwrap();
        let stored = get_document(&pool, "d1").await.unwrap();
        assert_eq!(stored.version, 2);
        assert!(!is_indexed(&pool, &project_id, "/tenders/marina/itt.pdf", "aaaa")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn supersession_links_old_to_new() {
        let (pool, project_id) = pool_with_project().await;
        upsert_document(&pool, &doc("d1", &project_id, "/t/spec_rev_a.pdf", "aaaa"))
            .await
            .unwrap();
        upsert_document(&pool, &doc("d2", &project_id, "/t/spec_rev_b.pdf", "bbbb"))
            .await
            .unwrap();

        mark_superseded(&pool, "d1", "d2").await.unwrap();

        let old = get_document(&pool, "d1").await.unwrap();
        assert!(old.is_superseded);
        assert_eq!(old.superseded_by_id.as_deref(), Some("d2"));
        let new = get_document(&pool, "d2").await.unwrap();
        assert!(!new.is_superseded);
    }

    #[tokio::test]
    async fn counts_group_by_status_and_category() {
        let (pool, project_id) = pool_with_project().await;
        upsert_document(&pool, &doc("d1", &project_id, "/t/a.pdf", "a1")).await.unwrap();
        let mut failed = doc("d2", &project_id, "/t/b.pdf", "b1");
        failed.status = DocumentStatus::Failed;
        failed.category = DocumentCategory::General;
        upsert_document(&pool, &failed).await.unwrap();

        let by_status = status_counts(&pool, &project_id).await.unwrap();
        assert!(by_status.contains(&("indexed".to_string(), 1)));
        assert!(by_status.contains(&("failed".to_string(), 1)));

        let by_category = category_counts(&pool, &project_id).await.unwrap();
        assert!(by_category.contains(&("itt".to_string(), 1)));
        assert!(by_category.contains(&("general".to_string(), 1)));
    }

    #[tokio::test]
    async fn missing_document_and_project_are_not_found() {
        let pool = db::connect_memory().await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        assert!(matches!(
            get_project(&pool, "nope").await.unwrap_err(),
            PipelineError::NotFound(_)
        ));
        assert!(matches!(
            get_document(&pool, "nope").await.unwrap_err(),
            PipelineError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn summary_and_checklist_blobs_round_trip() {
        let (pool, project_id) = pool_with_project().await;
        let summary = serde_json::json!({"project_name": {"value": "Marina", "confidence": 0.9}});
        save_summary(&pool, &project_id, &summary).await.unwrap();
        let checklist = serde_json::json!([{"id": 1, "requirement": "Sealed envelope"}]);
        save_checklist(&pool, &project_id, &checklist).await.unwrap();

        let project = get_project(&pool, &project_id).await.unwrap();
        assert_eq!(project.summary.unwrap()["project_name"]["value"], "Marina");
        assert_eq!(project.checklist.unwrap()[0]["requirement"], "Sealed envelope");
        assert_eq!(project.status, "ready");
    }
}
