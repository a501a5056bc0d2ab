//! Vector index: embedding storage, filtered nearest-neighbor search,
//! and filtered deletion.
//!
//! [`VectorStore`] is the raw point-level backend; [`QdrantStore`]
//! talks to Qdrant's REST API and [`MemoryStore`] is a brute-force
//! in-memory implementation for tests. [`VectorIndex`] composes a
//! store with an [`EmbeddingProvider`] and exposes the text-level
//! operations the pipeline uses.
//!
//! Filters are equality conjunctions over metadata fields (project id,
//! document id); no OR/NOT composition is supported or needed. The
//! collection is created with cosine distance before any write.

use std::sync::Arc;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::config::VectorConfig;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::models::SearchHit;

/// Equality conjunction over metadata fields.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    conditions: Vec<(String, serde_json::Value)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, serde_json::Value)] {
        &self.conditions
    }

    /// Whether a payload satisfies every condition.
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| payload.get(key) == Some(value))
    }
}

/// One stored point: id, vector, and payload (text + metadata).
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// Raw vector storage backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection with the given dimensionality and cosine
    /// distance if it does not already exist.
    async fn ensure_collection(&self, dims: usize) -> Result<()>;

    /// Insert or overwrite points.
    async fn upsert_points(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Nearest-neighbor search under an optional equality filter,
    /// descending by score, bounded by `limit` and `min_score`.
    async fn search_points(
        &self,
        vector: &[f32],
        filter: &MetadataFilter,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<SearchHit>>;

    /// Delete every point matching the filter.
    async fn delete_points(&self, filter: &MetadataFilter) -> Result<()>;
}

// ============ Qdrant REST backend ============

/// Qdrant backend over its REST API.
pub struct QdrantStore {
    client: reqwest::Client,
    url: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.url, self.collection)
    }

    fn filter_json(filter: &MetadataFilter) -> Option<serde_json::Value> {
        if filter.is_empty() {
            return None;
        }
        let must: Vec<serde_json::Value> = filter
            .conditions()
            .iter()
            .map(|(key, value)| {
                serde_json::json!({ "key": key, "match": { "value": value } })
            })
            .collect();
        Some(serde_json::json!({ "must": must }))
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<serde_json::Value> {
        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        if !status.is_success() {
            bail!("Qdrant {} failed ({}): {}", what, status, body);
        }
        Ok(body)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status().is_success() {
            return Ok(());
        }

        let body = serde_json::json!({
            "vectors": { "size": dims, "distance": "Cosine" }
        });
        let response = self
            .client
            .put(self.collection_url())
            .json(&body)
            .send()
            .await?;
        Self::check(response, "collection create").await?;
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> Result<()> {
        let points_json: Vec<serde_json::Value> = points
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id,
                    "vector": p.vector,
                    "payload": p.payload,
                })
            })
            .collect();

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&serde_json::json!({ "points": points_json }))
            .send()
            .await?;
        Self::check(response, "upsert").await?;
        Ok(())
    }

    async fn search_points(
        &self,
        vector: &[f32],
        filter: &MetadataFilter,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<SearchHit>> {
        let mut body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "score_threshold": min_score,
            "with_payload": true,
        });
        if let Some(filter_json) = Self::filter_json(filter) {
            body["filter"] = filter_json;
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await?;
        let json = Self::check(response, "search").await?;

        let hits = json
            .get("result")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .into_iter()
            .map(|hit| {
                let payload = hit.get("payload").cloned().unwrap_or_default();
                let text = payload
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string();
                let mut metadata = payload;
                if let Some(obj) = metadata.as_object_mut() {
                    obj.remove("text");
                }
                SearchHit {
                    id: hit
                        .get("id")
                        .map(|i| i.to_string().trim_matches('"').to_string())
                        .unwrap_or_default(),
                    score: hit.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0),
                    text,
                    metadata,
                }
            })
            .collect())
    }

    async fn delete_points(&self, filter: &MetadataFilter) -> Result<()> {
        let filter_json = match Self::filter_json(filter) {
            Some(f) => f,
            None => bail!("refusing to delete with an empty filter"),
        };
        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&serde_json::json!({ "filter": filter_json }))
            .send()
            .await?;
        Self::check(response, "delete").await?;
        Ok(())
    }
}

// ============ In-memory backend ============

/// Brute-force cosine store for tests and single-process use.
#[derive(Default)]
pub struct MemoryStore {
    points: RwLock<Vec<VectorPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, _dims: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> Result<()> {
        let mut stored = self.points.write().unwrap();
        for point in points {
            stored.retain(|p| p.id != point.id);
            stored.push(point);
        }
        Ok(())
    }

    async fn search_points(
        &self,
        vector: &[f32],
        filter: &MetadataFilter,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<SearchHit>> {
        let stored = self.points.read().unwrap();
        let mut hits: Vec<SearchHit> = stored
            .iter()
            .filter(|p| filter.matches(&p.payload))
            .map(|p| {
                let score = cosine_similarity(vector, &p.vector) as f64;
                let text = p
                    .payload
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string();
                let mut metadata = p.payload.clone();
                if let Some(obj) = metadata.as_object_mut() {
                    obj.remove("text");
                }
                SearchHit {
                    id: p.id.clone(),
                    score,
                    text,
                    metadata,
                }
            })
            .filter(|hit| hit.score >= min_score)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_points(&self, filter: &MetadataFilter) -> Result<()> {
        let mut stored = self.points.write().unwrap();
        stored.retain(|p| !filter.matches(&p.payload));
        Ok(())
    }
}

// ============ VectorIndex ============

/// Text-level index combining a store and an embedding provider.
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn VectorStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Embed and store texts with their metadata. Returns the point
    /// ids (generated UUIDs when not supplied).
    pub async fn add_texts(
        &self,
        texts: &[String],
        metadatas: &[serde_json::Value],
        ids: Option<Vec<String>>,
    ) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() != metadatas.len() {
            bail!("texts and metadatas must have the same length");
        }

        self.store.ensure_collection(self.provider.dims()).await?;

        let ids =
            ids.unwrap_or_else(|| texts.iter().map(|_| Uuid::new_v4().to_string()).collect());
        let vectors = self.provider.embed(texts).await?;

        let points: Vec<VectorPoint> = ids
            .iter()
            .zip(texts.iter())
            .zip(vectors.into_iter())
            .zip(metadatas.iter())
            .map(|(((id, text), vector), metadata)| {
                let mut payload = metadata.clone();
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("text".to_string(), serde_json::json!(text));
                }
                VectorPoint {
                    id: id.clone(),
                    vector,
                    payload,
                }
            })
            .collect();

        self.store.upsert_points(points).await?;
        Ok(ids)
    }

    /// Filtered nearest-neighbor search over embedded chunks.
    pub async fn search(
        &self,
        query: &str,
        filter: &MetadataFilter,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<SearchHit>> {
        let vector = self.provider.embed_one(query).await?;
        self.store
            .search_points(&vector, filter, limit, min_score)
            .await
    }

    /// Purge all points matching the filter (used before re-embedding a
    /// document).
    pub async fn delete_by_filter(&self, filter: &MetadataFilter) -> Result<()> {
        self.store.delete_points(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedProvider;

    fn index() -> VectorIndex {
        VectorIndex::new(
            Arc::new(MemoryStore::new()),
            Arc::new(HashedProvider::with_dims(128)),
        )
    }

    #[tokio::test]
    async fn add_texts_returns_one_id_per_text() {
        let index = index();
        let ids = index
            .add_texts(
                &["alpha".to_string(), "beta".to_string()],
                &[serde_json::json!({}), serde_json::json!({})],
                None,
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn search_is_filtered_and_ordered() {
        let index = index();
        index
            .add_texts(
                &[
                    "submission deadline for tender".to_string(),
                    "submission deadline for tender".to_string(),
                    "concrete mix design".to_string(),
                ],
                &[
                    serde_json::json!({"project_id": "p1"}),
                    serde_json::json!({"project_id": "p2"}),
                    serde_json::json!({"project_id": "p1"}),
                ],
                None,
            )
            .await
            .unwrap();

        let filter = MetadataFilter::new().must("project_id", "p1");
        let hits = index
            .search("tender submission deadline", &filter, 10, 0.0)
            .await
            .unwrap();

        assert!(!hits.is_empty());
        for hit in &hits {
            assert_eq!(hit.metadata["project_id"], serde_json::json!("p1"));
        }
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(hits[0].text.contains("submission deadline"));
    }

    #[tokio::test]
    async fn min_score_threshold_applies() {
        let index = index();
        index
            .add_texts(
                &["totally unrelated quarry blasting permit".to_string()],
                &[serde_json::json!({})],
                None,
            )
            .await
            .unwrap();

        let hits = index
            .search("retention percentage", &MetadataFilter::new(), 10, 0.9)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_by_filter_purges_only_matches() {
        let store = Arc::new(MemoryStore::new());
        let index = VectorIndex::new(store.clone(), Arc::new(HashedProvider::with_dims(64)));
        index
            .add_texts(
                &["a".to_string(), "b".to_string()],
                &[
                    serde_json::json!({"document_id": "d1"}),
                    serde_json::json!({"document_id": "d2"}),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(store.len(), 2);

        index
            .delete_by_filter(&MetadataFilter::new().must("document_id", "d1"))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn caller_supplied_ids_are_preserved() {
        let index = index();
        let ids = index
            .add_texts(
                &["x".to_string()],
                &[serde_json::json!({})],
                Some(vec!["point-1".to_string()]),
            )
            .await
            .unwrap();
        assert_eq!(ids, vec!["point-1"]);
    }
}
