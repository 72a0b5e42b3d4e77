use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use triad_core::{TriadError, TriadResult};

use crate::index;

/// How many entities are scored between latency-budget checks.
const BUDGET_CHECK_STRIDE: usize = 256;

/// A single entity stored in the recall store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntity {
    /// Unique entity identifier.
    pub id: Uuid,
    /// Stored content.
    pub content: String,
    /// Free-form tags, searchable alongside content.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque similarity key; derived locally when absent at construction.
    pub key: Vec<f32>,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Monotonic non-decreasing read counter.
    #[serde(default)]
    pub access_count: u64,
    /// When the entity was last read through `get`.
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl MemoryEntity {
    /// Create an entity with a locally derived similarity key.
    pub fn new(content: impl Into<String>, tags: Vec<String>) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4(),
            key: index::derive_key(&content),
            content,
            tags,
            created_at: Utc::now(),
            access_count: 0,
            last_accessed: None,
        }
    }

    /// Replace the similarity key with a caller-supplied one.
    pub fn with_key(mut self, key: Vec<f32>) -> Self {
        self.key = key;
        self
    }
}

/// A search query: text plus an optional caller-supplied similarity key.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Keyword/text portion of the query.
    pub text: String,
    /// Similarity key; derived from `text` when absent.
    pub key: Option<Vec<f32>>,
}

impl SearchQuery {
    /// A plain text query with a locally derived key.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            key: None,
        }
    }

    fn effective_key(&self) -> Vec<f32> {
        self.key
            .clone()
            .unwrap_or_else(|| index::derive_key(&self.text))
    }
}

/// One ranked search hit.
#[derive(Debug, Clone)]
pub struct RecallHit {
    /// The matched entity.
    pub entity: MemoryEntity,
    /// Fused similarity/keyword score, higher is better.
    pub score: f32,
}

/// A (possibly partial) search response.
#[derive(Debug, Clone)]
pub struct RecallResponse {
    /// Ranked hits, best first.
    pub hits: Vec<RecallHit>,
    /// True when the latency budget elapsed or the index was mid-rebuild;
    /// results may be fewer or partial but the call did not fail.
    pub degraded: bool,
}

/// Trait for recall storage backends.
#[async_trait]
pub trait RecallStore: Send + Sync {
    /// Store an entity (upsert by id); durable before returning.
    async fn put(&self, entity: MemoryEntity) -> TriadResult<Uuid>;

    /// Fetch by id; strongly consistent with the last successful `put`.
    /// Bumps the entity's access count and last-accessed timestamp.
    async fn get(&self, id: Uuid) -> TriadResult<Option<MemoryEntity>>;

    /// Ranked top-k search under the store's latency budget.
    async fn search(&self, query: &SearchQuery, k: usize) -> TriadResult<RecallResponse>;

    /// Remove an entity; returns whether it existed.
    async fn delete(&self, id: Uuid) -> TriadResult<bool>;

    /// Number of stored entities.
    async fn count(&self) -> TriadResult<usize>;
}

/// In-memory store scoring entities with a budget-bounded brute-force scan.
pub struct InMemoryRecallStore {
    entries: RwLock<HashMap<Uuid, MemoryEntity>>,
    rebuilding: AtomicBool,
    budget: Duration,
}

impl InMemoryRecallStore {
    /// Create a store with the given search latency budget.
    pub fn new(search_budget: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            rebuilding: AtomicBool::new(false),
            budget: search_budget,
        }
    }

    /// Flag the index as mid-rebuild; searches degrade until finished.
    pub fn begin_rebuild(&self) {
        self.rebuilding.store(true, Ordering::SeqCst);
    }

    /// Clear the rebuild flag.
    pub fn finish_rebuild(&self) {
        self.rebuilding.store(false, Ordering::SeqCst);
    }

    fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecallStore for InMemoryRecallStore {
    async fn put(&self, entity: MemoryEntity) -> TriadResult<Uuid> {
        let id = entity.id;
        self.entries.write().await.insert(id, entity);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> TriadResult<Option<MemoryEntity>> {
        let mut entries = self.entries.write().await;
        Ok(entries.get_mut(&id).map(|entity| {
            entity.access_count += 1;
            entity.last_accessed = Some(Utc::now());
            entity.clone()
        }))
    }

    async fn search(&self, query: &SearchQuery, k: usize) -> TriadResult<RecallResponse> {
        if query.text.trim().is_empty() && query.key.is_none() {
            return Err(TriadError::Recall("empty search query".into()));
        }

        let start = Instant::now();
        let mut degraded = self.is_rebuilding();
        let query_key = query.effective_key();

        let entries = self.entries.read().await;
        let mut scored: Vec<RecallHit> = Vec::new();

        for (scanned, entity) in entries.values().enumerate() {
            // Budget check between strides: stop early instead of failing.
            if scanned % BUDGET_CHECK_STRIDE == BUDGET_CHECK_STRIDE - 1
                && start.elapsed() > self.budget
            {
                degraded = true;
                tracing::warn!(
                    scanned,
                    budget_ms = self.budget.as_millis() as u64,
                    "Recall search exceeded latency budget, returning partial results"
                );
                break;
            }

            let similarity = index::cosine_similarity(&query_key, &entity.key);
            let haystack = format!("{} {}", entity.content, entity.tags.join(" "));
            let keyword = index::keyword_overlap(&query.text, &haystack);
            scored.push(RecallHit {
                entity: entity.clone(),
                score: index::fused_score(similarity, keyword),
            });
        }
        drop(entries);

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(RecallResponse {
            hits: scored,
            degraded,
        })
    }

    async fn delete(&self, id: Uuid) -> TriadResult<bool> {
        Ok(self.entries.write().await.remove(&id).is_some())
    }

    async fn count(&self) -> TriadResult<usize> {
        Ok(self.entries.read().await.len())
    }
}

/// File-backed store persisting entities as JSONL.
///
/// Appends on put, rewrites on delete, and reloads everything on open — the
/// in-memory index is fully reconstructible from the durable log. Access
/// metadata updated by `get` reaches disk on the next rewrite.
pub struct FileRecallStore {
    path: PathBuf,
    inner: InMemoryRecallStore,
}

impl FileRecallStore {
    /// Open (or create) a store at the given path, reloading existing entries.
    pub async fn open(path: PathBuf, search_budget: Duration) -> TriadResult<Self> {
        let inner = InMemoryRecallStore::new(search_budget);

        if path.exists() {
            let data = tokio::fs::read_to_string(&path).await.map_err(|e| {
                TriadError::Recall(format!("Failed to read recall log: {e}"))
            })?;
            let mut loaded = 0usize;
            for line in data.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let entity: MemoryEntity = serde_json::from_str(line)
                    .map_err(|e| TriadError::Recall(format!("Invalid JSONL entry: {e}")))?;
                inner.put(entity).await?;
                loaded += 1;
            }
            tracing::info!(path = %path.display(), loaded, "Recall store reloaded");
        } else if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TriadError::Recall(format!("Failed to create dir: {e}")))?;
        }

        Ok(Self { path, inner })
    }

    async fn append_to_log(&self, entity: &MemoryEntity) -> TriadResult<()> {
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| TriadError::Recall(format!("Failed to open recall log: {e}")))?;
        let mut line = serde_json::to_string(entity)?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| TriadError::Recall(format!("Failed to append entry: {e}")))?;
        Ok(())
    }

    async fn rewrite_log(&self) -> TriadResult<()> {
        let entries = self.inner.entries.read().await;
        let mut data = String::new();
        for entity in entries.values() {
            data.push_str(&serde_json::to_string(entity)?);
            data.push('\n');
        }
        drop(entries);
        tokio::fs::write(&self.path, data.as_bytes())
            .await
            .map_err(|e| TriadError::Recall(format!("Failed to rewrite recall log: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl RecallStore for FileRecallStore {
    async fn put(&self, entity: MemoryEntity) -> TriadResult<Uuid> {
        self.append_to_log(&entity).await?;
        self.inner.put(entity).await
    }

    async fn get(&self, id: Uuid) -> TriadResult<Option<MemoryEntity>> {
        self.inner.get(id).await
    }

    async fn search(&self, query: &SearchQuery, k: usize) -> TriadResult<RecallResponse> {
        self.inner.search(query, k).await
    }

    async fn delete(&self, id: Uuid) -> TriadResult<bool> {
        let deleted = self.inner.delete(id).await?;
        if deleted {
            self.rewrite_log().await?;
        }
        Ok(deleted)
    }

    async fn count(&self) -> TriadResult<usize> {
        self.inner.count().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn budget() -> Duration {
        Duration::from_millis(100)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = InMemoryRecallStore::new(budget());
        let entity = MemoryEntity::new("q3 cost summary", vec!["finance".into()]);
        let id = store.put(entity.clone()).await.unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, entity.id);
        assert_eq!(fetched.content, entity.content);
        assert_eq!(fetched.tags, entity.tags);
        assert_eq!(fetched.key, entity.key);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryRecallStore::new(budget());
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_bumps_access_metadata() {
        let store = InMemoryRecallStore::new(budget());
        let id = store
            .put(MemoryEntity::new("tracked", vec![]))
            .await
            .unwrap();

        let first = store.get(id).await.unwrap().unwrap();
        assert_eq!(first.access_count, 1);
        assert!(first.last_accessed.is_some());

        let second = store.get(id).await.unwrap().unwrap();
        assert_eq!(second.access_count, 2);
        // Monotonic non-decreasing.
        assert!(second.access_count >= first.access_count);
    }

    #[tokio::test]
    async fn test_put_is_upsert() {
        let store = InMemoryRecallStore::new(budget());
        let mut entity = MemoryEntity::new("v1", vec![]);
        let id = store.put(entity.clone()).await.unwrap();

        entity.content = "v2".into();
        store.put(entity).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(id).await.unwrap().unwrap().content, "v2");
    }

    #[tokio::test]
    async fn test_search_ranks_relevant_first() {
        let store = InMemoryRecallStore::new(budget());
        store
            .put(MemoryEntity::new("rust systems programming", vec![]))
            .await
            .unwrap();
        store
            .put(MemoryEntity::new("chocolate cake recipe", vec![]))
            .await
            .unwrap();

        let response = store
            .search(&SearchQuery::text("rust programming"), 2)
            .await
            .unwrap();
        assert!(!response.degraded);
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.hits[0].entity.content, "rust systems programming");
        assert!(response.hits[0].score > response.hits[1].score);
    }

    #[tokio::test]
    async fn test_search_matches_tags() {
        let store = InMemoryRecallStore::new(budget());
        store
            .put(MemoryEntity::new("untitled note", vec!["billing".into()]))
            .await
            .unwrap();
        store
            .put(MemoryEntity::new("another note", vec![]))
            .await
            .unwrap();

        let response = store.search(&SearchQuery::text("billing"), 1).await.unwrap();
        assert_eq!(response.hits[0].entity.tags, vec!["billing".to_string()]);
    }

    #[tokio::test]
    async fn test_search_empty_query_rejected() {
        let store = InMemoryRecallStore::new(budget());
        assert!(store.search(&SearchQuery::text("  "), 5).await.is_err());
    }

    #[tokio::test]
    async fn test_search_degrades_during_rebuild() {
        let store = InMemoryRecallStore::new(budget());
        store
            .put(MemoryEntity::new("some content", vec![]))
            .await
            .unwrap();

        store.begin_rebuild();
        let response = store.search(&SearchQuery::text("content"), 5).await.unwrap();
        assert!(response.degraded, "mid-rebuild search must be flagged");
        assert!(!response.hits.is_empty(), "degraded is not empty-handed");

        store.finish_rebuild();
        let response = store.search(&SearchQuery::text("content"), 5).await.unwrap();
        assert!(!response.degraded);
    }

    #[tokio::test]
    async fn test_get_consistent_during_rebuild() {
        let store = InMemoryRecallStore::new(budget());
        let id = store
            .put(MemoryEntity::new("still here", vec![]))
            .await
            .unwrap();
        store.begin_rebuild();
        assert_eq!(
            store.get(id).await.unwrap().unwrap().content,
            "still here"
        );
    }

    #[tokio::test]
    async fn test_search_budget_partial_results() {
        // A zero budget forces the stride check to fire on a large scan.
        let store = InMemoryRecallStore::new(Duration::ZERO);
        for n in 0..(BUDGET_CHECK_STRIDE * 2) {
            store
                .put(MemoryEntity::new(format!("entry number {n}"), vec![]))
                .await
                .unwrap();
        }

        let response = store.search(&SearchQuery::text("entry"), 10).await.unwrap();
        assert!(response.degraded, "budget overrun must flag degradation");
        assert!(response.hits.len() <= 10);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryRecallStore::new(budget());
        let id = store.put(MemoryEntity::new("bye", vec![])).await.unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    // --- FileRecallStore ---

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("recall.jsonl");

        let first = MemoryEntity::new("persisted fact", vec!["durable".into()]);
        let id = first.id;
        {
            let store = FileRecallStore::open(path.clone(), budget()).await.unwrap();
            store.put(first).await.unwrap();
            store
                .put(MemoryEntity::new("second fact", vec![]))
                .await
                .unwrap();
        }

        let store = FileRecallStore::open(path, budget()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "persisted fact");
        assert_eq!(fetched.tags, vec!["durable".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_delete_rewrites_log() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("recall.jsonl");

        let store = FileRecallStore::open(path.clone(), budget()).await.unwrap();
        let doomed = MemoryEntity::new("doomed", vec![]);
        let doomed_id = doomed.id;
        store.put(doomed).await.unwrap();
        store.put(MemoryEntity::new("kept", vec![])).await.unwrap();

        assert!(store.delete(doomed_id).await.unwrap());

        let reopened = FileRecallStore::open(path, budget()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert!(reopened.get(doomed_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_search() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("recall.jsonl");

        let store = FileRecallStore::open(path, budget()).await.unwrap();
        store
            .put(MemoryEntity::new("alpha metrics dashboard", vec![]))
            .await
            .unwrap();
        store
            .put(MemoryEntity::new("unrelated text", vec![]))
            .await
            .unwrap();

        let response = store
            .search(&SearchQuery::text("metrics dashboard"), 1)
            .await
            .unwrap();
        assert_eq!(response.hits[0].entity.content, "alpha metrics dashboard");
    }

    #[tokio::test]
    async fn test_file_store_empty_open() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileRecallStore::open(tmp.path().join("recall.jsonl"), budget())
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
