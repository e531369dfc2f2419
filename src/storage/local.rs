//! Minimal local default adapters for the `VectorStore`/`EmbeddingProvider`
//! collaborators spec.md §1 treats as external: a process-local, in-memory
//! implementation so `contextd` is runnable stand-alone (per spec.md's
//! "trusted local deployment" Non-goal) without wiring a real vector
//! database or embedding backend. A deployment that wants a real adapter
//! swaps these out; nothing in `dispatch`/`storage::*` depends on this
//! module directly.

use super::{EmbeddingProvider, VectorMatch, VectorStore};
use crate::errors::ContextdResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Cosine-similarity search over an in-process map of collections, guarded
/// by a single `RwLock` the same way the tool registry is (spec.md §5).
#[derive(Default)]
pub struct LocalVectorStore {
    collections: RwLock<HashMap<String, HashMap<String, (Vec<f32>, serde_json::Value)>>>,
}

impl LocalVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn create_collection(&self, name: &str) -> ContextdResult<()> {
        self.collections.write().await.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        payload: serde_json::Value,
    ) -> ContextdResult<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), (vector, payload));
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: usize,
    ) -> ContextdResult<Vec<VectorMatch>> {
        let collections = self.collections.read().await;
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<VectorMatch> = entries
            .iter()
            .map(|(id, (vector, payload))| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(&query_vector, vector),
                payload: payload.clone(),
            })
            .collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(limit);
        Ok(out)
    }

    async fn get(&self, collection: &str, id: &str) -> ContextdResult<Option<serde_json::Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|entries| entries.get(id))
            .map(|(_, payload)| payload.clone()))
    }

    async fn delete(&self, collection: &str, id: &str) -> ContextdResult<()> {
        if let Some(entries) = self.collections.write().await.get_mut(collection) {
            entries.remove(id);
        }
        Ok(())
    }
}

const EMBEDDING_DIMS: usize = 256;

/// A dependency-free bag-of-words hashing embedder: every whitespace token
/// is hashed into one of `EMBEDDING_DIMS` buckets. Not semantically
/// meaningful beyond "shared vocabulary moves cosine similarity up" — good
/// enough for a local default, not a substitute for a real embedding model.
pub struct LocalEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> ContextdResult<Vec<f32>> {
        let mut vector = vec![0.0_f32; EMBEDDING_DIMS];
        for token in text.split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            std::hash::Hash::hash(&token.to_lowercase(), &mut hasher);
            let bucket = (std::hash::Hasher::finish(&hasher) as usize) % EMBEDDING_DIMS;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_search_finds_the_record() {
        let store = LocalVectorStore::new();
        store.create_collection("c").await.unwrap();
        store
            .upsert("c", "a", vec![1.0, 0.0], serde_json::json!({"x": 1}))
            .await
            .unwrap();
        let hits = store.search("c", vec![1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn search_on_unknown_collection_returns_empty() {
        let store = LocalVectorStore::new();
        let hits = store.search("missing", vec![1.0], 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = LocalEmbeddingProvider;
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embedder_distinguishes_different_text() {
        let embedder = LocalEmbeddingProvider;
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("goodbye moon").await.unwrap();
        assert_ne!(a, b);
    }
}
