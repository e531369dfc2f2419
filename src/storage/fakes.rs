//! In-memory `VectorStore`/`EmbeddingProvider` test doubles, shared by the
//! unit tests of every storage submodule and the dispatcher. Integration
//! tests under `tests/` get their own copies in `tests/common/mod.rs` since
//! they live outside this crate — mirroring the teacher's `MockLLMProvider`
//! split between unit-test fakes and `tests/common`.

#![cfg(test)]

use super::{EmbeddingProvider, VectorStore, VectorMatch};
use crate::errors::ContextdResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str) -> ContextdResult<()> {
        self.collections
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        _vector: Vec<f32>,
        payload: serde_json::Value,
    ) -> ContextdResult<()> {
        let mut collections = self.collections.lock().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), payload);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        _query_vector: Vec<f32>,
        limit: usize,
    ) -> ContextdResult<Vec<VectorMatch>> {
        let collections = self.collections.lock().unwrap();
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<VectorMatch> = entries
            .iter()
            .map(|(id, payload)| VectorMatch {
                id: id.clone(),
                score: 1.0,
                payload: payload.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out.truncate(limit);
        Ok(out)
    }

    async fn get(&self, collection: &str, id: &str) -> ContextdResult<Option<serde_json::Value>> {
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|entries| entries.get(id).cloned()))
    }

    async fn delete(&self, collection: &str, id: &str) -> ContextdResult<()> {
        if let Some(entries) = self.collections.lock().unwrap().get_mut(collection) {
            entries.remove(id);
        }
        Ok(())
    }
}

/// Deterministic fake embedder: hashes text into a fixed-size vector so
/// identical content always embeds identically, without pulling in a real
/// embedding backend (out of core per spec.md §1).
pub struct FakeEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    async fn embed(&self, text: &str) -> ContextdResult<Vec<f32>> {
        let mut vector = vec![0.0_f32; 8];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % 8] += byte as f32;
        }
        Ok(vector)
    }
}
