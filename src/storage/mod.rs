//! Storage service contracts (spec.md §4.H).
//!
//! Every concrete service (`checkpoint`, `remediation`, `memory`,
//! `repository`, `conversation`) is built over the same two external
//! collaborators named in spec.md §1: a `VectorStore` capability (create /
//! upsert / search / delete over named collections) and an
//! `EmbeddingProvider` that turns text into a fixed-dimension vector. Both
//! are `async_trait` objects so a test double can stand in for the real
//! adapters — the same role the teacher's `LLMProvider` trait plays for
//! `MockLLMProvider` in `tests/common/mod.rs`.
//!
//! Collection naming is centralised in `collection_name` so every service
//! encodes the tenant triple identically, which is the physical-isolation
//! guarantee spec.md §6 asks for.

pub mod checkpoint;
pub mod conversation;
#[cfg(test)]
pub(crate) mod fakes;
pub mod local;
pub mod memory;
pub mod remediation;
pub mod repository;

use crate::errors::ContextdResult;
use crate::tenant::TenantTriple;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single hit returned by `VectorStore::search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// The external vector-store adapter this design assumes (spec.md §1).
/// Out of core: the concrete implementation (Qdrant, pgvector, an
/// in-process index, ...) is a collaborator, not something this crate
/// builds. A fake in-memory implementation lives in `tests/common`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, name: &str) -> ContextdResult<()>;
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        payload: serde_json::Value,
    ) -> ContextdResult<()>;
    async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: usize,
    ) -> ContextdResult<Vec<VectorMatch>>;
    async fn get(&self, collection: &str, id: &str) -> ContextdResult<Option<serde_json::Value>>;
    async fn delete(&self, collection: &str, id: &str) -> ContextdResult<()>;
}

/// The external embedding backend this design assumes (spec.md §1).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> ContextdResult<Vec<f32>>;
}

/// How a stored record's prior use panned out (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
    Unknown,
}

/// A search hit enriched with the storage-domain scoring fields from
/// spec.md §3's "search scored result (storage)".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord<T> {
    pub record: T,
    pub relevance: f64,
    pub confidence: f64,
    pub usage_count: u64,
    pub outcome: Outcome,
}

/// Build the collection name a tenant-scoped storage operation uses. Every
/// service calls this the same way, so a vector-space misconfiguration in
/// one `kind` can never taint another, and no cross-tenant read/write is
/// physically possible without an explicit scope elevation (spec.md §6).
pub fn collection_name(tenant: &TenantTriple, kind: &str) -> String {
    let team = if tenant.team_id.is_empty() {
        "_"
    } else {
        &tenant.team_id
    };
    let project = if tenant.project_id.is_empty() {
        "_"
    } else {
        &tenant.project_id
    };
    format!("ctxd_{}_{}_{}_{}", tenant.tenant_id, team, project, kind)
}

/// Clamp a confidence score into `[0, 1]` (spec.md §4.H).
pub fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Apply the feedback confidence curve: `c <- clamp(c +- 0.1, 0, 1)`.
pub fn apply_feedback(confidence: f64, helpful: bool) -> f64 {
    clamp_confidence(confidence + if helpful { 0.1 } else { -0.1 })
}

/// Apply the outcome confidence curve: `c <- clamp(c +- 0.2, 0, 1)`. Carries
/// more weight than feedback (spec.md §4.H).
pub fn apply_outcome(confidence: f64, succeeded: bool) -> f64 {
    clamp_confidence(confidence + if succeeded { 0.2 } else { -0.2 })
}

/// Word-level Jaccard similarity, used by `memory::consolidate` to cluster
/// near-duplicate memories. Grounded on the teacher's
/// `agent::memory::remember::jaccard_similarity`.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
