//! Memory storage service (spec.md §4.H, tool contracts in §4.F).
//!
//! Grounded on the teacher's `agent::memory` family: `remember::mod` for the
//! near-duplicate detection shape (here reused for clustering at
//! consolidation time) and `memory_db` for the record-plus-metadata shape a
//! stored memory carries.

use super::{
    apply_feedback, apply_outcome, collection_name, jaccard_similarity, EmbeddingProvider,
    Outcome, ScoredRecord, VectorStore,
};
use crate::errors::{ContextdError, ContextdResult};
use crate::tenant::TenantContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KIND: &str = "memory";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub outcome: Outcome,
    pub confidence: f64,
    pub usage_count: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// `true` once a record has been folded into a consolidated record and
    /// archived — archived records are excluded from `search`.
    pub archived: bool,
}

pub struct MemoryRecordRequest {
    pub content: String,
    pub outcome: Outcome,
}

pub struct ConsolidateRequest {
    pub similarity_threshold: f64,
    pub dry_run: bool,
    pub max_clusters: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateCluster {
    pub source_ids: Vec<String>,
    pub consolidated_id: Option<String>,
    pub consolidated_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateResponse {
    pub clusters: Vec<ConsolidateCluster>,
    pub dry_run: bool,
}

pub struct MemoryService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MemoryService {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// `memory_record`: persist a new memory with an outcome label.
    pub async fn record(
        &self,
        ctx: &TenantContext,
        request: MemoryRecordRequest,
    ) -> ContextdResult<String> {
        let collection = collection_name(ctx.triple(), KIND);
        self.store.create_collection(&collection).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let record = MemoryRecord {
            id: id.clone(),
            content: request.content.clone(),
            outcome: request.outcome,
            confidence: 0.5,
            usage_count: 0,
            created_at: chrono::Utc::now(),
            archived: false,
        };
        let vector = self.embedder.embed(&request.content).await?;
        let payload = serde_json::to_value(&record)
            .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
        self.store.upsert(&collection, &id, vector, payload).await?;
        Ok(id)
    }

    /// `memory_search`: top-k retrieval with `relevance` in the output.
    pub async fn search(
        &self,
        ctx: &TenantContext,
        query: &str,
        limit: usize,
    ) -> ContextdResult<Vec<ScoredRecord<MemoryRecord>>> {
        let collection = collection_name(ctx.triple(), KIND);
        let vector = self.embedder.embed(query).await?;
        let matches = self.store.search(&collection, vector, limit).await?;

        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            let record: MemoryRecord = serde_json::from_value(m.payload)
                .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
            if record.archived {
                continue;
            }
            out.push(ScoredRecord {
                relevance: m.score as f64,
                confidence: record.confidence,
                usage_count: record.usage_count,
                outcome: record.outcome,
                record,
            });
        }
        Ok(out)
    }

    /// `memory_feedback`: binary helpful/not, updates confidence.
    pub async fn feedback(
        &self,
        ctx: &TenantContext,
        id: &str,
        helpful: bool,
    ) -> ContextdResult<f64> {
        self.update_confidence(ctx, id, |c| apply_feedback(c, helpful))
            .await
    }

    /// `memory_outcome`: post-hoc success/failure report, different curve
    /// than feedback (spec.md §7).
    pub async fn outcome(
        &self,
        ctx: &TenantContext,
        id: &str,
        succeeded: bool,
    ) -> ContextdResult<f64> {
        self.update_confidence(ctx, id, |c| apply_outcome(c, succeeded))
            .await
    }

    async fn update_confidence(
        &self,
        ctx: &TenantContext,
        id: &str,
        f: impl Fn(f64) -> f64,
    ) -> ContextdResult<f64> {
        let collection = collection_name(ctx.triple(), KIND);
        let Some(payload) = self.store.get(&collection, id).await? else {
            return Err(ContextdError::NotFound(format!("memory '{id}'")));
        };
        let mut record: MemoryRecord = serde_json::from_value(payload)
            .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
        record.confidence = f(record.confidence);
        record.usage_count += 1;
        let new_confidence = record.confidence;
        let vector = self.embedder.embed(&record.content).await?;
        let payload = serde_json::to_value(&record)
            .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
        self.store.upsert(&collection, id, vector, payload).await?;
        Ok(new_confidence)
    }

    /// `memory_consolidate`: cluster memories at similarity >= threshold,
    /// synthesise one consolidated record per cluster, archive sources.
    ///
    /// Clustering method (Open Question in spec.md §9, resolved in
    /// DESIGN.md): greedy single-link — walk records in id order, join a
    /// record to the first existing cluster whose representative (first
    /// member) scores >= `similarity_threshold` by word-level Jaccard
    /// similarity, otherwise start a new cluster. Clusters of size 1 are
    /// dropped — there is nothing to consolidate.
    ///
    /// Multi-record transactionality (spec.md §4.H): the consolidated
    /// record is only upserted, and sources only archived, after every
    /// vector-store call for the cluster has succeeded locally; an error
    /// partway through a cluster aborts consolidation entirely rather than
    /// leaving a half-applied merge, and already-processed clusters from
    /// this call are the only ones committed.
    pub async fn consolidate(
        &self,
        ctx: &TenantContext,
        all_records: Vec<MemoryRecord>,
        request: ConsolidateRequest,
    ) -> ContextdResult<ConsolidateResponse> {
        let collection = collection_name(ctx.triple(), KIND);

        let mut candidates: Vec<MemoryRecord> =
            all_records.into_iter().filter(|r| !r.archived).collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));

        let mut clusters: Vec<Vec<MemoryRecord>> = Vec::new();
        for record in candidates {
            let mut joined = false;
            for cluster in &mut clusters {
                let representative = &cluster[0];
                if jaccard_similarity(&representative.content, &record.content)
                    >= request.similarity_threshold
                {
                    cluster.push(record.clone());
                    joined = true;
                    break;
                }
            }
            if !joined {
                clusters.push(vec![record]);
            }
        }

        clusters.retain(|c| c.len() > 1);
        if let Some(cap) = request.max_clusters {
            clusters.truncate(cap);
        }

        let mut responses = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let source_ids: Vec<String> = cluster.iter().map(|r| r.id.clone()).collect();
            let max_confidence = cluster
                .iter()
                .map(|r| r.confidence)
                .fold(0.0_f64, f64::max);
            let consolidated_content = cluster
                .iter()
                .map(|r| r.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");

            if request.dry_run {
                responses.push(ConsolidateCluster {
                    source_ids,
                    consolidated_id: None,
                    consolidated_content,
                });
                continue;
            }

            let new_id = uuid::Uuid::new_v4().to_string();
            let consolidated = MemoryRecord {
                id: new_id.clone(),
                content: consolidated_content.clone(),
                outcome: Outcome::Unknown,
                confidence: max_confidence,
                usage_count: 0,
                created_at: chrono::Utc::now(),
                archived: false,
            };
            let vector = self.embedder.embed(&consolidated_content).await?;
            let payload = serde_json::to_value(&consolidated)
                .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
            self.store
                .upsert(&collection, &new_id, vector, payload)
                .await?;

            for source in &cluster {
                let mut archived = source.clone();
                archived.archived = true;
                let vector = self.embedder.embed(&archived.content).await?;
                let payload = serde_json::to_value(&archived)
                    .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
                self.store
                    .upsert(&collection, &archived.id, vector, payload)
                    .await?;
            }

            responses.push(ConsolidateCluster {
                source_ids,
                consolidated_id: Some(new_id),
                consolidated_content,
            });
        }

        Ok(ConsolidateResponse {
            clusters: responses,
            dry_run: request.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_curve_is_shallower_than_outcome_curve() {
        assert_eq!(apply_feedback(0.5, true), 0.6);
        assert_eq!(apply_outcome(0.5, true), 0.7);
    }
}
