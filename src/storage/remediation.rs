//! Remediation storage service (spec.md §4.F: `search/record/feedback`).

use super::{apply_feedback, collection_name, EmbeddingProvider, ScoredRecord, VectorStore};
use crate::errors::{ContextdError, ContextdResult};
use crate::tenant::TenantContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KIND: &str = "remediation";

/// The scope a remediation was recorded at (spec.md §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Project,
    Team,
    Org,
}

impl Scope {
    /// Scopes to search, from narrowest to widest, when a hierarchical
    /// search is requested (spec.md §4.F: "optional hierarchical search").
    fn widen(self) -> Vec<Scope> {
        match self {
            Scope::Project => vec![Scope::Project, Scope::Team, Scope::Org],
            Scope::Team => vec![Scope::Team, Scope::Org],
            Scope::Org => vec![Scope::Org],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationRecord {
    pub id: String,
    pub problem: String,
    pub solution: String,
    pub scope: Scope,
    pub confidence: f64,
    pub usage_count: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct RemediationRecordRequest {
    pub problem: String,
    pub solution: String,
    pub scope: Scope,
}

pub struct RemediationService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl RemediationService {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    pub async fn record(
        &self,
        ctx: &TenantContext,
        request: RemediationRecordRequest,
    ) -> ContextdResult<String> {
        let collection = collection_name(ctx.triple(), KIND);
        self.store.create_collection(&collection).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let record = RemediationRecord {
            id: id.clone(),
            problem: request.problem.clone(),
            solution: request.solution,
            scope: request.scope,
            confidence: 0.5,
            usage_count: 0,
            created_at: chrono::Utc::now(),
        };
        let vector = self.embedder.embed(&request.problem).await?;
        let payload = serde_json::to_value(&record)
            .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
        self.store.upsert(&collection, &id, vector, payload).await?;
        Ok(id)
    }

    /// `remediation/search`. When `hierarchical` is set, widens from `scope`
    /// out to `org`, stopping at the first non-empty result set — narrower
    /// scopes are assumed to be more specific matches.
    pub async fn search(
        &self,
        ctx: &TenantContext,
        query: &str,
        scope: Scope,
        hierarchical: bool,
        limit: usize,
    ) -> ContextdResult<Vec<ScoredRecord<RemediationRecord>>> {
        let collection = collection_name(ctx.triple(), KIND);
        let vector = self.embedder.embed(query).await?;
        let matches = self.store.search(&collection, vector, limit.max(64)).await?;

        let scopes_to_try = if hierarchical { scope.widen() } else { vec![scope] };

        for candidate_scope in scopes_to_try {
            let mut hits = Vec::new();
            for m in &matches {
                let record: RemediationRecord = serde_json::from_value(m.payload.clone())
                    .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
                if record.scope != candidate_scope {
                    continue;
                }
                hits.push(ScoredRecord {
                    relevance: m.score as f64,
                    confidence: record.confidence,
                    usage_count: record.usage_count,
                    outcome: super::Outcome::Unknown,
                    record,
                });
                if hits.len() >= limit {
                    break;
                }
            }
            if !hits.is_empty() {
                return Ok(hits);
            }
        }
        Ok(Vec::new())
    }

    pub async fn feedback(
        &self,
        ctx: &TenantContext,
        id: &str,
        helpful: bool,
    ) -> ContextdResult<f64> {
        let collection = collection_name(ctx.triple(), KIND);
        let Some(payload) = self.store.get(&collection, id).await? else {
            return Err(ContextdError::NotFound(format!("remediation '{id}'")));
        };
        let mut record: RemediationRecord = serde_json::from_value(payload)
            .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
        record.confidence = apply_feedback(record.confidence, helpful);
        record.usage_count += 1;
        let new_confidence = record.confidence;
        let vector = self.embedder.embed(&record.problem).await?;
        let payload = serde_json::to_value(&record)
            .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
        self.store.upsert(&collection, id, vector, payload).await?;
        Ok(new_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_widens_to_team_then_org() {
        assert_eq!(Scope::Project.widen(), vec![Scope::Project, Scope::Team, Scope::Org]);
    }

    #[test]
    fn org_does_not_widen() {
        assert_eq!(Scope::Org.widen(), vec![Scope::Org]);
    }
}
