//! Checkpoint storage service (spec.md §4.F: `save/list/resume`).

use super::{collection_name, EmbeddingProvider, VectorStore};
use crate::errors::{ContextdError, ContextdResult};
use crate::tenant::TenantContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KIND: &str = "checkpoint";

/// How much stored content `resume` returns, and therefore how many tokens
/// reappear in the assistant's window (spec.md §3 glossary, "Resume level").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeLevel {
    Summary,
    Context,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: String,
    pub summary: String,
    pub context: String,
    pub full_content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct CheckpointSaveRequest {
    pub summary: String,
    pub context: String,
    pub full_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointListEntry {
    pub id: String,
    pub summary: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointResumeResponse {
    pub id: String,
    pub level: ResumeLevel,
    pub content: String,
}

pub struct CheckpointService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl CheckpointService {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    pub async fn save(
        &self,
        ctx: &TenantContext,
        request: CheckpointSaveRequest,
    ) -> ContextdResult<String> {
        let collection = collection_name(ctx.triple(), KIND);
        self.store.create_collection(&collection).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let record = CheckpointRecord {
            id: id.clone(),
            summary: request.summary,
            context: request.context,
            full_content: request.full_content,
            created_at: chrono::Utc::now(),
        };
        let vector = self.embedder.embed(&record.summary).await?;
        let payload = serde_json::to_value(&record)
            .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
        self.store.upsert(&collection, &id, vector, payload).await?;
        Ok(id)
    }

    pub async fn list(&self, ctx: &TenantContext) -> ContextdResult<Vec<CheckpointListEntry>> {
        let collection = collection_name(ctx.triple(), KIND);
        let vector = self.embedder.embed("").await?;
        let matches = self.store.search(&collection, vector, usize::MAX).await?;
        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            let record: CheckpointRecord = serde_json::from_value(m.payload)
                .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
            out.push(CheckpointListEntry {
                id: record.id,
                summary: record.summary,
                created_at: record.created_at,
            });
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    pub async fn resume(
        &self,
        ctx: &TenantContext,
        id: &str,
        level: ResumeLevel,
    ) -> ContextdResult<CheckpointResumeResponse> {
        let collection = collection_name(ctx.triple(), KIND);
        let Some(payload) = self.store.get(&collection, id).await? else {
            return Err(ContextdError::NotFound(format!("checkpoint '{id}'")));
        };
        let record: CheckpointRecord = serde_json::from_value(payload)
            .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
        let content = match level {
            ResumeLevel::Summary => record.summary,
            ResumeLevel::Context => record.context,
            ResumeLevel::Full => record.full_content,
        };
        Ok(CheckpointResumeResponse {
            id: id.to_string(),
            level,
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_level_wire_form_is_snake_case() {
        let value = serde_json::to_value(ResumeLevel::Context).unwrap();
        assert_eq!(value, serde_json::json!("context"));
    }
}
