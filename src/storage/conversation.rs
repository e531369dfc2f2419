//! Conversation history indexing and search (spec.md §4.F:
//! `conversation_index`/`conversation_search`).

use super::{collection_name, EmbeddingProvider, VectorStore};
use crate::errors::{ContextdError, ContextdResult};
use crate::security::SecretScrubber;
use crate::tenant::TenantContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KIND: &str = "conversation";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct ConversationIndexRequest {
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationIndexResponse {
    pub turns_indexed: usize,
    pub collection_name: String,
}

/// A conversation-search hit. `content` is always scrubbed before leaving
/// the service, the same guarantee every other storage search gives (spec.md
/// §6: no secret survives a storage round trip).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSearchResult {
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub score: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct ConversationService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    scrubber: Arc<SecretScrubber>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        scrubber: Arc<SecretScrubber>,
    ) -> Self {
        Self {
            store,
            embedder,
            scrubber,
        }
    }

    pub async fn index(
        &self,
        ctx: &TenantContext,
        request: ConversationIndexRequest,
    ) -> ContextdResult<ConversationIndexResponse> {
        let collection = collection_name(ctx.triple(), KIND);
        self.store.create_collection(&collection).await?;

        let mut indexed = 0;
        for turn in &request.turns {
            let scrubbed = ConversationTurn {
                content: self.scrubber.scrub(&turn.content).scrubbed,
                ..turn.clone()
            };
            let id = format!(
                "{}-{}-{}",
                scrubbed.session_id,
                scrubbed.created_at.timestamp_nanos_opt().unwrap_or_default(),
                indexed
            );
            let vector = self.embedder.embed(&scrubbed.content).await?;
            let payload = serde_json::to_value(&scrubbed)
                .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
            self.store.upsert(&collection, &id, vector, payload).await?;
            indexed += 1;
        }

        Ok(ConversationIndexResponse {
            turns_indexed: indexed,
            collection_name: collection,
        })
    }

    pub async fn search(
        &self,
        ctx: &TenantContext,
        query: &str,
        limit: usize,
    ) -> ContextdResult<Vec<ConversationSearchResult>> {
        let collection = collection_name(ctx.triple(), KIND);
        let vector = self.embedder.embed(query).await?;
        let matches = self.store.search(&collection, vector, limit).await?;

        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            let turn: ConversationTurn = serde_json::from_value(m.payload)
                .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
            out.push(ConversationSearchResult {
                session_id: turn.session_id,
                role: turn.role,
                content: turn.content,
                score: m.score as f64,
                created_at: turn.created_at,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecretScrubber;

    #[test]
    fn scrubber_redacts_before_serialisation() {
        let scrubber = SecretScrubber::new();
        let result = scrubber.scrub("token sk-ant-REDACTED");
        assert!(result.scrubbed.contains("[REDACTED]"));
    }
}
