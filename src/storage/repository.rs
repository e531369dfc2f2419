//! Repository indexing and search (spec.md §4.F: `repository_index`,
//! `repository_search`/`semantic_search`).

use super::{collection_name, EmbeddingProvider, VectorStore};
use crate::errors::{ContextdError, ContextdResult};
use crate::security::SecretScrubber;
use crate::tenant::TenantContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KIND: &str = "repository";

/// Output shape for `repository_search` (spec.md §4.F, §6). Validation
/// rejects any other mode, including case variants (`"FULL"` is invalid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    Minimal,
    Preview,
    Full,
}

impl ContentMode {
    pub fn parse(raw: &str) -> ContextdResult<Self> {
        match raw {
            "minimal" => Ok(Self::Minimal),
            "preview" => Ok(Self::Preview),
            "full" => Ok(Self::Full),
            other => Err(ContextdError::InvalidInput {
                field: "content_mode".to_string(),
                message: format!("unsupported content_mode '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFile {
    pub file_path: String,
    pub content: String,
    pub branch: String,
}

pub struct IndexRequest {
    pub files: Vec<IndexedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResponse {
    pub files_indexed: usize,
    pub collection_name: String,
}

/// One repository-search hit, shaped according to `content_mode` (spec.md
/// §6). Fields absent for a given mode serialize as `None` (omitted on the
/// wire via `skip_serializing_if`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSearchResult {
    pub file_path: String,
    pub score: f64,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

const PREVIEW_CODE_POINTS: usize = 200;

pub struct RepositoryService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    scrubber: Arc<SecretScrubber>,
}

impl RepositoryService {
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
        request: IndexRequest,
    ) -> ContextdResult<IndexResponse> {
        let collection = collection_name(ctx.triple(), KIND);
        self.store.create_collection(&collection).await?;

        let mut indexed = 0;
        for file in &request.files {
            let vector = self.embedder.embed(&file.content).await?;
            let payload = serde_json::to_value(file)
                .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
            self.store
                .upsert(&collection, &file.file_path, vector, payload)
                .await?;
            indexed += 1;
        }

        Ok(IndexResponse {
            files_indexed: indexed,
            collection_name: collection,
        })
    }

    /// `repository_search`: vector search over the indexed corpus, shaped
    /// by `content_mode`. `content_preview` truncates at 200 *code points*
    /// (never bytes), so a multi-byte UTF-8 character is never split.
    pub async fn search(
        &self,
        ctx: &TenantContext,
        query: &str,
        content_mode: ContentMode,
        limit: usize,
    ) -> ContextdResult<Vec<RepoSearchResult>> {
        let collection = collection_name(ctx.triple(), KIND);
        let vector = self.embedder.embed(query).await?;
        let matches = self.store.search(&collection, vector, limit).await?;

        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            let file: IndexedFile = serde_json::from_value(m.payload.clone())
                .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
            out.push(self.shape_result(file, m.score as f64, content_mode));
        }
        Ok(out)
    }

    /// `semantic_search`: degrades to a literal pattern search over the
    /// indexed corpus when the vector search returns nothing or fails
    /// (spec.md §4.F, §7). The literal pass matches `query` as a
    /// case-insensitive substring of the stored content.
    pub async fn semantic_search(
        &self,
        ctx: &TenantContext,
        query: &str,
        content_mode: ContentMode,
        limit: usize,
    ) -> ContextdResult<Vec<RepoSearchResult>> {
        match self.search(ctx, query, content_mode, limit).await {
            Ok(hits) if !hits.is_empty() => Ok(hits),
            _ => self.pattern_search(ctx, query, content_mode, limit).await,
        }
    }

    async fn pattern_search(
        &self,
        ctx: &TenantContext,
        query: &str,
        content_mode: ContentMode,
        limit: usize,
    ) -> ContextdResult<Vec<RepoSearchResult>> {
        let collection = collection_name(ctx.triple(), KIND);
        // An all-zero probe vector paired with a generous limit approximates
        // "list everything indexed" against a real vector store, which is
        // then filtered literally — the fallback this function exists for.
        let probe = self.embedder.embed("").await?;
        let matches = self.store.search(&collection, probe, usize::MAX).await?;
        let lowered_query = query.to_lowercase();

        let mut out = Vec::new();
        for m in matches {
            let file: IndexedFile = serde_json::from_value(m.payload.clone())
                .map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
            if file.content.to_lowercase().contains(&lowered_query) {
                out.push(self.shape_result(file, 0.0, content_mode));
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn shape_result(
        &self,
        file: IndexedFile,
        score: f64,
        content_mode: ContentMode,
    ) -> RepoSearchResult {
        let mut result = RepoSearchResult {
            file_path: file.file_path.clone(),
            score,
            branch: file.branch.clone(),
            content_preview: None,
            content: None,
            metadata: None,
        };
        match content_mode {
            ContentMode::Minimal => {}
            ContentMode::Preview => {
                result.content_preview = Some(truncate_code_points(&file.content, PREVIEW_CODE_POINTS));
            }
            ContentMode::Full => {
                result.content = Some(self.scrubber.scrub(&file.content).scrubbed);
                result.metadata = Some(serde_json::json!({ "file_path": file.file_path }));
            }
        }
        result
    }
}

/// Truncate to at most `limit` code points, appending `...` if truncated.
/// Counts `chars()`, never bytes, so a multi-byte code point is never split
/// (spec.md §6).
fn truncate_code_points(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_mode_rejects_case_variants() {
        assert!(ContentMode::parse("FULL").is_err());
        assert!(ContentMode::parse("Full").is_err());
    }

    #[test]
    fn content_mode_parses_known_values() {
        assert_eq!(ContentMode::parse("minimal").unwrap(), ContentMode::Minimal);
        assert_eq!(ContentMode::parse("preview").unwrap(), ContentMode::Preview);
        assert_eq!(ContentMode::parse("full").unwrap(), ContentMode::Full);
    }

    #[test]
    fn truncate_never_splits_a_code_point() {
        let text = "a".repeat(199) + "\u{1F600}\u{1F600}";
        let truncated = truncate_code_points(&text, 200);
        assert!(truncated.ends_with("...") || truncated.chars().count() <= 200);
        assert!(String::from_utf8(truncated.into_bytes()).is_ok());
    }

    #[test]
    fn short_text_is_not_truncated() {
        assert_eq!(truncate_code_points("hello", 200), "hello");
    }
}
