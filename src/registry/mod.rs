//! Tool registry and discovery engine (spec §4.D).
//!
//! Concurrency follows the teacher's `agent::tools::registry` convention of
//! one shared map guarded by a single lock, generalised here to a
//! `tokio::sync::RwLock` so searches never block each other — the registry
//! is mutated only at start-up, per spec §5's shared-resource policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tokio::sync::RwLock;
use tracing::warn;

pub mod handshake;

#[cfg(test)]
mod tests;

/// Category a tool descriptor belongs to (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Memory,
    Checkpoint,
    Remediation,
    Repository,
    Troubleshoot,
    Folding,
    Conversation,
    Reflection,
    Search,
}

/// Immutable tool catalogue entry, created at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub defer_loading: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_input_schema")]
    pub input_schema: serde_json::Value,
}

fn default_input_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Why a search result matched, in descending-priority order (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    ExactNameMatch,
    NameContainsQuery,
    NameMatchesPattern,
    DescriptionContainsQuery,
    DescriptionMatchesPattern,
    KeywordContainsQuery,
    KeywordMatchesPattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub tool_descriptor: ToolDescriptor,
    pub score: u8,
    pub match_reason: MatchReason,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool descriptor is invalid: {0}")]
    InvalidDescriptor(String),
    #[error("duplicate tool name in batch: {0}")]
    DuplicateInBatch(String),
}

struct Catalogue {
    tools: HashMap<String, ToolDescriptor>,
    /// First-registration order, so search ties break deterministically
    /// instead of following `HashMap`'s unspecified iteration order.
    insertion_order: Vec<String>,
}

impl Catalogue {
    fn insert(&mut self, descriptor: ToolDescriptor) {
        if !self.tools.contains_key(&descriptor.name) {
            self.insertion_order.push(descriptor.name.clone());
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    fn position(&self, name: &str) -> usize {
        self.insertion_order
            .iter()
            .position(|n| n == name)
            .unwrap_or(usize::MAX)
    }
}

/// Holds the catalogue of tool descriptors and answers discovery queries.
pub struct ToolRegistry {
    tools: RwLock<Catalogue>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(Catalogue {
                tools: HashMap::new(),
                insertion_order: Vec::new(),
            }),
        }
    }

    fn validate_descriptor(d: &ToolDescriptor) -> Result<(), RegistryError> {
        if d.name.is_empty() {
            return Err(RegistryError::InvalidDescriptor("name must not be empty".into()));
        }
        if d.description.is_empty() {
            return Err(RegistryError::InvalidDescriptor(
                "description must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Register a single descriptor. Duplicate names overwrite silently.
    pub async fn register(&self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        Self::validate_descriptor(&descriptor)?;
        let mut catalogue = self.tools.write().await;
        if catalogue.tools.contains_key(&descriptor.name) {
            warn!("tool registry: overwriting duplicate tool '{}'", descriptor.name);
        }
        catalogue.insert(descriptor);
        Ok(())
    }

    /// Register a batch atomically: if any name collides with an existing
    /// entry or another entry in the same batch, the whole batch is rejected.
    pub async fn register_all(
        &self,
        descriptors: Vec<ToolDescriptor>,
    ) -> Result<(), RegistryError> {
        for d in &descriptors {
            Self::validate_descriptor(d)?;
        }
        let mut seen = std::collections::HashSet::new();
        for d in &descriptors {
            if !seen.insert(d.name.clone()) {
                return Err(RegistryError::DuplicateInBatch(d.name.clone()));
            }
        }
        let mut catalogue = self.tools.write().await;
        for d in &descriptors {
            if catalogue.tools.contains_key(&d.name) {
                return Err(RegistryError::DuplicateInBatch(d.name.clone()));
            }
        }
        for d in descriptors {
            catalogue.insert(d);
        }
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.read().await.tools.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<_> = self.tools.read().await.tools.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn list_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.read().await.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn list_by_category(&self, category: ToolCategory) -> Vec<ToolDescriptor> {
        let mut out: Vec<_> = self
            .tools
            .read()
            .await
            .tools
            .values()
            .filter(|d| d.category == category)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn list_deferred(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<_> = self
            .tools
            .read()
            .await
            .tools
            .values()
            .filter(|d| d.defer_loading)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn list_non_deferred(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<_> = self
            .tools
            .read()
            .await
            .tools
            .values()
            .filter(|d| !d.defer_loading)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn count(&self) -> usize {
        self.tools.read().await.tools.len()
    }

    /// Full-catalogue search. See `score_descriptor` for the ranking rule.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        self.search_filtered(query, |_| true).await
    }

    pub async fn search_by_category(&self, query: &str, category: ToolCategory) -> Vec<SearchResult> {
        self.search_filtered(query, |d| d.category == category).await
    }

    async fn search_filtered(
        &self,
        query: &str,
        filter: impl Fn(&ToolDescriptor) -> bool,
    ) -> Vec<SearchResult> {
        if query.is_empty() {
            return Vec::new();
        }

        let pattern = regex::RegexBuilder::new(query)
            .case_insensitive(true)
            .build();

        let catalogue = self.tools.read().await;
        let mut results: Vec<SearchResult> = catalogue
            .tools
            .values()
            .filter(|d| filter(d))
            .filter_map(|d| {
                score_descriptor(d, query, pattern.as_ref().ok()).map(|(score, reason)| {
                    (
                        catalogue.position(&d.name),
                        SearchResult {
                            tool_descriptor: d.clone(),
                            score,
                            match_reason: reason,
                        },
                    )
                })
            })
            .collect();

        // Stable sort by score descending; ties keep registration order, per
        // spec §4.D — `insertion_order` stands in for the map iteration order
        // a real linked hash map would give for free.
        results.sort_by(|(a_pos, a), (b_pos, b)| b.score.cmp(&a.score).then_with(|| a_pos.cmp(b_pos)));
        results.into_iter().map(|(_, r)| r).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Score a descriptor against a query, walking checks in priority order and
/// stopping at the first hit (spec §4.D). Returns `None` on no match.
///
/// `pattern` is `None` when the query failed to compile as a regex; the
/// function then degrades every regex-based check to a no-op, leaving the
/// literal-contains checks as the only way to match (spec §4.D, §7).
fn score_descriptor(
    d: &ToolDescriptor,
    query: &str,
    pattern: Option<&regex::Regex>,
) -> Option<(u8, MatchReason)> {
    let lowered_query = query.to_lowercase();
    let lowered_name = d.name.to_lowercase();

    if lowered_name == lowered_query {
        return Some((3, MatchReason::ExactNameMatch));
    }
    if lowered_name.contains(&lowered_query) {
        return Some((2, MatchReason::NameContainsQuery));
    }
    if pattern.is_some_and(|p| p.is_match(&d.name)) {
        return Some((2, MatchReason::NameMatchesPattern));
    }
    if d.description.to_lowercase().contains(&lowered_query) {
        return Some((1, MatchReason::DescriptionContainsQuery));
    }
    if pattern.is_some_and(|p| p.is_match(&d.description)) {
        return Some((1, MatchReason::DescriptionMatchesPattern));
    }
    if d.keywords.iter().any(|k| k.to_lowercase().contains(&lowered_query)) {
        return Some((1, MatchReason::KeywordContainsQuery));
    }
    if let Some(p) = pattern
        && d.keywords.iter().any(|k| p.is_match(k))
    {
        return Some((1, MatchReason::KeywordMatchesPattern));
    }
    None
}

/// Builds the fixed, non-deferred default catalogue: the core discovery
/// tool plus the top semantic and memory search tools (spec §4.D). Every
/// other built-in tool defers.
pub static DEFAULT_NON_DEFERRED: LazyLock<[&str; 3]> =
    LazyLock::new(|| ["tool_search", "semantic_search", "memory_search"]);
