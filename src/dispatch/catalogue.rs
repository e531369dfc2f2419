//! Built-in tool catalogue (spec.md §4.F "Tool contract registry").
//!
//! Registered once at start-up via [`populate_defaults`]; the registry is
//! read-only from then on (spec.md §5's shared-resource policy).

use crate::registry::{ToolCategory, ToolDescriptor, ToolRegistry};
use serde_json::json;

fn descriptor(
    name: &str,
    description: &str,
    category: ToolCategory,
    defer_loading: bool,
    keywords: &[&str],
    input_schema: serde_json::Value,
) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        category,
        defer_loading,
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        input_schema,
    }
}

/// Register every built-in tool. `tool_search`, `semantic_search`, and
/// `memory_search` are the fixed non-deferred triple (spec.md §4.D); every
/// other tool defers and is only discoverable via `tool_search`.
pub async fn populate_defaults(registry: &ToolRegistry) -> Result<(), crate::registry::RegistryError> {
    let tools = vec![
        descriptor(
            "tool_search",
            "Search the tool catalogue by name, description, or keyword",
            ToolCategory::Search,
            false,
            &["discover", "catalogue", "tools"],
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "tool_list",
            "List registered tools, optionally filtered by category",
            ToolCategory::Search,
            true,
            &["inventory", "catalogue"],
            json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string"},
                    "deferred_only": {"type": "boolean"}
                },
                "additionalProperties": false
            }),
        ),
        descriptor(
            "semantic_search",
            "Vector search over indexed repository content with pattern-search fallback",
            ToolCategory::Search,
            false,
            &["vector", "embedding", "repository"],
            repository_search_schema(),
        ),
        descriptor(
            "memory_search",
            "Top-k retrieval over recorded memories and strategies",
            ToolCategory::Memory,
            false,
            &["recall", "strategy"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "required": ["project_path", "query"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "memory_record",
            "Persist a new memory with an outcome label",
            ToolCategory::Memory,
            true,
            &["remember", "strategy"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "content": {"type": "string"},
                    "outcome": {"type": "string"}
                },
                "required": ["project_path", "content"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "memory_feedback",
            "Report whether a recalled memory was helpful",
            ToolCategory::Memory,
            true,
            &["feedback", "confidence"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "id": {"type": "string"},
                    "helpful": {"type": "boolean"}
                },
                "required": ["project_path", "id", "helpful"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "memory_outcome",
            "Report a post-hoc success/failure outcome for a memory",
            ToolCategory::Memory,
            true,
            &["outcome", "confidence"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "id": {"type": "string"},
                    "succeeded": {"type": "boolean"}
                },
                "required": ["project_path", "id", "succeeded"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "memory_consolidate",
            "Cluster similar memories and synthesise a consolidated record",
            ToolCategory::Memory,
            true,
            &["consolidate", "cluster", "dedupe"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "similarity_threshold": {"type": "number", "minimum": 0, "maximum": 1},
                    "dry_run": {"type": "boolean"},
                    "max_clusters": {"type": "integer", "minimum": 1}
                },
                "required": ["project_path"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "checkpoint_save",
            "Save a checkpoint with summary, context, and full content",
            ToolCategory::Checkpoint,
            true,
            &["save", "snapshot"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "summary": {"type": "string"},
                    "context": {"type": "string"},
                    "full_content": {"type": "string"}
                },
                "required": ["project_path", "summary", "context", "full_content"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "checkpoint_list",
            "List saved checkpoints, most recent first",
            ToolCategory::Checkpoint,
            true,
            &["list", "snapshot"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"}
                },
                "required": ["project_path"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "checkpoint_resume",
            "Resume a checkpoint at a given resume level",
            ToolCategory::Checkpoint,
            true,
            &["resume", "restore"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "id": {"type": "string"},
                    "level": {"type": "string", "enum": ["summary", "context", "full"]}
                },
                "required": ["project_path", "id"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "remediation_search",
            "Search recorded remediations, optionally widening scope hierarchically",
            ToolCategory::Remediation,
            true,
            &["fix", "troubleshoot"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "query": {"type": "string"},
                    "scope": {"type": "string", "enum": ["project", "team", "org"]},
                    "hierarchical": {"type": "boolean"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "required": ["project_path", "query"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "remediation_record",
            "Record a problem/solution remediation at a scope",
            ToolCategory::Remediation,
            true,
            &["fix", "record"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "problem": {"type": "string"},
                    "solution": {"type": "string"},
                    "scope": {"type": "string", "enum": ["project", "team", "org"]}
                },
                "required": ["project_path", "problem", "solution", "scope"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "remediation_feedback",
            "Report whether a remediation was helpful",
            ToolCategory::Remediation,
            true,
            &["feedback"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "id": {"type": "string"},
                    "helpful": {"type": "boolean"}
                },
                "required": ["project_path", "id", "helpful"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "repository_index",
            "Index a directory tree honouring include/exclude globs",
            ToolCategory::Repository,
            true,
            &["index", "ingest"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "include": {"type": "array", "items": {"type": "string"}},
                    "exclude": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["project_path"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "repository_search",
            "Vector search over an indexed repository",
            ToolCategory::Repository,
            true,
            &["get_user_data", "get_project_data"],
            repository_search_schema(),
        ),
        descriptor(
            "diagnose",
            "Diagnose a reported problem using an external troubleshooting backend",
            ToolCategory::Troubleshoot,
            true,
            &["troubleshoot", "diagnose"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "description": {"type": "string"}
                },
                "required": ["project_path", "description"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "branch_create",
            "Create a context-folding branch with a bounded token budget",
            ToolCategory::Folding,
            true,
            &["branch", "subtask", "fold"],
            json!({
                "type": "object",
                "properties": {
                    "session_id": {"type": "string"},
                    "description": {"type": "string"},
                    "prompt": {"type": "string"},
                    "budget": {"type": "integer", "minimum": 1},
                    "timeout_seconds": {"type": "integer", "minimum": 1}
                },
                "required": ["session_id", "description"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "branch_return",
            "Return from a context-folding branch",
            ToolCategory::Folding,
            true,
            &["branch", "return"],
            json!({
                "type": "object",
                "properties": {
                    "branch_id": {"type": "string"},
                    "message": {"type": "string"}
                },
                "required": ["branch_id", "message"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "branch_status",
            "Inspect a context-folding branch",
            ToolCategory::Folding,
            true,
            &["branch", "status"],
            json!({
                "type": "object",
                "properties": {
                    "branch_id": {"type": "string"}
                },
                "required": ["branch_id"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "conversation_index",
            "Index past conversation turns for later retrieval",
            ToolCategory::Conversation,
            true,
            &["conversation", "history"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "turns": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "session_id": {"type": "string"},
                                "role": {"type": "string"},
                                "content": {"type": "string"}
                            },
                            "required": ["session_id", "role", "content"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["project_path", "turns"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "conversation_search",
            "Search indexed past conversation turns",
            ToolCategory::Conversation,
            true,
            &["conversation", "history"],
            json!({
                "type": "object",
                "properties": {
                    "project_path": {"type": "string"},
                    "tenant_id": {"type": "string"},
                    "team_id": {"type": "string"},
                    "project_id": {"type": "string"},
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "required": ["project_path", "query"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "reflection_report",
            "Produce a reflective report using an external analysis backend",
            ToolCategory::Reflection,
            true,
            &["reflect", "report"],
            json!({
                "type": "object",
                "properties": {"project_path": {"type": "string"}},
                "required": ["project_path"],
                "additionalProperties": false
            }),
        ),
        descriptor(
            "reflection_analyze",
            "Analyze session history using an external analysis backend",
            ToolCategory::Reflection,
            true,
            &["reflect", "analyze"],
            json!({
                "type": "object",
                "properties": {"project_path": {"type": "string"}},
                "required": ["project_path"],
                "additionalProperties": false
            }),
        ),
    ];

    for tool in tools {
        registry.register(tool).await?;
    }
    Ok(())
}

fn repository_search_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "project_path": {"type": "string"},
            "tenant_id": {"type": "string"},
            "team_id": {"type": "string"},
            "project_id": {"type": "string"},
            "query": {"type": "string"},
            "content_mode": {"type": "string", "enum": ["minimal", "preview", "full"]},
            "limit": {"type": "integer", "minimum": 1}
        },
        "required": ["project_path", "query"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;

    #[tokio::test]
    async fn populate_defaults_registers_the_fixed_non_deferred_triple() {
        let registry = ToolRegistry::new();
        populate_defaults(&registry).await.unwrap();
        let non_deferred = registry.list_non_deferred().await;
        let mut names: Vec<&str> = non_deferred.iter().map(|t| t.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["memory_search", "semantic_search", "tool_search"]);
    }

    #[tokio::test]
    async fn populate_defaults_is_idempotent() {
        let registry = ToolRegistry::new();
        populate_defaults(&registry).await.unwrap();
        populate_defaults(&registry).await.unwrap();
        assert_eq!(registry.count().await, 24);
    }
}
