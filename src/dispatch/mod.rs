//! Tool dispatcher (spec.md §4.F).
//!
//! Grounded on the teacher's `agent::tools::registry::ToolRegistry::execute`
//! three-phase middleware pipeline (validate → spawn-with-timeout-and-panic-
//! guard → after_execute). Here the phases are fixed per spec.md's seven-step
//! contract rather than a pluggable middleware chain, since every dispatched
//! tool must run the same sequence: parse → validate → derive tenant →
//! start metrics → call service → scrub output → shape result.

pub mod catalogue;

use crate::branch::{BranchCreateRequest, BranchManager};
use crate::errors::{ContextdError, ContextdResult};
use crate::metrics::MetricsRecorder;
use crate::registry::handshake::{build_handshake, tool_reference_blocks, Handshake};
use crate::registry::ToolRegistry;
use crate::security::SecretScrubber;
use crate::storage::checkpoint::{CheckpointSaveRequest, CheckpointService, ResumeLevel};
use crate::storage::conversation::{ConversationIndexRequest, ConversationService, ConversationTurn};
use crate::storage::memory::{ConsolidateRequest, MemoryRecordRequest, MemoryService};
use crate::storage::remediation::{RemediationRecordRequest, RemediationService, Scope};
use crate::storage::repository::{ContentMode, IndexRequest, IndexedFile, RepositoryService};
use crate::storage::{EmbeddingProvider, Outcome, VectorStore};
use crate::tenant::{derive_tenant_for_path, TenantContext, TenantTriple};
use crate::validation::validate_project_path;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::timeout;
use tracing::{error, warn};

/// Every tool invocation is bounded so a stuck storage/embedding
/// collaborator can never wedge the dispatcher (spec.md §5: "the dispatcher
/// must not block other invocations").
const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    branches: BranchManager,
    metrics: MetricsRecorder,
    scrubber: Arc<SecretScrubber>,
    memory: Arc<MemoryService>,
    checkpoint: Arc<CheckpointService>,
    remediation: Arc<RemediationService>,
    repository: Arc<RepositoryService>,
    conversation: Arc<ConversationService>,
    server_name: String,
    server_version: String,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        branches: BranchManager,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        scrubber: Arc<SecretScrubber>,
        server_name: impl Into<String>,
        server_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            branches,
            metrics: MetricsRecorder::new(),
            memory: Arc::new(MemoryService::new(store.clone(), embedder.clone())),
            checkpoint: Arc::new(CheckpointService::new(store.clone(), embedder.clone())),
            remediation: Arc::new(RemediationService::new(store.clone(), embedder.clone())),
            repository: Arc::new(RepositoryService::new(
                store.clone(),
                embedder.clone(),
                scrubber.clone(),
            )),
            conversation: Arc::new(ConversationService::new(store, embedder, scrubber.clone())),
            scrubber,
            server_name: server_name.into(),
            server_version: server_version.into(),
        }
    }

    pub async fn handshake(&self) -> Handshake {
        build_handshake(&self.registry, &self.server_name, &self.server_version).await
    }

    /// Dispatch one tool call by name (spec.md §4.F's seven-step contract).
    /// Steps 1-2 (schema + path/ID validation) and 4 (metrics) wrap every
    /// branch of the match below uniformly; each tool only supplies its own
    /// step 3/5/6/7 logic.
    pub async fn dispatch(&self, tool: &str, params: Value) -> ContextdResult<Value> {
        self.validate_schema(tool, &params).await?;

        let timer = self.metrics.start_timer(tool);
        let outcome = self.run_with_guard(tool, params).await;

        match &outcome {
            Ok(_) => timer.finish(&self.metrics, None),
            Err(e) => timer.finish(&self.metrics, Some(e.metrics_reason())),
        }
        outcome
    }

    /// Step 1: strict JSON-schema validation, unknown fields rejected
    /// (every built-in schema sets `additionalProperties: false`).
    async fn validate_schema(&self, tool: &str, params: &Value) -> ContextdResult<()> {
        let descriptor = self
            .registry
            .get(tool)
            .await
            .ok_or_else(|| ContextdError::NotFound(format!("tool '{tool}'")))?;

        let validator = jsonschema::validator_for(&descriptor.input_schema).map_err(|e| {
            ContextdError::Internal(anyhow::anyhow!("invalid built-in schema for {tool}: {e}"))
        })?;
        if validator.is_valid(params) {
            return Ok(());
        }
        let messages: Vec<String> = validator.iter_errors(params).map(|e| e.to_string()).collect();
        Err(ContextdError::InvalidInput {
            field: tool.to_string(),
            message: messages.join("; "),
        })
    }

    /// Runs the tool body in its own task with a timeout and panic guard,
    /// mirroring the teacher's `execute_with_guards` (spawn + `tokio::time::
    /// timeout` + `JoinError::is_panic()` check) so a stuck or panicking
    /// handler never takes the dispatcher down with it.
    async fn run_with_guard(&self, tool: &str, params: Value) -> ContextdResult<Value> {
        let this = self.clone_handles();
        let tool_owned = tool.to_string();
        let handle =
            tokio::spawn(async move { this.call(&tool_owned, params).await });

        match timeout(TOOL_TIMEOUT, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Self::describe_join_error(tool, join_err)),
            Err(_) => Err(ContextdError::Timeout(TOOL_TIMEOUT)),
        }
    }

    fn describe_join_error(tool: &str, join_err: JoinError) -> ContextdError {
        if join_err.is_panic() {
            error!(tool, "tool handler panicked");
            ContextdError::Internal(anyhow::anyhow!("tool '{tool}' panicked"))
        } else {
            warn!(tool, "tool handler task was cancelled");
            ContextdError::Internal(anyhow::anyhow!("tool '{tool}' was cancelled"))
        }
    }

    /// A cheap `Arc`-cloned handle bundle so the spawned task in
    /// `run_with_guard` can own its copy without borrowing `self`.
    fn clone_handles(&self) -> DispatcherHandles {
        DispatcherHandles {
            branches: self.branches.clone(),
            registry: self.registry.clone(),
            scrubber: self.scrubber.clone(),
            memory: self.memory.clone(),
            checkpoint: self.checkpoint.clone(),
            remediation: self.remediation.clone(),
            repository: self.repository.clone(),
            conversation: self.conversation.clone(),
        }
    }
}

/// The subset of `Dispatcher` state a spawned tool body needs. Kept
/// `Clone`-cheap (every field is an `Arc` or an `Arc`-backed handle).
#[derive(Clone)]
struct DispatcherHandles {
    branches: BranchManager,
    registry: Arc<ToolRegistry>,
    scrubber: Arc<SecretScrubber>,
    memory: Arc<MemoryService>,
    checkpoint: Arc<CheckpointService>,
    remediation: Arc<RemediationService>,
    repository: Arc<RepositoryService>,
    conversation: Arc<ConversationService>,
}

impl DispatcherHandles {
    async fn call(&self, tool: &str, params: Value) -> ContextdResult<Value> {
        match tool {
            "tool_search" => self.tool_search(params).await,
            "tool_list" => self.tool_list(params).await,
            "memory_search" => self.memory_search(params).await,
            "semantic_search" | "repository_search" => self.repository_search(tool, params).await,
            "memory_record" => self.memory_record(params).await,
            "memory_feedback" => self.memory_feedback(params).await,
            "memory_outcome" => self.memory_outcome(params).await,
            "memory_consolidate" => self.memory_consolidate(params).await,
            "checkpoint_save" => self.checkpoint_save(params).await,
            "checkpoint_list" => self.checkpoint_list(params).await,
            "checkpoint_resume" => self.checkpoint_resume(params).await,
            "remediation_search" => self.remediation_search(params).await,
            "remediation_record" => self.remediation_record(params).await,
            "remediation_feedback" => self.remediation_feedback(params).await,
            "repository_index" => self.repository_index(params).await,
            "branch_create" => self.branch_create(params).await,
            "branch_return" => self.branch_return(params).await,
            "branch_status" => self.branch_status(params).await,
            "conversation_index" => self.conversation_index(params).await,
            "conversation_search" => self.conversation_search(params).await,
            "diagnose" => Err(out_of_core("diagnose", "a troubleshooting LLM backend")),
            "reflection_report" | "reflection_analyze" => {
                Err(out_of_core(tool, "a session-analysis backend"))
            }
            other => Err(ContextdError::NotFound(format!("tool '{other}'"))),
        }
    }

    // --- Step 3 helper: tenant derivation and context injection (§4.C) ---

    /// Builds the tenant context a tool needs from its `project_path` (and
    /// optional explicit `tenant_id`/`team_id`/`project_id`). Fails closed:
    /// any validation failure aborts before a storage service is ever
    /// reached (spec.md §4.C, tested by scenario 6 in spec.md §8).
    fn resolve_tenant(&self, params: &Value) -> ContextdResult<TenantContext> {
        let raw_path = params
            .get("project_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ContextdError::InvalidInput {
                field: "project_path".to_string(),
                message: "required".to_string(),
            })?;
        let canonical = validate_project_path(raw_path, None)?;

        let tenant_id = match params.get("tenant_id").and_then(Value::as_str) {
            Some(explicit) => explicit.to_string(),
            None => derive_tenant_for_path(&canonical)?,
        };
        let team_id = params
            .get("team_id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let project_id = params
            .get("project_id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let triple = TenantTriple::new(tenant_id, team_id, project_id)?;
        Ok(TenantContext::new(triple))
    }

    fn string_field(params: &Value, field: &str) -> ContextdResult<String> {
        params
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ContextdError::InvalidInput {
                field: field.to_string(),
                message: "required".to_string(),
            })
    }

    fn limit_or(params: &Value, default: usize) -> usize {
        params
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(default)
    }

    /// Step 6: scrub every string leaf of a response value before it leaves
    /// the dispatcher (spec.md §4.B, §4.F). Safe to apply broadly since
    /// scrubbing is idempotent.
    fn scrub_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.scrubber.scrub(s).scrubbed),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.scrub_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.scrub_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn shape<T: serde::Serialize>(&self, value: &T) -> ContextdResult<Value> {
        let raw = serde_json::to_value(value).map_err(|e| ContextdError::Internal(anyhow::anyhow!(e)))?;
        Ok(self.scrub_value(&raw))
    }

    // --- Search / discovery ---

    async fn tool_search(&self, params: Value) -> ContextdResult<Value> {
        let query = Self::string_field(&params, "query")?;
        let limit = Self::limit_or(&params, usize::MAX);
        let mut results = self.registry.search(&query).await;
        results.truncate(limit);
        let blocks = tool_reference_blocks(&results);
        self.shape(&json!({
            "count": results.len(),
            "results": results,
            "tool_references": blocks,
        }))
    }

    async fn tool_list(&self, params: Value) -> ContextdResult<Value> {
        let deferred_only = params
            .get("deferred_only")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let tools = if let Some(category) = params.get("category").and_then(Value::as_str) {
            let category = parse_category(category)?;
            self.registry.list_by_category(category).await
        } else if deferred_only {
            self.registry.list_deferred().await
        } else {
            self.registry.list().await
        };
        self.shape(&json!({ "count": tools.len(), "tools": tools }))
    }

    // --- Memory ---

    async fn memory_search(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let query = Self::string_field(&params, "query")?;
        let limit = Self::limit_or(&params, 10);
        let results = self.memory.search(&ctx, &query, limit).await?;
        self.shape(&json!({ "count": results.len(), "results": results }))
    }

    async fn memory_record(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let content = Self::string_field(&params, "content")?;
        let outcome = parse_outcome(params.get("outcome").and_then(Value::as_str).unwrap_or("unknown"))?;
        let id = self
            .memory
            .record(&ctx, MemoryRecordRequest { content, outcome })
            .await?;
        self.shape(&json!({ "id": id }))
    }

    async fn memory_feedback(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let id = Self::string_field(&params, "id")?;
        let helpful = params
            .get("helpful")
            .and_then(Value::as_bool)
            .ok_or_else(|| ContextdError::InvalidInput {
                field: "helpful".to_string(),
                message: "required".to_string(),
            })?;
        let confidence = self.memory.feedback(&ctx, &id, helpful).await?;
        self.shape(&json!({ "id": id, "confidence": confidence }))
    }

    async fn memory_outcome(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let id = Self::string_field(&params, "id")?;
        let succeeded = params
            .get("succeeded")
            .and_then(Value::as_bool)
            .ok_or_else(|| ContextdError::InvalidInput {
                field: "succeeded".to_string(),
                message: "required".to_string(),
            })?;
        let confidence = self.memory.outcome(&ctx, &id, succeeded).await?;
        self.shape(&json!({ "id": id, "confidence": confidence }))
    }

    async fn memory_consolidate(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let similarity_threshold = params
            .get("similarity_threshold")
            .and_then(Value::as_f64)
            .unwrap_or(0.8);
        let dry_run = params.get("dry_run").and_then(Value::as_bool).unwrap_or(false);
        let max_clusters = params
            .get("max_clusters")
            .and_then(Value::as_u64)
            .map(|n| n as usize);
        // The corpus to cluster is the full, non-archived set of memories;
        // a broad search against an empty query vector approximates "all".
        let all = self
            .memory
            .search(&ctx, "", usize::MAX)
            .await?
            .into_iter()
            .map(|scored| scored.record)
            .collect();
        let response = self
            .memory
            .consolidate(
                &ctx,
                all,
                ConsolidateRequest {
                    similarity_threshold,
                    dry_run,
                    max_clusters,
                },
            )
            .await?;
        self.shape(&response)
    }

    // --- Checkpoint ---

    async fn checkpoint_save(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let request = CheckpointSaveRequest {
            summary: Self::string_field(&params, "summary")?,
            context: Self::string_field(&params, "context")?,
            full_content: Self::string_field(&params, "full_content")?,
        };
        let id = self.checkpoint.save(&ctx, request).await?;
        self.shape(&json!({ "id": id }))
    }

    async fn checkpoint_list(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let entries = self.checkpoint.list(&ctx).await?;
        self.shape(&json!({ "count": entries.len(), "checkpoints": entries }))
    }

    async fn checkpoint_resume(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let id = Self::string_field(&params, "id")?;
        let level = match params.get("level").and_then(Value::as_str) {
            Some("summary") | None => ResumeLevel::Summary,
            Some("context") => ResumeLevel::Context,
            Some("full") => ResumeLevel::Full,
            Some(other) => {
                return Err(ContextdError::InvalidInput {
                    field: "level".to_string(),
                    message: format!("unsupported resume level '{other}'"),
                })
            }
        };
        let response = self.checkpoint.resume(&ctx, &id, level).await?;
        self.shape(&response)
    }

    // --- Remediation ---

    async fn remediation_search(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let query = Self::string_field(&params, "query")?;
        let scope = parse_scope(params.get("scope").and_then(Value::as_str).unwrap_or("project"))?;
        let hierarchical = params
            .get("hierarchical")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let limit = Self::limit_or(&params, 10);
        let results = self
            .remediation
            .search(&ctx, &query, scope, hierarchical, limit)
            .await?;
        self.shape(&json!({ "count": results.len(), "results": results }))
    }

    async fn remediation_record(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let request = RemediationRecordRequest {
            problem: Self::string_field(&params, "problem")?,
            solution: Self::string_field(&params, "solution")?,
            scope: parse_scope(&Self::string_field(&params, "scope")?)?,
        };
        let id = self.remediation.record(&ctx, request).await?;
        self.shape(&json!({ "id": id }))
    }

    async fn remediation_feedback(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let id = Self::string_field(&params, "id")?;
        let helpful = params
            .get("helpful")
            .and_then(Value::as_bool)
            .ok_or_else(|| ContextdError::InvalidInput {
                field: "helpful".to_string(),
                message: "required".to_string(),
            })?;
        let confidence = self.remediation.feedback(&ctx, &id, helpful).await?;
        self.shape(&json!({ "id": id, "confidence": confidence }))
    }

    // --- Repository ---

    async fn repository_index(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let include = string_array(&params, "include");
        let exclude = string_array(&params, "exclude");
        crate::validation::validate_glob_patterns(&include)?;
        crate::validation::validate_glob_patterns(&exclude)?;
        // Indexing the working tree itself is an external collaborator's
        // job (a filesystem walker honouring the globs) — out of core per
        // spec.md §1; this dispatcher only carries the tenant-scoped
        // contract through to the storage layer.
        let response = self
            .repository
            .index(&ctx, IndexRequest { files: Vec::<IndexedFile>::new() })
            .await?;
        self.shape(&response)
    }

    async fn repository_search(&self, tool: &str, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let query = Self::string_field(&params, "query")?;
        let content_mode = match params.get("content_mode").and_then(Value::as_str) {
            Some(raw) => ContentMode::parse(raw)?,
            None => ContentMode::Minimal,
        };
        let limit = Self::limit_or(&params, 10);
        let results = if tool == "semantic_search" {
            self.repository
                .semantic_search(&ctx, &query, content_mode, limit)
                .await?
        } else {
            self.repository.search(&ctx, &query, content_mode, limit).await?
        };
        self.shape(&json!({ "count": results.len(), "results": results }))
    }

    // --- Branch (context-folding) ---

    async fn branch_create(&self, params: Value) -> ContextdResult<Value> {
        let request = BranchCreateRequest {
            session_id: Self::string_field(&params, "session_id")?,
            description: Self::string_field(&params, "description")?,
            prompt: params.get("prompt").and_then(Value::as_str).map(str::to_string),
            budget: params.get("budget").and_then(Value::as_u64),
            timeout_seconds: params.get("timeout_seconds").and_then(Value::as_u64),
        };
        let response = self.branches.create(request).await?;
        self.shape(&response)
    }

    async fn branch_return(&self, params: Value) -> ContextdResult<Value> {
        let branch_id = Self::string_field(&params, "branch_id")?;
        let message = Self::string_field(&params, "message")?;
        let response = self.branches.return_branch(&branch_id, &message).await?;
        self.shape(&response)
    }

    async fn branch_status(&self, params: Value) -> ContextdResult<Value> {
        let branch_id = Self::string_field(&params, "branch_id")?;
        let branch = self
            .branches
            .get(&branch_id)
            .await
            .ok_or_else(|| ContextdError::NotFound(format!("branch '{branch_id}'")))?;
        self.shape(&branch)
    }

    // --- Conversation ---

    async fn conversation_index(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let turns_raw = params
            .get("turns")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut turns = Vec::with_capacity(turns_raw.len());
        for turn in turns_raw {
            turns.push(ConversationTurn {
                session_id: Self::string_field(&turn, "session_id")?,
                role: Self::string_field(&turn, "role")?,
                content: Self::string_field(&turn, "content")?,
                created_at: chrono::Utc::now(),
            });
        }
        let response = self
            .conversation
            .index(&ctx, ConversationIndexRequest { turns })
            .await?;
        self.shape(&response)
    }

    async fn conversation_search(&self, params: Value) -> ContextdResult<Value> {
        let ctx = self.resolve_tenant(&params)?;
        let query = Self::string_field(&params, "query")?;
        let limit = Self::limit_or(&params, 10);
        let results = self.conversation.search(&ctx, &query, limit).await?;
        self.shape(&json!({ "count": results.len(), "results": results }))
    }
}

fn string_array(params: &Value, field: &str) -> Vec<String> {
    params
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_category(raw: &str) -> ContextdResult<crate::registry::ToolCategory> {
    use crate::registry::ToolCategory::*;
    Ok(match raw {
        "memory" => Memory,
        "checkpoint" => Checkpoint,
        "remediation" => Remediation,
        "repository" => Repository,
        "troubleshoot" => Troubleshoot,
        "folding" => Folding,
        "conversation" => Conversation,
        "reflection" => Reflection,
        "search" => Search,
        other => {
            return Err(ContextdError::InvalidInput {
                field: "category".to_string(),
                message: format!("unknown category '{other}'"),
            })
        }
    })
}

fn parse_outcome(raw: &str) -> ContextdResult<Outcome> {
    Ok(match raw {
        "success" => Outcome::Success,
        "failure" => Outcome::Failure,
        "partial" => Outcome::Partial,
        "unknown" => Outcome::Unknown,
        other => {
            return Err(ContextdError::InvalidInput {
                field: "outcome".to_string(),
                message: format!("unknown outcome '{other}'"),
            })
        }
    })
}

fn parse_scope(raw: &str) -> ContextdResult<Scope> {
    Ok(match raw {
        "project" => Scope::Project,
        "team" => Scope::Team,
        "org" => Scope::Org,
        other => {
            return Err(ContextdError::InvalidInput {
                field: "scope".to_string(),
                message: format!("unknown scope '{other}'"),
            })
        }
    })
}

fn out_of_core(tool: &str, backend: &str) -> ContextdError {
    ContextdError::StorageError(format!("'{tool}' requires {backend}, which is not configured"))
}

#[cfg(test)]
mod tests;
