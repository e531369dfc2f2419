//! Tenant derivation and context propagation (spec §4.C).
//!
//! The teacher's codebase carries session identity implicitly, often through
//! a thread's own call stack. Per design note §9 we deliberately reject that
//! convention here: a `TenantContext` is an explicit, `Clone`-able value
//! threaded through every dispatcher → storage call, never a task-local.
//! There is no process-wide tenant fallback; a tenant-less call fails closed.

use crate::errors::{ContextdError, ContextdResult};
use crate::validation::{validate_project_id, validate_team_id, validate_tenant_id};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

/// `{tenant_id, team_id, project_id}` — team and project may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantTriple {
    pub tenant_id: String,
    pub team_id: String,
    pub project_id: String,
}

impl TenantTriple {
    pub fn new(
        tenant_id: impl Into<String>,
        team_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> ContextdResult<Self> {
        let triple = Self {
            tenant_id: tenant_id.into(),
            team_id: team_id.into(),
            project_id: project_id.into(),
        };
        triple.validate()?;
        Ok(triple)
    }

    fn validate(&self) -> ContextdResult<()> {
        validate_tenant_id(&self.tenant_id)
            .map_err(|e| ContextdError::InvalidTenant(e.to_string()))?;
        validate_team_id(&self.team_id).map_err(|e| ContextdError::InvalidTenant(e.to_string()))?;
        validate_project_id(&self.project_id)
            .map_err(|e| ContextdError::InvalidTenant(e.to_string()))?;
        Ok(())
    }
}

/// Request-scoped tenant context, carried explicitly through every call that
/// touches a storage service. Cheap to clone (an `Arc` around the triple).
#[derive(Debug, Clone)]
pub struct TenantContext {
    triple: Arc<TenantTriple>,
}

impl TenantContext {
    pub fn new(triple: TenantTriple) -> Self {
        Self {
            triple: Arc::new(triple),
        }
    }

    pub fn triple(&self) -> &TenantTriple {
        &self.triple
    }

    pub fn tenant_id(&self) -> &str {
        &self.triple.tenant_id
    }

    pub fn team_id(&self) -> &str {
        &self.triple.team_id
    }

    pub fn project_id(&self) -> &str {
        &self.triple.project_id
    }
}

/// Attach a tenant triple to a context, producing a new context value.
/// Matches spec's `with_tenant(ctx, triple) -> ctx` contract; since contexts
/// are explicit values here rather than ambient state, this is just
/// construction, kept as a free function so call sites read the same way
/// the design notes describe.
pub fn with_tenant(triple: TenantTriple) -> TenantContext {
    TenantContext::new(triple)
}

/// Extract the tenant triple a context carries. Spec's `tenant_from(ctx)`
/// contract; always present once a `TenantContext` has been constructed,
/// since construction validates the triple — callers that only hold an
/// `Option<TenantContext>` express "missing" at that layer instead.
pub fn tenant_from(ctx: &TenantContext) -> &TenantTriple {
    ctx.triple()
}

/// Derive a stable tenant id for a canonicalised project path.
///
/// Stable across invocations for the same path: hashes the path with SHA-256
/// and takes a short hex prefix. Falls back to the OS user when no
/// repository metadata is available — never to a sentinel like `"default"`.
pub fn derive_tenant_for_path(path: &Path) -> ContextdResult<String> {
    let path_str = path.to_string_lossy();
    if path_str.is_empty() {
        return Err(ContextdError::InvalidTenant(
            "cannot derive tenant for an empty path".to_string(),
        ));
    }

    let mut hasher = Sha256::new();
    hasher.update(path_str.as_bytes());
    let digest = hasher.finalize();
    let hex_digest = hex::encode(digest);
    let short = &hex_digest[..16];

    let id = if let Some(user) = os_user() {
        format!("{user}-{short}")
    } else {
        short.to_string()
    };
    Ok(truncate_to_valid_id(&id))
}

fn os_user() -> Option<String> {
    let raw = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|s| !s.is_empty())?;
    let sanitised: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    (!sanitised.is_empty()).then_some(sanitised)
}

/// Clamp a derived id to the 64-char ceiling every tenant-triple component
/// must satisfy (spec §3).
fn truncate_to_valid_id(id: &str) -> String {
    id.chars().take(64).collect()
}

#[cfg(test)]
mod tests;
