use thiserror::Error;

/// Typed error hierarchy for contextd.
///
/// Use at module boundaries (dispatcher, branch manager, storage services,
/// config loading). Leaf-level code can keep using `anyhow::Result` — the
/// `Internal` variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum ContextdError {
    #[error("invalid input: {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("depth exceeded: max depth {max_depth}")]
    DepthExceeded { max_depth: usize },

    #[error("budget exceeded: used {used} of {total}")]
    BudgetExceeded { used: u64, total: u64 },

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("authentication failed: {0}")]
    AuthError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `ContextdError`.
pub type ContextdResult<T> = std::result::Result<T, ContextdError>;

/// The reason taxonomy recorded against the `errors_total{tool, reason}` metric.
///
/// Matches spec's priority order: typed variants map directly; `Internal`
/// falls back to substring matching on the wrapped message, since it may
/// carry an opaque error from an external collaborator (vector store,
/// embedding backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    TenantError,
    ValidationError,
    NotFound,
    Timeout,
    AuthError,
    StorageError,
    InternalError,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenantError => "tenant_error",
            Self::ValidationError => "validation_error",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::AuthError => "auth_error",
            Self::StorageError => "storage_error",
            Self::InternalError => "internal_error",
        }
    }
}

/// Substring table used only as a fallback for third-party/opaque errors.
/// Typed errors below are categorised directly; this is not the primary path.
const SUBSTRING_TABLE: &[(&str, ErrorReason)] = &[
    ("tenant", ErrorReason::TenantError),
    ("invalid input", ErrorReason::ValidationError),
    ("validation", ErrorReason::ValidationError),
    ("not found", ErrorReason::NotFound),
    ("timeout", ErrorReason::Timeout),
    ("timed out", ErrorReason::Timeout),
    ("cancelled", ErrorReason::InternalError),
    ("auth", ErrorReason::AuthError),
    ("storage", ErrorReason::StorageError),
];

impl ContextdError {
    /// Map this error to the metrics reason taxonomy (spec §7, §4.E).
    /// Priority order: tenant_error, validation_error, not_found, timeout,
    /// auth_error, storage_error, internal_error.
    pub fn metrics_reason(&self) -> ErrorReason {
        match self {
            Self::InvalidTenant(_) => ErrorReason::TenantError,
            Self::InvalidInput { .. } => ErrorReason::ValidationError,
            Self::NotFound(_) => ErrorReason::NotFound,
            Self::Timeout(_) => ErrorReason::Timeout,
            Self::AuthError(_) => ErrorReason::AuthError,
            Self::StorageError(_) => ErrorReason::StorageError,
            Self::Conflict(_) | Self::DepthExceeded { .. } | Self::BudgetExceeded { .. } => {
                ErrorReason::ValidationError
            }
            Self::Internal(e) => categorise_by_substring(&e.to_string()),
        }
    }

    /// A scrubbed, human-readable message safe to return to the caller.
    /// Never includes raw stack traces (spec §7).
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

fn categorise_by_substring(message: &str) -> ErrorReason {
    let lowered = message.to_lowercase();
    for (needle, reason) in SUBSTRING_TABLE {
        if lowered.contains(needle) {
            return *reason;
        }
    }
    ErrorReason::InternalError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_tenant_maps_to_tenant_error() {
        let err = ContextdError::InvalidTenant("bad triple".into());
        assert_eq!(err.metrics_reason().as_str(), "tenant_error");
    }

    #[test]
    fn typed_errors_take_priority_over_substrings() {
        // Message happens to contain "storage" but the typed variant is AuthError.
        let err = ContextdError::AuthError("storage token expired".into());
        assert_eq!(err.metrics_reason().as_str(), "auth_error");
    }

    #[test]
    fn internal_error_falls_back_to_substring_table() {
        let err = ContextdError::Internal(anyhow::anyhow!("request timed out upstream"));
        assert_eq!(err.metrics_reason().as_str(), "timeout");
    }

    #[test]
    fn internal_error_defaults_to_internal_reason() {
        let err = ContextdError::Internal(anyhow::anyhow!("unexpected panic payload"));
        assert_eq!(err.metrics_reason().as_str(), "internal_error");
    }

    #[test]
    fn budget_exceeded_display() {
        let err = ContextdError::BudgetExceeded {
            used: 9000,
            total: 8192,
        };
        assert_eq!(err.to_string(), "budget exceeded: used 9000 of 8192");
    }
}
