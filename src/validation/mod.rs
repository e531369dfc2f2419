//! Path, tenant, and glob validation (spec §4.A).
//!
//! Rejections never log the offending value — only the field name — so a
//! validation failure can't itself become a secret leak.

use crate::errors::{ContextdError, ContextdResult};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

static ID_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("id regex"));

fn invalid(field: &str, message: impl Into<String>) -> ContextdError {
    ContextdError::InvalidInput {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Canonicalise a project path lexically and reject traversal outside an
/// optional configured root. Does not require the path to exist on disk —
/// a project path may be supplied before the workspace is materialised.
pub fn validate_project_path(raw: &str, root: Option<&Path>) -> ContextdResult<PathBuf> {
    if raw.is_empty() {
        return Err(invalid("project_path", "must not be empty"));
    }
    if raw.contains('\0') {
        return Err(invalid("project_path", "contains a null byte"));
    }

    let path = Path::new(raw);
    let mut normalised = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(invalid("project_path", "contains a parent-directory segment"));
            }
            Component::CurDir => {}
            other => normalised.push(other.as_os_str()),
        }
    }

    if let Some(root) = root
        && normalised.is_absolute()
        && !normalised.starts_with(root)
    {
        return Err(invalid(
            "project_path",
            "escapes the configured root",
        ));
    }

    Ok(normalised)
}

fn validate_id(field: &str, value: &str, allow_empty: bool) -> ContextdResult<()> {
    if value.is_empty() {
        return if allow_empty {
            Ok(())
        } else {
            Err(invalid(field, "must not be empty"))
        };
    }
    if value.len() > 64 || !ID_RE.is_match(value) {
        return Err(invalid(
            field,
            "must match ^[A-Za-z0-9_-]{1,64}$",
        ));
    }
    Ok(())
}

pub fn validate_tenant_id(value: &str) -> ContextdResult<()> {
    validate_id("tenant_id", value, false)
}

pub fn validate_team_id(value: &str) -> ContextdResult<()> {
    validate_id("team_id", value, true)
}

pub fn validate_project_id(value: &str) -> ContextdResult<()> {
    validate_id("project_id", value, true)
}

/// Reject glob patterns with path traversal or null bytes. Does not attempt
/// to compile the pattern — that is the ignore-file parser's job (out of
/// core, per spec §1).
pub fn validate_glob_patterns(patterns: &[String]) -> ContextdResult<()> {
    for pattern in patterns {
        if pattern.contains('\0') {
            return Err(invalid("glob_patterns", "contains a null byte"));
        }
        if pattern.contains("..") {
            return Err(invalid("glob_patterns", "contains a traversal segment"));
        }
    }
    Ok(())
}

/// The final path component, with any directory separators stripped — used
/// to derive a project id from a path without leaking the full path.
pub fn safe_basename(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Sanitise a basename into a valid project id: lowercase, non-alphanumeric
/// runs collapsed to a single `-`, truncated to 64 chars.
pub fn derive_project_id(path: &Path) -> String {
    let basename = safe_basename(path);
    sanitise(&basename)
}

fn sanitise(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if ch == '-' || ch == ' ' || ch == '.' {
            if !last_was_sep && !out.is_empty() {
                out.push('-');
                last_was_sep = true;
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(64);
    if out.is_empty() {
        "project".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests;
