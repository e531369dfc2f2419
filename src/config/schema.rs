//! Configuration schema (SPEC_FULL.md §1, modeled on the teacher's
//! `config::schema` module): serde-derived, `#[serde(default = ...)]`
//! throughout so a partial config file still produces a valid `Config`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_transport() -> TransportKind {
    TransportKind::Stdio
}

fn default_http_addr() -> String {
    "127.0.0.1:8765".to_string()
}

fn default_branch_budget() -> u64 {
    8192
}

fn default_branch_timeout_secs() -> u64 {
    300
}

fn default_max_depth() -> usize {
    3
}

fn default_server_name() -> String {
    "contextd".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Transport the daemon serves the JSON-RPC protocol over (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default = "default_http_addr")]
    pub addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: default_http_addr(),
        }
    }
}

/// Defaults applied by the branch manager (spec.md §4.G) when a
/// `branch_create` request omits `budget`/`timeout_seconds`, plus the
/// nesting cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchConfig {
    #[serde(default = "default_branch_budget")]
    pub default_budget: u64,
    #[serde(default = "default_branch_timeout_secs")]
    pub default_timeout_seconds: u64,
    /// Branch depths `0..max_depth` are permitted; spec.md default is 3,
    /// i.e. depths 0, 1, 2.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            default_budget: default_branch_budget(),
            default_timeout_seconds: default_branch_timeout_secs(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub branch: BranchConfig,
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_server_version")]
    pub server_version: String,
    /// Optional root that validated project paths must not escape
    /// (spec.md §4.A). `None` disables the escape check.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            http: HttpConfig::default(),
            branch: BranchConfig::default(),
            server_name: default_server_name(),
            server_version: default_server_version(),
            project_root: None,
        }
    }
}

impl Config {
    /// Sanity-check the loaded config. Mirrors the teacher's
    /// `Config::validate()` call in `config::loader::load_config`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.branch.max_depth == 0 {
            anyhow::bail!("branch.maxDepth must be at least 1");
        }
        if self.branch.default_budget == 0 {
            anyhow::bail!("branch.defaultBudget must be greater than zero");
        }
        if self.http.addr.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("http.addr '{}' is not a valid socket address", self.http.addr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_max_depth_rejected() {
        let mut config = Config::default();
        config.branch.max_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_http_addr_rejected() {
        let mut config = Config::default();
        config.http.addr = "not-an-addr".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str("serverName = \"custom\"\n").unwrap();
        assert_eq!(config.server_name, "custom");
        assert_eq!(config.branch.max_depth, default_max_depth());
    }
}
