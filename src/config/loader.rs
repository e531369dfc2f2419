//! Config loading (modeled on the teacher's `config::loader`, simplified to
//! TOML-over-a-single-file since contextd carries no credential-helper or
//! keyring overlay — see DESIGN.md for the trim rationale).

use super::Config;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub fn get_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".contextd").join("config.toml"))
}

/// Load `Config` from `config_path`, falling back to the default config
/// path, and finally to `Config::default()` if neither exists.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.toml"));
    let path = config_path.unwrap_or(default_path.as_path());

    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?
    } else {
        Config::default()
    };

    config
        .validate()
        .with_context(|| "configuration validation failed")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_falls_back_to_default() {
        let config = load_config(Some(Path::new("/nonexistent/contextd/config.toml"))).unwrap();
        assert_eq!(config.server_name, "contextd");
    }

    #[test]
    fn loads_and_validates_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "serverName = \"custom\"\n[branch]\nmaxDepth = 5\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server_name, "custom");
        assert_eq!(config.branch.max_depth, 5);
    }

    #[test]
    fn invalid_toml_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml :::").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
