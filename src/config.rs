use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// Where the project registry and its databases live.
#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_projects_file")]
    pub projects_file: PathBuf,
    #[serde(default = "default_databases_dir")]
    pub databases_dir: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            projects_file: default_projects_file(),
            databases_dir: default_databases_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_search_limit")]
    pub search_limit: i64,
    #[serde(default = "default_list_limit")]
    pub list_limit: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            list_limit: default_list_limit(),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_projects_file() -> PathBuf {
    home_dir().join(".ocx").join("projects.json")
}

fn default_databases_dir() -> PathBuf {
    home_dir().join(".ocx").join("databases")
}

fn default_search_limit() -> i64 {
    20
}

fn default_list_limit() -> i64 {
    50
}

/// Default config path (`~/.ocx/ocx.toml`).
pub fn default_config_path() -> PathBuf {
    home_dir().join(".ocx").join("ocx.toml")
}

/// Loads the config. An explicitly given path must exist; the default path
/// falls back to built-in defaults when absent.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    if !path.is_file() {
        if explicit {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.query.search_limit < 1 {
        anyhow::bail!("query.search_limit must be >= 1");
    }
    if config.query.list_limit < 1 {
        anyhow::bail!("query.list_limit must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_default_config_falls_back() {
        let config = load_config(None).unwrap();
        assert_eq!(config.query.search_limit, 20);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&tmp.path().join("ocx.toml"))).is_err());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ocx.toml");
        std::fs::write(&path, "[query]\nsearch_limit = 5\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.query.search_limit, 5);
        assert_eq!(config.query.list_limit, 50);
        assert!(config
            .registry
            .projects_file
            .ends_with(".ocx/projects.json"));
    }

    #[test]
    fn invalid_limit_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ocx.toml");
        std::fs::write(&path, "[query]\nsearch_limit = 0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
