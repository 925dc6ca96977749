//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_KIALI_URL: &str = "http://localhost:20001";
pub const DEFAULT_NAMESPACE: &str = "default";

/// Defaults read from `~/.config/msctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub kiali_url: Option<String>,
    pub namespace: Option<String>,
}

impl Config {
    /// Load the config file, or empty defaults when there is none
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("msctl").join("config.json"))
    }

    /// Flag value, then config file, then built-in default
    pub fn kiali_url(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.kiali_url.clone())
            .unwrap_or_else(|| DEFAULT_KIALI_URL.to_string())
    }

    pub fn namespace(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }
}

/// Kubeconfig to use: the explicit path, else `~/.kube/config` if present.
///
/// `None` means falling back to in-cluster configuration.
pub fn kubeconfig_path(override_path: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(PathBuf::from(path));
    }

    dirs_next::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .filter(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_overrides_file() {
        let config = Config {
            kiali_url: Some("http://kiali.istio-system:20001".to_string()),
            namespace: None,
        };

        assert_eq!(config.kiali_url(Some("http://other:1")), "http://other:1");
        assert_eq!(config.kiali_url(None), "http://kiali.istio-system:20001");
        assert_eq!(config.namespace(None), DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"namespace": "shop"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.namespace(None), "shop");
        assert_eq!(config.kiali_url(None), DEFAULT_KIALI_URL);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(config.kiali_url.is_none());
    }

    #[test]
    fn test_explicit_kubeconfig() {
        assert_eq!(
            kubeconfig_path(Some("/tmp/kubeconfig")),
            Some(PathBuf::from("/tmp/kubeconfig"))
        );
    }
}
