use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SchemaHeroError;

/// Top-level SchemaHero configuration, stored at `~/.schemahero/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaHeroConfig {
    /// Directories searched, in order, for `schemahero-<driver>` plugin executables.
    #[serde(default = "default_plugin_paths")]
    pub plugin_paths: Vec<PathBuf>,

    /// Location of the local resource store. Defaults to `~/.schemahero/schemahero.db`.
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Append seed data statements when planning tables that carry seed data.
    #[serde(default)]
    pub deploy_seed_data: bool,

    /// Concurrent reconciles per controller.
    #[serde(default = "default_reconcile_workers")]
    pub reconcile_workers: usize,

    /// Upper bound for a single reconcile, including driver calls.
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,

    /// Every object is re-enqueued at this interval.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,

    /// Image used for per-database worker workloads.
    #[serde(default = "default_manager_image")]
    pub manager_image: String,

    /// Where the vault agent renders the connection URI inside a worker pod.
    #[serde(default = "default_vault_agent_uri_path")]
    pub vault_agent_uri_path: PathBuf,
}

fn default_plugin_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(home) = SchemaHeroConfig::home_dir() {
        paths.push(home.join("plugins"));
    }
    paths.push(PathBuf::from("/var/lib/schemahero/plugins"));
    paths
}

fn default_reconcile_workers() -> usize {
    4
}

fn default_reconcile_timeout_secs() -> u64 {
    120
}

fn default_resync_interval_secs() -> u64 {
    300
}

fn default_manager_image() -> String {
    "schemahero/schemahero:latest".to_string()
}

fn default_vault_agent_uri_path() -> PathBuf {
    PathBuf::from("/vault/secrets/schemaherouri")
}

impl Default for SchemaHeroConfig {
    fn default() -> Self {
        Self {
            plugin_paths: default_plugin_paths(),
            store_path: None,
            deploy_seed_data: false,
            reconcile_workers: default_reconcile_workers(),
            reconcile_timeout_secs: default_reconcile_timeout_secs(),
            resync_interval_secs: default_resync_interval_secs(),
            manager_image: default_manager_image(),
            vault_agent_uri_path: default_vault_agent_uri_path(),
        }
    }
}

impl SchemaHeroConfig {
    /// Returns the SchemaHero home directory (`~/.schemahero/`).
    pub fn home_dir() -> Result<PathBuf, SchemaHeroError> {
        let base = dirs::home_dir().ok_or_else(|| SchemaHeroError::Config {
            message: "could not determine home directory".into(),
        })?;
        Ok(base.join(".schemahero"))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Result<PathBuf, SchemaHeroError> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Returns the path to the local resource store.
    pub fn store_path(&self) -> Result<PathBuf, SchemaHeroError> {
        match &self.store_path {
            Some(p) => Ok(p.clone()),
            None => Ok(Self::home_dir()?.join("schemahero.db")),
        }
    }

    /// Load config from the default location, or return defaults if not found.
    pub fn load() -> Result<Self, SchemaHeroError> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, SchemaHeroError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SchemaHeroError::Serialization(e.to_string()))
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), SchemaHeroError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SchemaHeroError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Initialize the SchemaHero home directory with default config.
    pub fn init() -> Result<PathBuf, SchemaHeroError> {
        let home = Self::home_dir()?;
        std::fs::create_dir_all(home.join("plugins"))?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            Self::default().save_to(&config_path)?;
        }

        Ok(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = SchemaHeroConfig::default();
        config.deploy_seed_data = true;
        config.save_to(&path).unwrap();

        let loaded = SchemaHeroConfig::load_from(&path).unwrap();
        assert!(loaded.deploy_seed_data);
        assert_eq!(loaded.reconcile_workers, 4);
        assert_eq!(
            loaded.vault_agent_uri_path,
            PathBuf::from("/vault/secrets/schemaherouri")
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: SchemaHeroConfig = toml::from_str("reconcile_workers = 2\n").unwrap();
        assert_eq!(config.reconcile_workers, 2);
        assert_eq!(config.resync_interval_secs, 300);
        assert!(!config.plugin_paths.is_empty());
    }
}
