//! Configuration management for kbrecall
//!
//! Configuration is a TOML file validated on load, with `KBRECALL_SECTION__KEY`
//! environment overrides applied before validation.

use crate::embedding::{EmbeddingConfig, IndexConfig};
use crate::error::{KbRecallError, Result};
use crate::retrieval::{RerankConfig, RetrievalConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for collection databases
    pub data_dir: PathBuf,
    /// Directory scanned for pre-embedded `*.json` files
    pub knowledge_base_dir: PathBuf,
    /// Collection name; the database lives at `<data_dir>/<collection>.sqlite`
    pub collection: String,
}

impl StorageConfig {
    /// Database path with `~` expanded
    pub fn collection_path(&self) -> Result<PathBuf> {
        Ok(expand_tilde(&self.data_dir)?.join(format!("{}.sqlite", self.collection)))
    }

    /// Knowledge-base directory with `~` expanded
    pub fn knowledge_base_path(&self) -> Result<PathBuf> {
        expand_tilde(&self.knowledge_base_dir)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(KbRecallError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| KbRecallError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| KbRecallError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: KBRECALL_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("KBRECALL_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "STORAGE__KNOWLEDGE_BASE_DIR" => {
                self.storage.knowledge_base_dir = PathBuf::from(value)
            }
            "STORAGE__COLLECTION" => self.storage.collection = value.to_string(),
            "SERVER__HOST" => self.server.host = value.to_string(),
            "SERVER__PORT" => self.server.port = parse_value(path, value)?,
            "EMBEDDING__ENDPOINT" => self.embedding.endpoint = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "RERANK__MODEL" => self.rerank.model = value.to_string(),
            "RERANK__TIMEOUT_SECS" => self.rerank.timeout_secs = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| KbRecallError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("kbrecall").join("config.toml"))
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| KbRecallError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| KbRecallError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| KbRecallError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.kbrecall");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                knowledge_base_dir: data_dir.join("knowledge_base"),
                data_dir,
                collection: "my_collection".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5001,
            },
            embedding: EmbeddingConfig::default(),
            indexing: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
        assert_eq!(config.indexing.upsert_batch_size, 1000);
        assert_eq!(config.rerank.model, "Qwen/Qwen3-Reranker-8B");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.server.port = 7001;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.port, 7001);
        assert_eq!(loaded.storage.collection, "my_collection");
    }

    #[test]
    fn test_optional_sections_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[_meta]
schema_version = "1.0.0"

[storage]
data_dir = "/tmp/kbrecall"
knowledge_base_dir = "/tmp/kbrecall/kb"
collection = "specs"

[server]
host = "127.0.0.1"
port = 5001
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retrieval.default_vector_results, 2);
        assert_eq!(config.indexing.vector_dim, 1024);
        assert_eq!(
            config.storage.collection_path().unwrap(),
            PathBuf::from("/tmp/kbrecall/specs.sqlite")
        );
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/kbrecall.toml"));
        assert!(matches!(result, Err(KbRecallError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("KBRECALL_SERVER__PORT".to_string(), "8080".to_string()),
            ("KBRECALL_STORAGE__COLLECTION".to_string(), "specs".to_string()),
            ("KBRECALL_RERANK__TIMEOUT_SECS".to_string(), "soon".to_string()),
            ("OTHER_VAR".to_string(), "ignored".to_string()),
        ]);

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.collection, "specs");
        // Unparseable values are skipped
        assert_eq!(config.rerank.timeout_secs, 30);
    }

    #[test]
    fn test_expand_tilde() {
        let plain = expand_tilde(Path::new("/var/data")).unwrap();
        assert_eq!(plain, PathBuf::from("/var/data"));

        if let Some(home) = dirs::home_dir() {
            let expanded = expand_tilde(Path::new("~/kb")).unwrap();
            assert_eq!(expanded, home.join("kb"));
        }
    }
}
