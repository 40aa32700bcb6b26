use crate::config::Config;
use crate::error::{KbRecallError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_server(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_rerank(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(KbRecallError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.knowledge_base_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.knowledge_base_dir",
                "Knowledge base directory cannot be empty",
            ));
        }

        // Collection name becomes a file name
        let collection = &config.storage.collection;
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            errors.push(ValidationError::new(
                "storage.collection",
                format!(
                    "Collection must be non-empty and use only [A-Za-z0-9_-], got '{}'",
                    collection
                ),
            ));
        }
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.server.host.trim().is_empty() {
            errors.push(ValidationError::new(
                "server.host",
                "Host cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.endpoint.is_empty() {
            errors.push(ValidationError::new(
                "embedding.endpoint",
                "Endpoint cannot be empty",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimensions != config.indexing.vector_dim {
            errors.push(ValidationError::new(
                "embedding.dimensions",
                format!(
                    "Embedding dimensions ({}) must match indexing.vector_dim ({})",
                    config.embedding.dimensions, config.indexing.vector_dim
                ),
            ));
        }

        if config.embedding.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.vector_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.indexing.upsert_batch_size == 0 {
            errors.push(ValidationError::new(
                "indexing.upsert_batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.rerank.model.is_empty() {
            errors.push(ValidationError::new(
                "rerank.model",
                "Model name cannot be empty",
            ));
        }

        if config.rerank.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "rerank.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(KbRecallError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collection_name_checked() {
        let mut config = Config::default();
        config.storage.collection = "../escape".to_string();
        assert_eq!(error_paths(&config), vec!["storage.collection"]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut config = Config::default();
        config.embedding.dimensions = 768;
        assert_eq!(error_paths(&config), vec!["embedding.dimensions"]);
    }

    #[test]
    fn test_all_errors_collected() {
        let mut config = Config::default();
        config.meta.schema_version = "2.0.0".to_string();
        config.indexing.upsert_batch_size = 0;
        config.rerank.timeout_secs = 0;

        let paths = error_paths(&config);
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&"rerank.timeout_secs".to_string()));
    }
}
