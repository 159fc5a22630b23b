//! Optimizer configuration types and builders

use serde::{Deserialize, Serialize};
use service_builder::builder;
use std::env;

use crate::error::{OptimizerError, OptimizerResult};

/// Configuration shared by every plan built by a [`crate::QueryOptimizer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder]
pub struct OptimizerConfig {
    /// Maximum number of joins plus prefetches a single root plan may carry
    #[builder(default = "10", getter)]
    pub max_complexity: usize,

    /// Largest page a connection may request; also the implicit page size of
    /// connections queried without `first`/`last` (None = unlimited)
    #[builder(default = "Some(100)", getter)]
    pub max_page_size: Option<u64>,

    /// Emit column projections in compiled directives
    #[builder(default = "true", getter)]
    pub project_columns: bool,

    /// Nesting limit for relation paths that pass through a cyclic part of the schema
    #[builder(default = "8", getter)]
    pub max_cyclic_depth: usize,

    /// Separator used for compiled join and projection paths
    #[builder(default = "\".\".to_string()", getter)]
    pub path_separator: String,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_complexity: 10,
            max_page_size: Some(100),
            project_columns: true,
            max_cyclic_depth: 8,
            path_separator: ".".to_string(),
        }
    }
}

impl OptimizerConfig {
    /// Load configuration from `GRAPHQL_OPTIMIZER_*` environment variables,
    /// falling back to defaults for unset variables.
    pub fn from_env() -> OptimizerResult<Self> {
        let mut config = Self::default();

        if let Some(value) = env_value("GRAPHQL_OPTIMIZER_MAX_COMPLEXITY") {
            config.max_complexity = parse_env("GRAPHQL_OPTIMIZER_MAX_COMPLEXITY", &value)?;
        }

        if let Some(value) = env_value("GRAPHQL_OPTIMIZER_MAX_PAGE_SIZE") {
            config.max_page_size = match value.to_lowercase().as_str() {
                "none" | "unlimited" => None,
                _ => Some(parse_env("GRAPHQL_OPTIMIZER_MAX_PAGE_SIZE", &value)?),
            };
        }

        if let Some(value) = env_value("GRAPHQL_OPTIMIZER_PROJECT_COLUMNS") {
            config.project_columns = parse_env("GRAPHQL_OPTIMIZER_PROJECT_COLUMNS", &value)?;
        }

        if let Some(value) = env_value("GRAPHQL_OPTIMIZER_MAX_CYCLIC_DEPTH") {
            config.max_cyclic_depth = parse_env("GRAPHQL_OPTIMIZER_MAX_CYCLIC_DEPTH", &value)?;
        }

        if let Some(value) = env_value("GRAPHQL_OPTIMIZER_PATH_SEPARATOR") {
            config.path_separator = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.max_complexity == 0 {
            return Err(OptimizerError::Configuration(
                "max_complexity must be greater than 0".to_string(),
            ));
        }

        if self.max_cyclic_depth == 0 {
            return Err(OptimizerError::Configuration(
                "max_cyclic_depth must be greater than 0".to_string(),
            ));
        }

        if self.max_page_size == Some(0) {
            return Err(OptimizerError::Configuration(
                "max_page_size must be greater than 0 when set".to_string(),
            ));
        }

        if self.path_separator.is_empty() {
            return Err(OptimizerError::Configuration(
                "path_separator must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub(crate) fn join_path(&self, prefix: &str, name: &str) -> String {
        format!("{}{}{}", prefix, self.path_separator, name)
    }
}

impl OptimizerConfigBuilder {
    /// Configuration that mirrors Django's lookup separator (`author__name`)
    pub fn django() -> Self {
        OptimizerConfigBuilder::new().path_separator("__".to_string())
    }

    /// Configuration for tests and development with no page size limit
    pub fn development() -> Self {
        OptimizerConfigBuilder::new()
            .max_complexity(32)
            .max_page_size(None)
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> OptimizerResult<T> {
    value.trim().parse().map_err(|_| {
        OptimizerError::Configuration(format!("invalid value '{}' for {}", value, key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OptimizerConfig::default();
        assert_eq!(config.max_complexity, 10);
        assert_eq!(config.max_page_size, Some(100));
        assert!(config.project_columns);
        assert_eq!(config.path_separator, ".");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = OptimizerConfigBuilder::new()
            .max_complexity(4)
            .build()
            .expect("Failed to build config");

        assert_eq!(*config.get_max_complexity(), 4);
        assert_eq!(*config.get_max_page_size(), Some(100)); // Default
        assert!(*config.get_project_columns());
    }

    #[test]
    fn test_django_preset() {
        let config = OptimizerConfigBuilder::django()
            .build()
            .expect("Failed to build config");
        assert_eq!(config.join_path("author", "name"), "author__name");
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let config = OptimizerConfig {
            max_complexity: 0,
            ..OptimizerConfig::default()
        };
        assert!(matches!(config.validate(), Err(OptimizerError::Configuration(_))));

        let config = OptimizerConfig {
            path_separator: String::new(),
            ..OptimizerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_env_value() {
        assert_eq!(parse_env::<usize>("KEY", " 12 ").unwrap(), 12);
        assert!(parse_env::<bool>("KEY", "maybe").is_err());
    }
}
