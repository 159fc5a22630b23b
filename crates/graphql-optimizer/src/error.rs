//! Error types for the GraphQL query optimizer
//!
//! Every error here describes either a malformed input (bad selection shape,
//! unresolvable arguments, inconsistent schema metadata) or a genuine
//! ambiguity in the requested rows. None of them are retried.

use async_graphql_parser::Pos;
use thiserror::Error;

/// Result type alias for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Error types for selection analysis, plan building and caching
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("Unsupported selection at {pos}: {message}")]
    UnsupportedSelection { pos: Pos, message: String },

    #[error("Could not resolve argument '{argument}': {message}")]
    ArgumentResolution { argument: String, message: String },

    #[error("Conflicting prefetch directives for relation '{relation}' on '{entity}'")]
    ConflictingPrefetchDirective { entity: String, relation: String },

    #[error("Invalid relation metadata for '{entity}.{field}': {message}")]
    RelationMetadata {
        entity: String,
        field: String,
        message: String,
    },

    #[error("Field '{field}' is not defined on '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("Query complexity {complexity} exceeds the maximum allowed of {max}")]
    ComplexityExceeded { complexity: usize, max: usize },

    #[error("Relation path through cyclic entity '{entity}' is nested deeper than {max}")]
    RecursionLimit { entity: String, max: usize },

    #[error("Invalid pagination arguments: {0}")]
    InvalidPagination(String),

    #[error("Cannot merge a plan for '{right}' into a plan for '{left}'")]
    PlanMismatch { left: String, right: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OptimizerError {
    pub(crate) fn unsupported(pos: Pos, message: impl Into<String>) -> Self {
        OptimizerError::UnsupportedSelection {
            pos,
            message: message.into(),
        }
    }

    pub(crate) fn argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        OptimizerError::ArgumentResolution {
            argument: argument.into(),
            message: message.into(),
        }
    }

    pub(crate) fn metadata(
        entity: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        OptimizerError::RelationMetadata {
            entity: entity.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error was caused by the client's query rather
    /// than by schema metadata or configuration.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OptimizerError::UnsupportedSelection { .. }
                | OptimizerError::ArgumentResolution { .. }
                | OptimizerError::ConflictingPrefetchDirective { .. }
                | OptimizerError::UnknownField { .. }
                | OptimizerError::ComplexityExceeded { .. }
                | OptimizerError::RecursionLimit { .. }
                | OptimizerError::InvalidPagination(_)
        )
    }
}
