//! Error types returned by stage collaborators.
//!
//! Decode/encode and schema compilation report through diagnostic lists
//! instead, because they routinely produce several findings at once.

use std::path::PathBuf;

/// A definition file handed to a stage is itself unusable.
///
/// This is a setup problem, distinct from the data failing validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid schema definition {}: {cause}", path.display())]
    InvalidSchemaDefinition { path: PathBuf, cause: String },

    #[error("invalid rule definition {}: {cause}", path.display())]
    InvalidRuleDefinition { path: PathBuf, cause: String },
}

impl ConfigurationError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            ConfigurationError::InvalidSchemaDefinition { path, .. }
            | ConfigurationError::InvalidRuleDefinition { path, .. } => path,
        }
    }
}

/// Query-stage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("namespace prefix `{prefix}` is not bound")]
    UnboundNamespacePrefix { prefix: String },

    #[error("invalid expression `{expression}`: {message}")]
    Syntax { expression: String, message: String },

    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

/// Transform-stage failures. Both kinds are fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("invalid transform definition {}: {cause}", path.display())]
    InvalidDefinition { path: PathBuf, cause: String },

    #[error("transform failed: {0}")]
    Execution(String),
}
