//! Error types for swrun

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for swrun operations
pub type Result<T> = std::result::Result<T, SwrunError>;

/// Main error type for swrun
#[derive(Error, Debug)]
pub enum SwrunError {
    /// Definition loading and validation errors
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Task execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Workflow definition parsing and validation errors
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Failed to read definition '{path}': {error}")]
    Read { path: PathBuf, error: String },

    #[error("Invalid definition: {0}")]
    Invalid(String),

    #[error("Unsupported DSL version '{0}' (expected 1.x)")]
    UnsupportedVersion(String),

    #[error("Task list entry {index} must have exactly one key, found {found}")]
    MalformedEntry { index: usize, found: usize },

    #[error("Task key '{0}' is defined more than once in the same list")]
    DuplicateKey(String),

    #[error("Task '{key}' declares {found} task kinds, expected exactly one")]
    AmbiguousKind { key: String, found: usize },

    #[error("Task '{key}' has unsupported kind '{kind}'")]
    UnsupportedTaskKind { key: String, kind: String },
}

/// Expression parsing and evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Property '{0}' not found")]
    PropertyNotFound(String),

    #[error("Invalid expression '{expression}': {reason}")]
    Syntax { expression: String, reason: String },
}

impl ExpressionError {
    pub(crate) fn syntax(expression: &str, reason: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors reported by an external call collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("No recorded response for {method} {target}")]
    NotRecorded { method: String, target: String },

    #[error("Call transport failed: {0}")]
    Transport(String),

    #[error("Response status {0} is not a success")]
    ErrorStatus(u16),
}

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("Fork task '{0}' has no branches")]
    EmptyFork(String),

    #[error("Branch {index} of fork '{key}' failed")]
    BranchFailure {
        key: String,
        index: usize,
        #[source]
        source: Box<ExecutionError>,
    },

    #[error("Call task '{key}' failed")]
    CallFailure {
        key: String,
        #[source]
        source: CallError,
    },

    #[error("Call task '{key}' has invalid {field}: {reason}")]
    InvalidCall {
        key: String,
        field: &'static str,
        reason: String,
    },

    #[error("For task '{key}' expected an array from '{expression}'")]
    NotIterable { key: String, expression: String },
}

impl ExecutionError {
    /// The innermost error, unwrapping nested branch failures
    pub fn root_cause(&self) -> &ExecutionError {
        match self {
            ExecutionError::BranchFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Specialized result type for definition operations
pub type DefinitionResult<T> = std::result::Result<T, DefinitionError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for expression operations
pub type ExpressionResult<T> = std::result::Result<T, ExpressionError>;

/// Helper function to determine if an error came from a call collaborator
/// (either a transport failure or a rejected status)
pub fn is_call_failure(err: &ExecutionError) -> bool {
    matches!(err.root_cause(), ExecutionError::CallFailure { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_branches() {
        let err = ExecutionError::BranchFailure {
            key: "outer".to_string(),
            index: 1,
            source: Box::new(ExecutionError::BranchFailure {
                key: "inner".to_string(),
                index: 0,
                source: Box::new(ExecutionError::EmptyFork("deepest".to_string())),
            }),
        };

        assert!(matches!(err.root_cause(), ExecutionError::EmptyFork(k) if k == "deepest"));
    }

    #[test]
    fn test_is_call_failure() {
        let err = ExecutionError::BranchFailure {
            key: "parallel".to_string(),
            index: 2,
            source: Box::new(ExecutionError::CallFailure {
                key: "fetch".to_string(),
                source: CallError::ErrorStatus(503),
            }),
        };
        assert!(is_call_failure(&err));
        assert!(!is_call_failure(&ExecutionError::EmptyFork("f".to_string())));
    }
}
