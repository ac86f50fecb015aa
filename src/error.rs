// SPDX-License-Identifier: MIT

//! Typed error handling for cacao-rs
//!
//! The schema validator never fails; it returns a report. Everything else
//! fails fast with one of the error types below, all of which convert into
//! the top-level [`PlaybookError`].

use std::time::Duration;
use thiserror::Error;

use crate::cacao::schema::ValidationError;

/// Top-level error type for cacao-rs
#[derive(Debug, Error)]
pub enum PlaybookError {
    /// Document failed the schema checks
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Malformed condition expression
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Unresolvable variable or path segment
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Comparison across incompatible operand types
    #[error(transparent)]
    Type(#[from] TypeError),

    /// A condition clause failed during evaluation
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Inconsistent variable definition
    #[error(transparent)]
    Variable(#[from] VariableError),

    /// Storage transaction failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration errors (invalid env vars, bad flags)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl PlaybookError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Raised when `deserialize` runs on a document with ERROR-level defects
#[derive(Debug, Error)]
#[error("{}", summarize(.errors, .reason.as_deref()))]
pub struct SchemaError {
    /// ERROR-level entries reported by the validator
    pub errors: Vec<ValidationError>,
    /// Set when the failure did not come from the validator itself
    pub reason: Option<String>,
}

impl SchemaError {
    pub fn from_report(errors: Vec<ValidationError>) -> Self {
        Self {
            errors,
            reason: None,
        }
    }

    pub fn other(reason: impl Into<String>) -> Self {
        Self {
            errors: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

fn summarize(errors: &[ValidationError], reason: Option<&str>) -> String {
    if let Some(reason) = reason {
        return format!("Schema error: {}", reason);
    }
    match errors.first() {
        Some(first) if errors.len() == 1 => format!("Schema error: {}", first.message),
        Some(first) => format!(
            "Schema error: {} (and {} more)",
            first.message,
            errors.len() - 1
        ),
        None => "Schema error: document is invalid".to_string(),
    }
}

/// Malformed condition expression
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Syntax error at position {position}: {message} in '{expression}'")]
pub struct SyntaxError {
    pub message: String,
    /// Byte offset into `expression`
    pub position: usize,
    pub expression: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, position: usize, expression: &str) -> Self {
        Self {
            message: message.into(),
            position,
            expression: expression.to_string(),
        }
    }
}

/// A path reference could not be resolved against the variable context
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionError {
    #[error("Variable '{variable}' is not defined")]
    UnknownVariable { variable: String },

    #[error("Field '{field}' does not exist on '{variable}'")]
    MissingField { variable: String, field: String },

    #[error("Field '{field}' of '{variable}' was applied to a non-dictionary value")]
    NotADictionary { variable: String, field: String },

    #[error("Index {index} is out of range for '{variable}' (length {len})")]
    IndexOutOfRange {
        variable: String,
        index: usize,
        len: usize,
    },

    #[error("Index was applied to a non-list value of '{variable}'")]
    NotAList { variable: String },

    #[error("Reference to '{variable}' resolved to {count} values where exactly one was expected")]
    Cardinality { variable: String, count: usize },

    #[error("Variable '{variable}' is declared as {declared} but holds {actual}")]
    TypeMismatch {
        variable: String,
        declared: String,
        actual: String,
    },
}

impl ResolutionError {
    /// The variable identifier the failing reference started from
    pub fn variable(&self) -> &str {
        match self {
            ResolutionError::UnknownVariable { variable }
            | ResolutionError::MissingField { variable, .. }
            | ResolutionError::NotADictionary { variable, .. }
            | ResolutionError::IndexOutOfRange { variable, .. }
            | ResolutionError::NotAList { variable }
            | ResolutionError::Cardinality { variable, .. }
            | ResolutionError::TypeMismatch { variable, .. } => variable,
        }
    }
}

/// Operands of an ordering comparison are not both numeric
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Operator '{operator}' cannot compare {left} with {right}")]
pub struct TypeError {
    pub operator: String,
    pub left: String,
    pub right: String,
}

/// What went wrong inside a single clause
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClauseFailure {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// A clause failed; carries the clause text and the variable it referenced
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Condition clause '{clause}' failed on variable '{variable}': {source}")]
pub struct EvaluationError {
    pub clause: String,
    pub variable: String,
    #[source]
    pub source: ClauseFailure,
}

/// Variable definitions that violate their declared type or naming rules
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VariableError {
    #[error("Variable name '{0}' must have the form $$name$$")]
    InvalidName(String),

    #[error("Variable '{variable}' has unknown type '{declared}'")]
    UnknownType { variable: String, declared: String },

    #[error("Variable '{variable}' is declared as {declared} but its value is {actual}")]
    TypeMismatch {
        variable: String,
        declared: String,
        actual: String,
    },

    #[error("Variable '{variable}' is malformed: {reason}")]
    Malformed { variable: String, reason: String },
}

/// Failures inside the storage collaborator
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object '{0}' already exists in playbook")]
    DuplicateObject(String),

    #[error("Relation '{predicate}' from '{subject}' points at missing object '{object}'")]
    DanglingRelation {
        subject: String,
        predicate: String,
        object: String,
    },

    #[error("Page id '{page_id}' of playbook '{name}' is already held by playbook '{holder}'")]
    DuplicatePageId {
        page_id: String,
        name: String,
        holder: String,
    },

    #[error("Playbook '{0}' is not registered in this transaction")]
    UnknownPlaybook(String),

    #[error("Storage deadline of {0:?} exceeded; transaction rolled back")]
    Timeout(Duration),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
