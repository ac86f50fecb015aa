// SPDX-License-Identifier: MIT

//! Validation findings

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const EXCERPT_LEN: usize = 72;

/// Severity of a finding; only `Error` makes a document invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "ERROR"),
            Level::Warning => write!(f, "WARNING"),
            Level::Info => write!(f, "INFO"),
        }
    }
}

/// Where a finding sits: the full subtree plus two short excerpts, enough
/// to print a two-line diagnostic without walking the document again
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorContext {
    pub subtree: Value,
    pub before: String,
    pub after: String,
}

impl ErrorContext {
    /// Context for `key` inside the object found at `owner`
    pub fn field(owner: &str, container: &Value, key: &str) -> Self {
        let after = match container.get(key) {
            Some(value) => format!("\"{}\": {}", key, excerpt(value)),
            None => format!("\"{}\": <missing>", key),
        };
        Self {
            subtree: container.clone(),
            before: format!("\"{}\": {}", owner, excerpt(container)),
            after,
        }
    }
}

/// Compact one-line JSON, cut at a fixed width
pub fn excerpt(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= EXCERPT_LEN {
        return text;
    }
    let cut: String = text.chars().take(EXCERPT_LEN).collect();
    format!("{}...", cut)
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ValidationError {
    pub message: String,
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
}

impl ValidationError {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            context: None,
        }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n    {}\n    {}", ctx.before, ctx.after)?;
        }
        Ok(())
    }
}

/// Outcome of validating one document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn from_findings(errors: Vec<ValidationError>) -> Self {
        let valid = !errors.iter().any(|e| e.level == Level::Error);
        Self { valid, errors }
    }

    /// Findings at exactly `level`
    pub fn at_level(&self, level: Level) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.level == level)
    }

    pub fn count(&self, level: Level) -> usize {
        self.at_level(level).count()
    }
}
