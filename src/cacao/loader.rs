// SPDX-License-Identifier: MIT

//! Document loader - JSON/YAML file loading
//!
//! Documents are loaded untyped: the schema validator needs to see exactly
//! what the author wrote, defects included.

use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::PlaybookError;

/// Loads raw playbook documents from disk or strings
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a document, picking the parser from the file extension.
    /// Unknown extensions are tried as JSON.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Value, PlaybookError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        log::debug!("Loading document from {}", path.display());
        if is_yaml {
            Self::parse_yaml(&content)
        } else {
            Self::parse_json(&content)
        }
    }

    pub fn parse_json(content: &str) -> Result<Value, PlaybookError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse YAML into the same JSON value model the validator walks
    pub fn parse_yaml(content: &str) -> Result<Value, PlaybookError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}
