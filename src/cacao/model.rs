// SPDX-License-Identifier: MIT

//! Flat object graph produced by ingestion and kept by the stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Owner of every object and relation imported from one document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Playbook {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unique page identifier, `Playbook:<slug>`
    pub page_id: String,
    #[serde(default)]
    pub last_change: Option<DateTime<Utc>>,
}

impl Playbook {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        let name = name.into();
        Self {
            page_id: format!("Playbook:{}", slug(&name)),
            name,
            description,
            last_change: None,
        }
    }
}

/// One addressable entity (step, agent, target, variable, case, root)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaybookObject {
    /// Unique within the owning playbook
    pub identifier: String,
    pub form_tag: String,
    /// Normalized field name -> value, in source order
    pub content: Map<String, Value>,
}

/// Right-hand side of a relation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RelationObject {
    /// Identifier of a [`PlaybookObject`] in the same playbook
    Object(String),
    Literal(Value),
}

impl RelationObject {
    pub fn object_id(&self) -> Option<&str> {
        match self {
            RelationObject::Object(id) => Some(id),
            RelationObject::Literal(_) => None,
        }
    }
}

/// `(subject, predicate, object)` triple owned by a playbook
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SemanticRelation {
    pub subject: String,
    pub predicate: String,
    pub object: RelationObject,
    /// Owning playbook name
    pub playbook: String,
}

/// Lowercase ASCII alphanumerics with single `-` separators
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Block Malicious IP!"), "block-malicious-ip");
        assert_eq!(slug("  --a__b--  "), "a-b");
        assert_eq!(slug("Ünïcode"), "n-code");
        assert_eq!(slug("***"), "");
    }

    #[test]
    fn test_playbook_page_id() {
        let playbook = Playbook::new("Phishing Response", None);
        assert_eq!(playbook.page_id, "Playbook:phishing-response");
        assert!(playbook.last_change.is_none());
    }

    #[test]
    fn test_relation_object_serialization() {
        let object = RelationObject::Object("pb/start/s1".to_string());
        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            json!({"kind": "object", "value": "pb/start/s1"})
        );
        assert_eq!(object.object_id(), Some("pb/start/s1"));
        assert_eq!(RelationObject::Literal(json!(3)).object_id(), None);
    }
}
