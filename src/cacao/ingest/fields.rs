// SPDX-License-Identifier: MIT

//! Source field name -> normalized content field name

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;

/// Renames that apply to every form
static COMMON_RENAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("id", "cacao_id"),
        ("created_by", "author"),
        ("delay", "delay_ms"),
        ("timeout", "timeout_ms"),
        ("in_args", "input_arguments"),
        ("out_args", "output_arguments"),
        ("switch", "switch_variable"),
        ("playbook_version", "referenced_version"),
        ("external_references", "references"),
    ])
});

/// Renames that depend on the form tag
static FORM_RENAMES: Lazy<HashMap<&'static str, HashMap<&'static str, &'static str>>> =
    Lazy::new(|| {
        HashMap::from([
            ("agent", HashMap::from([("type", "agent_type")])),
            ("target", HashMap::from([("type", "target_type")])),
            ("playbook", HashMap::from([("playbook_types", "categories")])),
        ])
    });

/// Fields that become relations (or objects of their own) instead of content
const ROOT_STRUCTURE: &[&str] = &[
    "type",
    "workflow",
    "workflow_start",
    "workflow_exception",
    "playbook_variables",
    "agent_definitions",
    "target_definitions",
];

const STEP_STRUCTURE: &[&str] = &[
    "type",
    "on_completion",
    "on_success",
    "on_failure",
    "on_true",
    "on_false",
    "next_steps",
    "agent",
    "targets",
    "cases",
    "step_variables",
    "playbook_id",
];

fn is_structural(form_tag: &str, key: &str) -> bool {
    match form_tag {
        "playbook" => ROOT_STRUCTURE.contains(&key),
        "agent" | "target" | "variable" | "case" => false,
        _ => STEP_STRUCTURE.contains(&key),
    }
}

/// Normalized name of `key` under `form_tag`, `None` if the field is not
/// kept as content
pub fn normalized_name<'k>(form_tag: &str, key: &'k str) -> Option<Cow<'k, str>> {
    if is_structural(form_tag, key) {
        return None;
    }
    if let Some(renamed) = FORM_RENAMES.get(form_tag).and_then(|m| m.get(key)) {
        return Some(Cow::Borrowed(*renamed));
    }
    if let Some(renamed) = COMMON_RENAMES.get(key) {
        return Some(Cow::Borrowed(*renamed));
    }
    if key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        Some(Cow::Borrowed(key))
    } else {
        Some(Cow::Owned(key.to_lowercase().replace('-', "_")))
    }
}

/// Content mapping for one object, in source order.
/// When two source fields normalize to the same name the first one wins.
pub fn normalize(form_tag: &str, source: &Map<String, Value>) -> Map<String, Value> {
    let mut content = Map::new();
    for (key, value) in source {
        if let Some(name) = normalized_name(form_tag, key) {
            if !content.contains_key(name.as_ref()) {
                content.insert(name.into_owned(), value.clone());
            }
        }
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_common_renames() {
        assert_eq!(normalized_name("action", "delay").as_deref(), Some("delay_ms"));
        assert_eq!(normalized_name("playbook", "id").as_deref(), Some("cacao_id"));
        assert_eq!(
            normalized_name("switch-condition", "switch").as_deref(),
            Some("switch_variable")
        );
    }

    #[test]
    fn test_form_specific_renames() {
        assert_eq!(normalized_name("agent", "type").as_deref(), Some("agent_type"));
        assert_eq!(normalized_name("target", "type").as_deref(), Some("target_type"));
        assert_eq!(normalized_name("action", "type"), None);
    }

    #[test]
    fn test_unknown_keys_are_normalized() {
        assert_eq!(
            normalized_name("action", "X-Vendor-Field").as_deref(),
            Some("x_vendor_field")
        );
        assert!(matches!(
            normalized_name("action", "plain_key"),
            Some(Cow::Borrowed("plain_key"))
        ));
    }

    #[test]
    fn test_structural_fields_are_dropped() {
        let step = json!({
            "type": "if-condition",
            "name": "Check",
            "condition": "[$$a$$ = 1]",
            "on_true": "x",
            "on_false": "y",
            "step_variables": {},
            "timeout": 30
        });
        let content = normalize("if-condition", step.as_object().unwrap());
        let keys: Vec<_> = content.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "condition", "timeout_ms"]);
    }

    #[test]
    fn test_first_colliding_field_wins() {
        let step = json!({"in_args": ["$$a$$"], "input_arguments": ["$$b$$"]});
        let content = normalize("action", step.as_object().unwrap());
        assert_eq!(content["input_arguments"], json!(["$$a$$"]));
        assert_eq!(content.len(), 1);
    }
}
