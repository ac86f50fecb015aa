//! Integration tests for playbook ingestion and condition evaluation
//!
//! These exercise the public API end to end: load, validate, flatten,
//! save, and evaluate the branching steps of a stored playbook.

use cacao_rs::automation::branch::next_steps;
use cacao_rs::automation::condition::{evaluate, evaluate_str, parse};
use cacao_rs::automation::variables::{resolve_str, VariableContext};
use cacao_rs::cacao::ingest::Deserializer;
use cacao_rs::cacao::loader::DocumentLoader;
use cacao_rs::cacao::schema::{validate, Level};
use cacao_rs::cacao::store::{FileStore, MemoryStore, PlaybookStore};
use cacao_rs::cacao::types::WorkflowStep;
use cacao_rs::error::{PlaybookError, StorageError};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

const PLAYBOOK_YAML: &str = r#"
type: playbook
spec_version: cacao-2.0
id: playbook--0f5e3a61-8d2b-4c7e-9a10-2b3c4d5e6f70
name: Phishing triage
description: Triage a reported phishing mail
created: "2024-03-01T09:30:00Z"
workflow_start: start--8c1f7d2e-3a4b-4c5d-8e9f-0a1b2c3d4e5f
playbook_variables:
  $$severity$$:
    type: string
    value: high
  $$score$$:
    type: float
    value: 7.5
  $$sender$$:
    type: dictionary
    value:
      domain: example.org
      hops: [mx1, mx2]
agent_definitions:
  soc:
    type: individual
    name: SOC analyst
workflow:
  start--8c1f7d2e-3a4b-4c5d-8e9f-0a1b2c3d4e5f:
    type: start
    on_completion: if-condition--1d2e3f40-5a6b-4c7d-8e9f-a0b1c2d3e4f5
  if-condition--1d2e3f40-5a6b-4c7d-8e9f-a0b1c2d3e4f5:
    type: if-condition
    name: Is it serious
    condition: "[$$score$$ >= 7] AND [$$sender$$:hops[*] = 'mx2']"
    on_true: switch-condition--2e3f4051-6b7c-4d8e-9fa0-b1c2d3e4f506
    on_false: end--3f405162-7c8d-4e9f-a0b1-c2d3e4f50617
  switch-condition--2e3f4051-6b7c-4d8e-9fa0-b1c2d3e4f506:
    type: switch-condition
    name: Route by severity
    switch: $$severity$$
    cases:
      high: action--40516273-8d9e-4fa0-b1c2-d3e4f5061728
      default: end--3f405162-7c8d-4e9f-a0b1-c2d3e4f50617
  action--40516273-8d9e-4fa0-b1c2-d3e4f5061728:
    type: action
    name: Quarantine mailbox
    agent: soc
    commands:
      - type: manual
        command: Quarantine the mailbox of the recipient
    on_completion: end--3f405162-7c8d-4e9f-a0b1-c2d3e4f50617
  end--3f405162-7c8d-4e9f-a0b1-c2d3e4f50617:
    type: end
    name: Done
"#;

const IF_STEP: &str = "if-condition--1d2e3f40-5a6b-4c7d-8e9f-a0b1c2d3e4f5";
const SWITCH_STEP: &str = "switch-condition--2e3f4051-6b7c-4d8e-9fa0-b1c2d3e4f506";
const ACTION_STEP: &str = "action--40516273-8d9e-4fa0-b1c2-d3e4f5061728";
const END_STEP: &str = "end--3f405162-7c8d-4e9f-a0b1-c2d3e4f50617";

fn document() -> Value {
    DocumentLoader::parse_yaml(PLAYBOOK_YAML).expect("Failed to parse YAML")
}

fn playbook_context(document: &Value) -> VariableContext {
    VariableContext::from_json(&document["playbook_variables"]).unwrap()
}

fn step(document: &Value, id: &str) -> WorkflowStep {
    serde_json::from_value(document["workflow"][id].clone()).unwrap()
}

fn resolver_context() -> VariableContext {
    VariableContext::from_json(&json!({
        "$$var_int$$": {"type": "integer", "value": 1},
        "$$var_dict$$": {"type": "dictionary", "value": {"key": ["value1", "value2"]}}
    }))
    .unwrap()
}

// ============================================================================
// Validation Tests
// ============================================================================

#[test]
fn test_yaml_playbook_is_valid() {
    let report = validate(&document());
    assert!(report.valid, "{:?}", report.errors);
    assert_eq!(report.count(Level::Error), 0);
    assert_eq!(report.count(Level::Warning), 0, "{:?}", report.errors);
}

#[test]
fn test_validity_matches_deserialization() {
    let base = document();
    let mut variants = vec![base.clone()];

    let mut missing_start = base.clone();
    missing_start.as_object_mut().unwrap().remove("workflow_start");
    variants.push(missing_start);

    let mut dangling = base.clone();
    dangling["workflow"][ACTION_STEP]["on_completion"] = json!("end--missing");
    variants.push(dangling);

    let mut bad_condition = base.clone();
    bad_condition["workflow"][IF_STEP]["condition"] = json!("[$$score$$ >= ] AND");
    variants.push(bad_condition);

    let mut bad_variable = base.clone();
    bad_variable["playbook_variables"]["$$score$$"]["value"] = json!("seven");
    variants.push(bad_variable);

    let mut unknown_agent = base.clone();
    unknown_agent["workflow"][ACTION_STEP]["agent"] = json!("ghost");
    variants.push(unknown_agent);

    let mut warned_only = base;
    warned_only["workflow"]["end--orphan"] = json!({"type": "end"});
    variants.push(warned_only);

    for variant in variants {
        let report = validate(&variant);
        let mut deserializer = Deserializer::new(variant, "Phishing triage");
        let result = deserializer.deserialize().map(|_| ());
        assert_eq!(
            report.valid,
            result.is_ok(),
            "report {:?} vs deserialize {:?}",
            report.errors,
            result.err()
        );
    }
}

// ============================================================================
// Ingestion Tests
// ============================================================================

#[tokio::test]
async fn test_import_twice_keeps_one_copy() {
    let store = MemoryStore::new();

    for _ in 0..2 {
        let mut deserializer = Deserializer::new(document(), "Phishing triage");
        deserializer.deserialize().unwrap();
        deserializer
            .save_with_deadline(&store, Duration::from_secs(5))
            .await
            .unwrap();
    }

    let stored = store.load("Phishing triage").await.unwrap().unwrap();
    let ids: HashSet<_> = stored.objects.iter().map(|o| o.identifier.as_str()).collect();
    assert_eq!(ids.len(), stored.objects.len());

    let edges: HashSet<_> = stored
        .relations
        .iter()
        .map(|r| (r.subject.as_str(), r.predicate.as_str(), r.object.object_id()))
        .collect();
    assert_eq!(edges.len(), stored.relations.len());

    assert!(stored.playbook.last_change.is_some());
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stored_graph_mirrors_workflow_edges() {
    let store = MemoryStore::new();
    let mut deserializer = Deserializer::new(document(), "Phishing triage");
    deserializer.deserialize().unwrap();
    deserializer.save(&store).await.unwrap();

    let stored = store.load("Phishing triage").await.unwrap().unwrap();
    let action = stored
        .objects
        .iter()
        .find(|o| o.identifier.ends_with(ACTION_STEP))
        .unwrap();
    assert_eq!(action.form_tag, "action");
    assert_eq!(action.content["name"], "Quarantine mailbox");

    let successors: Vec<_> = stored
        .relations_from(&action.identifier)
        .filter_map(|r| r.object.object_id())
        .collect();
    assert!(successors.iter().any(|id| id.ends_with(END_STEP)));
    assert!(successors.iter().any(|id| id.ends_with("/agent/soc")));
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("cacao-it-{}", uuid::Uuid::new_v4()));
    let path = dir.join("store.json");

    let mut deserializer = Deserializer::new(document(), "Phishing triage");
    deserializer.deserialize().unwrap();
    deserializer.save(&FileStore::new(&path)).await.unwrap();

    let reopened = FileStore::new(&path);
    let stored = reopened.load("Phishing triage").await.unwrap().unwrap();
    assert_eq!(stored.objects.len(), deserializer.records().len());
    assert!(reopened.remove("Phishing triage").await.unwrap());
    assert!(reopened.list().await.unwrap().is_empty());

    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn test_names_sharing_a_page_id_conflict() {
    let store = MemoryStore::new();
    let mut first = Deserializer::new(document(), "Phishing triage");
    first.deserialize().unwrap();
    first.save(&store).await.unwrap();

    let mut second = Deserializer::new(document(), "phishing-triage");
    second.deserialize().unwrap();
    let err = second.save(&store).await.unwrap_err();
    match err {
        PlaybookError::Storage(StorageError::DuplicatePageId { page_id, holder, .. }) => {
            assert_eq!(page_id, "Playbook:phishing-triage");
            assert_eq!(holder, "Phishing triage");
        }
        other => panic!("unexpected error: {}", other),
    }

    let names: Vec<_> = store.list().await.unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Phishing triage"]);
}

#[tokio::test]
async fn test_expired_deadline_leaves_file_store_untouched() {
    let dir = std::env::temp_dir().join(format!("cacao-it-{}", uuid::Uuid::new_v4()));
    let path = dir.join("store.json");
    let store = FileStore::new(&path);

    let mut deserializer = Deserializer::new(document(), "Phishing triage");
    deserializer.deserialize().unwrap();
    deserializer.save(&store).await.unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let mut renamed = Deserializer::new(document(), "Other triage");
    renamed.deserialize().unwrap();
    let err = renamed
        .save_with_deadline(&store, Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybookError::Storage(StorageError::Timeout(_))));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    assert!(store.load("Other triage").await.unwrap().is_none());

    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn test_invalid_document_never_reaches_store() {
    let store = MemoryStore::new();
    let mut doc = document();
    doc["workflow"][SWITCH_STEP]
        .as_object_mut()
        .unwrap()
        .remove("cases");

    let mut deserializer = Deserializer::new(doc, "Phishing triage");
    assert!(deserializer.deserialize().is_err());
    let err = deserializer.save(&store).await.unwrap_err();
    assert!(matches!(err, PlaybookError::Schema(_)));
    assert!(store.list().await.unwrap().is_empty());
}

// ============================================================================
// Variable Resolution Tests
// ============================================================================

#[test]
fn test_resolve_indexed_and_wildcard_paths() {
    let context = resolver_context();
    assert_eq!(
        resolve_str("$$var_dict$$:key[0]", &context).unwrap(),
        vec![json!("value1")]
    );
    assert_eq!(
        resolve_str("$$var_dict$$:key[*]", &context).unwrap(),
        vec![json!("value1"), json!("value2")]
    );
}

#[test]
fn test_resolve_missing_variable_fails() {
    let err = resolve_str("$$missing$$", &resolver_context()).unwrap_err();
    assert!(matches!(err, PlaybookError::Resolution(_)));
}

// ============================================================================
// Condition Tests
// ============================================================================

#[test]
fn test_condition_properties() {
    let context = resolver_context();
    for expression in [
        "[$$var_int$$ = 1]",
        "[$$var_int$$ < 10.5]",
        "[$$var_dict$$:key[*] = 'value1'] AND [$$var_int$$ < 10]",
    ] {
        let condition = parse(expression).unwrap();
        assert!(evaluate(&condition, &context).unwrap(), "{}", expression);
    }
}

#[test]
fn test_malformed_condition_is_syntax_error() {
    let err = evaluate_str("[$$a$$ = ] AND", &resolver_context()).unwrap_err();
    assert!(matches!(err, PlaybookError::Syntax(_)));
    assert!(parse("[$$a$$ = ] AND").is_err());
}

#[test]
fn test_failing_clause_is_reported() {
    let err = evaluate_str("[$$var_int$$ = 1] AND [$$nope$$ = 2]", &resolver_context()).unwrap_err();
    match err {
        PlaybookError::Evaluation(e) => {
            assert_eq!(e.clause, "[$$nope$$ = 2]");
            assert_eq!(e.variable, "$$nope$$");
        }
        other => panic!("unexpected error: {}", other),
    }
}

// ============================================================================
// Branching Tests
// ============================================================================

#[test]
fn test_walk_branches_with_playbook_variables() {
    let doc = document();
    let context = playbook_context(&doc);

    assert_eq!(next_steps(&step(&doc, IF_STEP), &context).unwrap(), vec![SWITCH_STEP]);
    assert_eq!(
        next_steps(&step(&doc, SWITCH_STEP), &context).unwrap(),
        vec![ACTION_STEP]
    );
    assert_eq!(
        next_steps(&step(&doc, ACTION_STEP), &context).unwrap(),
        vec![END_STEP]
    );
    assert!(next_steps(&step(&doc, END_STEP), &context).unwrap().is_empty());
}

#[test]
fn test_low_score_ends_early() {
    let mut doc = document();
    doc["playbook_variables"]["$$score$$"]["value"] = json!(2.0);
    doc["playbook_variables"]["$$severity$$"]["value"] = json!("low");
    let context = playbook_context(&doc);

    assert_eq!(next_steps(&step(&doc, IF_STEP), &context).unwrap(), vec![END_STEP]);
    assert_eq!(
        next_steps(&step(&doc, SWITCH_STEP), &context).unwrap(),
        vec![END_STEP]
    );
}
