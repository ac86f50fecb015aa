// SPDX-License-Identifier: MIT

//! Deserializer - flattens a validated document into a staged object graph
//! and commits it to a store

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::fields::normalize;
use super::graph::StagedGraph;
use crate::automation::variables::VariableDescriptor;
use crate::cacao::model::{Playbook, PlaybookObject, RelationObject, SemanticRelation};
use crate::cacao::schema::{validate, Level, ValidationReport};
use crate::cacao::store::{before_deadline, Deadline, PlaybookStore, StoreTransaction};
use crate::cacao::types::{PlaybookDocument, WorkflowStep};
use crate::error::{PlaybookError, SchemaError, StorageError};

/// Imports one document under one playbook name
pub struct Deserializer {
    document: Value,
    playbook_name: String,
    staged: Option<StagedGraph>,
}

impl Deserializer {
    pub fn new(document: Value, playbook_name: impl Into<String>) -> Self {
        Self {
            document,
            playbook_name: playbook_name.into(),
            staged: None,
        }
    }

    pub fn validate(&self) -> ValidationReport {
        validate(&self.document)
    }

    /// Validate, then stage every object and relation. Nothing leaves the
    /// process until [`Deserializer::save`].
    pub fn deserialize(&mut self) -> Result<&StagedGraph, SchemaError> {
        let report = self.validate();
        if !report.valid {
            let errors = report
                .errors
                .into_iter()
                .filter(|e| e.level == Level::Error)
                .collect();
            return Err(SchemaError::from_report(errors));
        }

        let doc: PlaybookDocument =
            serde_json::from_value(self.document.clone()).map_err(model_mismatch)?;
        let graph = Flattener::new(&self.document, &self.playbook_name, doc.description.clone())?
            .run(&doc)?;
        log::info!(
            "Staged playbook '{}': {} object(s), {} relation(s)",
            self.playbook_name,
            graph.objects().len(),
            graph.relations().len()
        );
        Ok(self.staged.insert(graph))
    }

    /// Staged records in creation order; empty before `deserialize`
    pub fn records(&self) -> &[PlaybookObject] {
        self.staged
            .as_ref()
            .map(StagedGraph::objects)
            .unwrap_or_default()
    }

    pub fn relations(&self) -> &[SemanticRelation] {
        self.staged
            .as_ref()
            .map(StagedGraph::relations)
            .unwrap_or_default()
    }

    pub fn playbook(&self) -> Option<&Playbook> {
        self.staged.as_ref().map(StagedGraph::playbook)
    }

    /// Commit the staged graph as one transaction, replacing anything
    /// stored under the same playbook name
    pub async fn save(&self, store: &dyn PlaybookStore) -> Result<(), PlaybookError> {
        self.commit_graph(store, None).await
    }

    /// [`Deserializer::save`] bounded by a deadline. Expiry while writes are
    /// still being staged rolls the transaction back and reports `Timeout`.
    /// Once the store has started writing, the commit is not interrupted
    /// and its own outcome is returned.
    pub async fn save_with_deadline(
        &self,
        store: &dyn PlaybookStore,
        budget: Duration,
    ) -> Result<(), PlaybookError> {
        let result = self.commit_graph(store, Some(Deadline::after(budget))).await;
        if let Err(PlaybookError::Storage(StorageError::Timeout(_))) = &result {
            log::warn!(
                "Saving '{}' exceeded {:?}; rolled back",
                self.playbook_name,
                budget
            );
        }
        result
    }

    async fn commit_graph(&self, store: &dyn PlaybookStore, deadline: Option<Deadline>) -> Result<(), PlaybookError> {
        let staged = self
            .staged
            .as_ref()
            .filter(|g| !g.is_empty())
            .ok_or_else(|| SchemaError::other("nothing staged; deserialize the document first"))?;

        let mut tx = before_deadline(deadline, store.begin()).await??;
        let staging = before_deadline(deadline, write_graph(tx.as_mut(), staged))
            .await
            .and_then(|written| written);
        if let Err(e) = staging {
            if let Err(rollback) = tx.rollback().await {
                log::error!("Rollback failed: {}", rollback);
            }
            return Err(e.into());
        }
        match deadline {
            Some(deadline) => tx.commit_within(deadline).await?,
            None => tx.commit().await?,
        }

        log::info!("Saved playbook '{}'", staged.playbook().name);
        Ok(())
    }
}

async fn write_graph(tx: &mut dyn StoreTransaction, graph: &StagedGraph) -> Result<(), StorageError> {
    let name = graph.playbook().name.as_str();
    tx.delete_playbook(name).await?;
    tx.put_playbook(graph.playbook().clone()).await?;
    for object in graph.objects() {
        tx.create_object(name, object.clone()).await?;
    }
    for relation in graph.relations() {
        tx.create_relation(relation.clone()).await?;
    }
    tx.touch_playbook(name, Utc::now()).await
}

fn model_mismatch(e: serde_json::Error) -> SchemaError {
    SchemaError::other(format!("document does not match the playbook model: {}", e))
}

/// One pass over a validated document
struct Flattener<'d> {
    raw: &'d Map<String, Value>,
    graph: StagedGraph,
    root: String,
    /// Document key -> staged identifier, per kind of entity
    steps: HashMap<String, String>,
    agents: HashMap<String, String>,
    targets: HashMap<String, String>,
    /// Switch step key -> case identifiers, in case order
    cases: HashMap<String, Vec<String>>,
}

impl<'d> Flattener<'d> {
    fn new(document: &'d Value, playbook_name: &str, description: Option<String>) -> Result<Self, SchemaError> {
        let raw = document
            .as_object()
            .ok_or_else(|| SchemaError::other("document is not an object"))?;

        Ok(Self {
            raw,
            graph: StagedGraph::new(Playbook::new(playbook_name, description)),
            root: String::new(),
            steps: HashMap::new(),
            agents: HashMap::new(),
            targets: HashMap::new(),
            cases: HashMap::new(),
        })
    }

    fn run(mut self, doc: &PlaybookDocument) -> Result<StagedGraph, SchemaError> {
        let steps = doc.steps().map_err(model_mismatch)?;

        // objects first, so every relation below has both ends staged
        self.stage_root();
        let root = self.root.clone();
        self.stage_variables(&root, &doc.playbook_variables, "variable", None)?;
        self.agents = self.stage_definitions("agent", &doc.agent_definitions);
        self.targets = self.stage_definitions("target", &doc.target_definitions);
        for (key, step) in &steps {
            self.stage_step(key, step)?;
        }

        for (key, step) in &steps {
            let id = self.step_id(key)?;
            self.graph.link(&root, "has_step", &id)?;
            self.link_step(key, &id, step)?;
        }
        let start = self.step_id(&doc.workflow_start)?;
        self.graph.link(&root, "workflow_start", &start)?;
        if let Some(exception) = &doc.workflow_exception {
            let exception = self.step_id(exception)?;
            self.graph.link(&root, "workflow_exception", &exception)?;
        }

        Ok(self.graph)
    }

    fn stage_root(&mut self) {
        let id = self.graph.identifier("playbook", None);
        self.root = self.graph.add_object(id, "playbook", normalize("playbook", self.raw));
    }

    fn stage_definitions(&mut self, kind: &str, definitions: &Map<String, Value>) -> HashMap<String, String> {
        let mut ids = HashMap::new();
        for (key, definition) in definitions {
            let mut content = definition
                .as_object()
                .map(|fields| normalize(kind, fields))
                .unwrap_or_default();
            content.insert(format!("{}_key", kind), json!(key));

            let id = self.graph.identifier(kind, Some(key));
            let id = self.graph.add_object(id, kind, content);
            ids.insert(key.clone(), id);
        }
        ids
    }

    /// Stage variable objects and link them to `owner` with `has_variable`
    fn stage_variables(
        &mut self,
        owner: &str,
        definitions: &Map<String, Value>,
        kind: &str,
        scope: Option<&str>,
    ) -> Result<(), SchemaError> {
        for (key, definition) in definitions {
            let descriptor = VariableDescriptor::from_definition(key, definition)
                .map_err(|e| SchemaError::other(e.to_string()))?;

            let mut content = Map::new();
            content.insert("variable_id".to_string(), json!(descriptor.id()));
            content.insert("variable_type".to_string(), json!(descriptor.var_type().as_str()));
            content.insert("value".to_string(), descriptor.value().clone());
            content.insert("constant".to_string(), json!(descriptor.is_constant()));
            if let Some(description) = descriptor.description() {
                content.insert("description".to_string(), json!(description));
            }

            let local_key = match scope {
                Some(step) => format!("{}/{}", step, key),
                None => key.clone(),
            };
            let id = self.graph.identifier(kind, Some(&local_key));
            let id = self.graph.add_object(id, "variable", content);
            self.graph.link(owner, "has_variable", &id)?;
        }
        Ok(())
    }

    fn stage_step(&mut self, key: &str, step: &WorkflowStep) -> Result<(), SchemaError> {
        let kind = step.kind().as_str();
        let raw = self
            .raw
            .get("workflow")
            .and_then(|w| w.get(key))
            .and_then(Value::as_object)
            .ok_or_else(|| SchemaError::other(format!("step '{}' vanished from the document", key)))?;

        let id = self.graph.identifier(kind, Some(key));
        let id = self.graph.add_object(id, kind, normalize(kind, raw));
        self.steps.insert(key.to_string(), id.clone());

        self.stage_variables(&id, &step.common().step_variables, "step-variable", Some(key))?;

        if let WorkflowStep::SwitchCondition(switch) = step {
            let mut case_ids = Vec::new();
            for (value, _) in switch.case_targets() {
                let mut content = Map::new();
                content.insert("case_value".to_string(), json!(value));
                let case_id = self.graph.identifier("case", Some(&format!("{}/{}", key, value)));
                let case_id = self.graph.add_object(case_id, "case", content);
                self.graph.link(&id, "has_case", &case_id)?;
                case_ids.push(case_id);
            }
            self.cases.insert(key.to_string(), case_ids);
        }
        Ok(())
    }

    fn link_step(&mut self, key: &str, id: &str, step: &WorkflowStep) -> Result<(), SchemaError> {
        for edge in step.edges() {
            let target = self.step_id(edge.target)?;
            self.graph.link(id, edge.kind.predicate(), &target)?;
        }

        match step {
            WorkflowStep::Action(action) => {
                if let Some(agent) = &action.agent {
                    let agent_id = lookup(&self.agents, "agent", agent)?;
                    self.graph.link(id, "agent", &agent_id)?;
                }
                for target in &action.targets {
                    let target_id = lookup(&self.targets, "target", target)?;
                    self.graph.link(id, "target", &target_id)?;
                }
            }
            WorkflowStep::SwitchCondition(switch) => {
                let cases = self.cases.get(key).cloned().unwrap_or_default();
                for (case_id, (_, targets)) in cases.iter().zip(switch.case_targets()) {
                    for target in targets {
                        let target_id = self.step_id(target)?;
                        self.graph.link(case_id, "case_step", &target_id)?;
                    }
                }
            }
            WorkflowStep::PlaybookAction(call) => {
                if let Some(playbook_id) = &call.playbook_id {
                    self.graph.add_relation(
                        id,
                        "playbook_reference",
                        RelationObject::Literal(json!(playbook_id)),
                    )?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn step_id(&self, key: &str) -> Result<String, SchemaError> {
        lookup(&self.steps, "step", key)
    }
}

fn lookup(ids: &HashMap<String, String>, kind: &str, key: &str) -> Result<String, SchemaError> {
    ids.get(key)
        .cloned()
        .ok_or_else(|| SchemaError::other(format!("reference to unknown {} '{}'", kind, key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cacao::model::PlaybookObject;
    use crate::cacao::store::{MemoryStore, StoredPlaybook};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    fn document() -> Value {
        json!({
            "type": "playbook",
            "spec_version": "cacao-2.0",
            "id": "playbook--1b2c3d4e-5f60-4a7b-8c9d-0e1f2a3b4c5d",
            "name": "Contain host",
            "description": "Isolate a host when severity is high",
            "created_by": "identity--soc",
            "workflow_start": "start--1",
            "playbook_variables": {
                "$$severity$$": {"type": "string", "value": "high"},
                "$$hosts$$": {"type": "list", "value": ["web-1", "web-2"]}
            },
            "agent_definitions": {"soc": {"type": "individual", "name": "SOC analyst"}},
            "target_definitions": {"edr": {"type": "security-category", "name": "EDR"}},
            "workflow": {
                "start--1": {"type": "start", "on_completion": "switch--1"},
                "switch--1": {
                    "type": "switch-condition",
                    "switch": "$$severity$$",
                    "cases": {"high": "action--1", "default": "end--1"}
                },
                "action--1": {
                    "type": "action",
                    "name": "Isolate",
                    "delay": 500,
                    "commands": [{"type": "manual", "command": "isolate $$hosts$$"}],
                    "agent": "soc",
                    "targets": ["edr"],
                    "step_variables": {"$$ticket$$": {"type": "string"}},
                    "on_success": "sub--1",
                    "on_failure": "end--1"
                },
                "sub--1": {
                    "type": "playbook-action",
                    "playbook_id": "playbook--00000000-0000-4000-8000-000000000001",
                    "on_completion": "end--1"
                },
                "end--1": {"type": "end"}
            }
        })
    }

    fn staged() -> Deserializer {
        let mut d = Deserializer::new(document(), "Contain host");
        d.deserialize().unwrap();
        d
    }

    fn find<'a>(d: &'a Deserializer, suffix: &str) -> &'a PlaybookObject {
        d.records()
            .iter()
            .find(|r| r.identifier.ends_with(suffix))
            .unwrap_or_else(|| panic!("no record ending in {}", suffix))
    }

    fn has_relation(d: &Deserializer, subject: &str, predicate: &str, object: &str) -> bool {
        d.relations().iter().any(|r| {
            r.subject.ends_with(subject)
                && r.predicate == predicate
                && r.object.object_id().map_or(false, |id| id.ends_with(object))
        })
    }

    #[test]
    fn test_records_and_identifiers() {
        let d = staged();
        let prefix = super::super::graph::playbook_prefix("Contain host");

        let root = &d.records()[0];
        assert_eq!(root.identifier, format!("{}/playbook", prefix));
        assert_eq!(root.form_tag, "playbook");
        assert_eq!(root.content["author"], json!("identity--soc"));
        assert!(!root.content.contains_key("workflow"));

        let action = find(&d, "/action/action--1");
        assert_eq!(action.form_tag, "action");
        assert_eq!(action.content["delay_ms"], json!(500));
        assert!(action.content.contains_key("commands"));
        assert!(!action.content.contains_key("on_success"));
        assert!(!action.content.contains_key("agent"));

        let ticket = find(&d, "/step-variable/action--1/$$ticket$$");
        assert_eq!(ticket.content["value"], json!(""));
        assert_eq!(find(&d, "/agent/soc").content["agent_type"], json!("individual"));
        assert_eq!(find(&d, "/case/switch--1/high").form_tag, "case");
        assert!(d.records().iter().all(|r| r.identifier.starts_with(&prefix)));
    }

    #[test]
    fn test_edges_become_relations() {
        let d = staged();
        assert!(has_relation(&d, "/playbook", "workflow_start", "/start/start--1"));
        assert!(has_relation(&d, "/playbook", "has_step", "/end/end--1"));
        assert!(has_relation(&d, "/playbook", "has_variable", "/variable/$$severity$$"));
        assert!(has_relation(&d, "/start/start--1", "next_step", "/switch-condition/switch--1"));
        assert!(has_relation(&d, "/action/action--1", "on_success", "/playbook-action/sub--1"));
        assert!(has_relation(&d, "/action/action--1", "on_failure", "/end/end--1"));
        assert!(has_relation(&d, "/action/action--1", "agent", "/agent/soc"));
        assert!(has_relation(&d, "/action/action--1", "target", "/target/edr"));
        assert!(has_relation(&d, "/action/action--1", "has_variable", "$$ticket$$"));
        assert!(has_relation(&d, "/switch-condition/switch--1", "has_case", "/case/switch--1/high"));
        assert!(has_relation(&d, "/case/switch--1/high", "case_step", "/action/action--1"));
        assert!(has_relation(&d, "/case/switch--1/default", "case_step", "/end/end--1"));

        let reference = d
            .relations()
            .iter()
            .find(|r| r.predicate == "playbook_reference")
            .unwrap();
        assert_eq!(
            reference.object,
            RelationObject::Literal(json!("playbook--00000000-0000-4000-8000-000000000001"))
        );
    }

    #[test]
    fn test_no_dangling_relations() {
        let d = staged();
        let ids: Vec<_> = d.records().iter().map(|r| r.identifier.as_str()).collect();
        for relation in d.relations() {
            assert!(ids.contains(&relation.subject.as_str()));
            if let Some(object) = relation.object.object_id() {
                assert!(ids.contains(&object), "dangling {:?}", relation);
            }
        }
    }

    #[test]
    fn test_deterministic_output() {
        let a = staged();
        let b = staged();
        assert_eq!(a.records(), b.records());
        assert_eq!(a.relations(), b.relations());
    }

    #[test]
    fn test_invalid_document_fails_with_every_error() {
        let mut doc = document();
        doc["workflow"]["action--1"]["agent"] = json!("ghost");
        doc["workflow"]["start--1"]["on_completion"] = json!("nowhere");
        let mut d = Deserializer::new(doc, "Contain host");

        let err = d.deserialize().unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert!(err.errors.iter().all(|e| e.level == Level::Error));
        assert!(d.records().is_empty());
    }

    #[test]
    fn test_validity_matches_deserialization() {
        let mut broken = document();
        broken["workflow"]["action--1"]["timeout"] = json!("soon");
        let mut warned = document();
        warned["created"] = json!("last tuesday");

        for doc in [document(), broken, warned, json!({}), json!("text")] {
            let report = validate(&doc);
            let mut d = Deserializer::new(doc, "pb");
            assert_eq!(report.valid, d.deserialize().is_ok(), "{:?}", report.errors);
        }
    }

    #[tokio::test]
    async fn test_save_twice_replaces() {
        let store = MemoryStore::new();
        let d = staged();
        d.save(&store).await.unwrap();
        d.save(&store).await.unwrap();

        let stored = store.load("Contain host").await.unwrap().unwrap();
        assert_eq!(stored.objects.len(), d.records().len());
        assert_eq!(stored.relations.len(), d.relations().len());
        assert!(stored.playbook.last_change.is_some());
        assert_eq!(stored.playbook.page_id, "Playbook:contain-host");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reimport_drops_removed_steps() {
        let store = MemoryStore::new();
        staged().save(&store).await.unwrap();

        let mut smaller = document();
        smaller["workflow"]["start--1"]["on_completion"] = json!("end--1");
        let workflow = smaller["workflow"].as_object_mut().unwrap();
        workflow.remove("switch--1");
        workflow.remove("action--1");
        workflow.remove("sub--1");
        let mut d = Deserializer::new(smaller, "Contain host");
        d.deserialize().unwrap();
        d.save(&store).await.unwrap();

        let stored = store.load("Contain host").await.unwrap().unwrap();
        assert!(stored.objects.iter().all(|o| !o.identifier.contains("action--1")));
        assert_eq!(stored.objects.len(), d.records().len());
    }

    #[tokio::test]
    async fn test_save_before_deserialize() {
        let d = Deserializer::new(document(), "pb");
        let err = d.save(&MemoryStore::new()).await.unwrap_err();
        assert!(matches!(err, PlaybookError::Schema(_)));
    }

    /// Store whose transactions fail or slow down on a chosen operation
    #[derive(Clone, Default)]
    struct FaultyStore {
        inner: MemoryStore,
        fail_relations: bool,
        relation_delay: Duration,
        commit_delay: Duration,
    }

    struct FaultyTransaction {
        inner: Box<dyn StoreTransaction>,
        fail_relations: bool,
        relation_delay: Duration,
        commit_delay: Duration,
    }

    #[async_trait]
    impl PlaybookStore for FaultyStore {
        async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
            Ok(Box::new(FaultyTransaction {
                inner: self.inner.begin().await?,
                fail_relations: self.fail_relations,
                relation_delay: self.relation_delay,
                commit_delay: self.commit_delay,
            }))
        }

        async fn load(&self, name: &str) -> Result<Option<StoredPlaybook>, StorageError> {
            self.inner.load(name).await
        }

        async fn list(&self) -> Result<Vec<Playbook>, StorageError> {
            self.inner.list().await
        }
    }

    #[async_trait]
    impl StoreTransaction for FaultyTransaction {
        async fn delete_playbook(&mut self, name: &str) -> Result<(), StorageError> {
            self.inner.delete_playbook(name).await
        }

        async fn put_playbook(&mut self, playbook: Playbook) -> Result<(), StorageError> {
            self.inner.put_playbook(playbook).await
        }

        async fn create_object(&mut self, playbook: &str, object: PlaybookObject) -> Result<(), StorageError> {
            self.inner.create_object(playbook, object).await
        }

        async fn create_relation(&mut self, relation: SemanticRelation) -> Result<(), StorageError> {
            if self.fail_relations {
                return Err(StorageError::backend("relation table unavailable"));
            }
            tokio::time::sleep(self.relation_delay).await;
            self.inner.create_relation(relation).await
        }

        async fn touch_playbook(&mut self, name: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
            self.inner.touch_playbook(name, at).await
        }

        async fn commit(&mut self) -> Result<(), StorageError> {
            tokio::time::sleep(self.commit_delay).await;
            self.inner.commit().await
        }

        async fn rollback(&mut self) -> Result<(), StorageError> {
            self.inner.rollback().await
        }
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let inner = MemoryStore::new();
        staged().save(&inner).await.unwrap();
        let before = inner.snapshot().await;

        let store = FaultyStore {
            inner: inner.clone(),
            fail_relations: true,
            ..FaultyStore::default()
        };
        let err = staged().save(&store).await.unwrap_err();
        assert!(matches!(err, PlaybookError::Storage(StorageError::Backend(_))));
        assert_eq!(inner.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_deadline_expiry_discards_writes() {
        let inner = MemoryStore::new();
        let store = FaultyStore {
            inner: inner.clone(),
            relation_delay: Duration::from_secs(3600),
            ..FaultyStore::default()
        };
        let err = staged()
            .save_with_deadline(&store, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybookError::Storage(StorageError::Timeout(_))));
        assert!(inner.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_started_commit_reports_its_own_outcome() {
        let inner = MemoryStore::new();
        let store = FaultyStore {
            inner: inner.clone(),
            commit_delay: Duration::from_millis(150),
            ..FaultyStore::default()
        };
        staged()
            .save_with_deadline(&store, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(inner.load("Contain host").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_deadline_before_commit_writes_nothing() {
        let inner = MemoryStore::new();
        let store = FaultyStore {
            inner: inner.clone(),
            ..FaultyStore::default()
        };
        let err = staged()
            .save_with_deadline(&store, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybookError::Storage(StorageError::Timeout(_))));
        assert!(inner.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_not_hit() {
        let store = MemoryStore::new();
        staged()
            .save_with_deadline(&store, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(store.load("Contain host").await.unwrap().is_some());
    }
}
