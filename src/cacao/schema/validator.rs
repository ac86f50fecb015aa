// SPDX-License-Identifier: MIT

//! Schema validator
//!
//! Walks an untyped document against the shape tables and accumulates
//! every defect it finds. It never fails: the outcome is a
//! [`ValidationReport`].

use chrono::DateTime;
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

use super::report::{ErrorContext, Level, ValidationError, ValidationReport};
use super::shapes::{step_shape, FieldKind, FieldSpec, COMMAND_TYPES, PLAYBOOK_FIELDS, PLAYBOOK_TYPE};
use crate::automation::condition::parse;
use crate::automation::variables::{is_valid_name, json_type_name, VariableDescriptor};
use crate::cacao::types::{value_refs, StepKind};

/// Validate a raw playbook document
pub fn validate(document: &Value) -> ValidationReport {
    if !document.is_object() {
        return ValidationReport::from_findings(vec![ValidationError::new(
            Level::Error,
            format!(
                "document must be a JSON object, found {}",
                json_type_name(document)
            ),
        )]);
    }

    let mut walker = Walker::new(document);
    walker.run();
    log::debug!(
        "Validated document: {} finding(s)",
        walker.findings.len()
    );
    ValidationReport::from_findings(walker.findings)
}

/// Step ids a raw step points at, switch cases included
pub fn raw_successors(step: &Value) -> Vec<&str> {
    let Some(kind) = step
        .get("type")
        .and_then(Value::as_str)
        .and_then(StepKind::parse)
    else {
        return Vec::new();
    };

    let mut next = Vec::new();
    for field in step_shape(kind).edge_fields() {
        let Some(value) = step.get(field.name) else {
            continue;
        };
        match (field.kind, value) {
            (FieldKind::Cases, Value::Object(cases)) => {
                next.extend(cases.values().flat_map(value_refs));
            }
            (FieldKind::Cases, _) => {}
            _ => next.extend(value_refs(value)),
        }
    }
    next
}

/// `<kind>--<uuid>`
fn has_kind_uuid_form(id: &str, kind: &str) -> bool {
    match id.split_once("--") {
        Some((prefix, suffix)) => prefix == kind && Uuid::parse_str(suffix).is_ok(),
        None => false,
    }
}

/// The object a finding is reported against
struct Site<'a> {
    owner: &'a str,
    container: &'a Value,
    path: String,
}

type Scope<'a> = HashSet<&'a str>;

struct Walker<'a> {
    document: &'a Value,
    workflow: Option<&'a Map<String, Value>>,
    agents: HashSet<&'a str>,
    targets: HashSet<&'a str>,
    /// Variables visible to every step
    globals: Scope<'a>,
    findings: Vec<ValidationError>,
}

fn keys_of(value: Option<&Value>) -> HashSet<&str> {
    value
        .and_then(Value::as_object)
        .map(|map| map.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

impl<'a> Walker<'a> {
    fn new(document: &'a Value) -> Self {
        let workflow = document.get("workflow").and_then(Value::as_object);

        // out_args are written at run time, so any step may read them
        let mut globals = keys_of(document.get("playbook_variables"));
        for step in workflow.into_iter().flat_map(|w| w.values()) {
            if let Some(Value::Array(args)) = step.get("out_args") {
                globals.extend(args.iter().filter_map(Value::as_str));
            }
        }

        Self {
            document,
            workflow,
            agents: keys_of(document.get("agent_definitions")),
            targets: keys_of(document.get("target_definitions")),
            globals,
            findings: Vec::new(),
        }
    }

    fn run(&mut self) {
        self.check_playbook();
        self.check_workflow();
    }

    fn report(&mut self, level: Level, site: &Site<'a>, key: &str, message: impl Into<String>) {
        let message = format!("{}.{}: {}", site.path, key, message.into());
        self.findings.push(
            ValidationError::new(level, message)
                .with_context(ErrorContext::field(site.owner, site.container, key)),
        );
    }

    fn has_step(&self, id: &str) -> bool {
        self.workflow.map_or(false, |w| w.contains_key(id))
    }

    fn check_playbook(&mut self) {
        let site = Site {
            owner: "playbook",
            container: self.document,
            path: "playbook".to_string(),
        };
        let globals = self.globals.clone();
        for spec in PLAYBOOK_FIELDS {
            self.check_field(&site, spec, &globals);
        }

        let doc = self.document;
        if let Some(doc_type) = doc.get("type").and_then(Value::as_str) {
            if doc_type != PLAYBOOK_TYPE {
                self.report(
                    Level::Error,
                    &site,
                    "type",
                    format!("expected '{}', found '{}'", PLAYBOOK_TYPE, doc_type),
                );
            }
        }
        if let Some(id) = doc.get("id").and_then(Value::as_str) {
            if !has_kind_uuid_form(id, PLAYBOOK_TYPE) {
                self.report(
                    Level::Warning,
                    &site,
                    "id",
                    format!("'{}' is not of the form 'playbook--<uuid>'", id),
                );
            }
        }
        for key in ["spec_version", "description"] {
            if doc.get(key).is_none() {
                self.report(Level::Info, &site, key, "not set");
            }
        }

        match doc.get("workflow") {
            None => self.report(Level::Error, &site, "workflow", "missing required field"),
            Some(Value::Object(steps)) if steps.is_empty() => {
                self.report(Level::Error, &site, "workflow", "workflow has no steps")
            }
            Some(Value::Object(_)) => {}
            Some(other) => self.report(
                Level::Error,
                &site,
                "workflow",
                format!("expected an object, found {}", json_type_name(other)),
            ),
        }
    }

    fn check_workflow(&mut self) {
        let (Some(workflow), Some(workflow_value)) = (self.workflow, self.document.get("workflow"))
        else {
            return;
        };
        let site = Site {
            owner: "workflow",
            container: workflow_value,
            path: "workflow".to_string(),
        };

        let mut starts = Vec::new();
        for (id, step) in workflow {
            if let Some(kind) = self.check_step(&site, id, step) {
                if kind == StepKind::Start {
                    starts.push(id.as_str());
                }
            }
        }

        if starts.len() > 1 {
            self.report(
                Level::Warning,
                &site,
                starts[1],
                format!("more than one start step ({})", starts.join(", ")),
            );
        }

        if let Some(start) = self.document.get("workflow_start").and_then(Value::as_str) {
            let start_kind = workflow
                .get(start)
                .and_then(|s| s.get("type"))
                .and_then(Value::as_str);
            if let Some(kind) = start_kind {
                if kind != StepKind::Start.as_str() {
                    self.report(
                        Level::Error,
                        &site,
                        start,
                        format!("workflow_start points at a '{}' step, not a start step", kind),
                    );
                }
            }
        }

        self.check_reachability(&site, workflow);
    }

    /// Returns the step kind when the step is well-formed enough to have one
    fn check_step(&mut self, workflow: &Site<'a>, id: &'a str, step: &'a Value) -> Option<StepKind> {
        if !step.is_object() {
            self.report(
                Level::Error,
                workflow,
                id,
                format!("step must be an object, found {}", json_type_name(step)),
            );
            return None;
        }

        let site = Site {
            owner: id,
            container: step,
            path: format!("workflow.{}", id),
        };

        let kind = match step.get("type") {
            None => {
                self.report(Level::Error, &site, "type", "missing required field");
                return None;
            }
            Some(Value::String(tag)) => match StepKind::parse(tag) {
                Some(kind) => kind,
                None => {
                    self.report(
                        Level::Error,
                        &site,
                        "type",
                        format!("unknown step type '{}'", tag),
                    );
                    return None;
                }
            },
            Some(other) => {
                self.report(
                    Level::Error,
                    &site,
                    "type",
                    format!("expected a string, found {}", json_type_name(other)),
                );
                return None;
            }
        };

        if !has_kind_uuid_form(id, kind.as_str()) {
            self.report(
                Level::Warning,
                workflow,
                id,
                format!("step id is not of the form '{}--<uuid>'", kind),
            );
        }
        if step.get("name").is_none() {
            self.report(Level::Info, &site, "name", "step has no name");
        }

        let mut scope = self.globals.clone();
        scope.extend(keys_of(step.get("step_variables")));

        let shape = step_shape(kind);
        for spec in &shape.fields {
            self.check_field(&site, spec, &scope);
        }

        if !shape.allows_edges {
            for spec in shape.edge_fields() {
                if step.get(spec.name).is_some() {
                    self.report(
                        Level::Warning,
                        &site,
                        spec.name,
                        format!("{} step has an outgoing edge", kind),
                    );
                }
            }
        }
        Some(kind)
    }

    fn check_reachability(&mut self, site: &Site<'a>, workflow: &'a Map<String, Value>) {
        let mut queue: VecDeque<&str> = ["workflow_start", "workflow_exception"]
            .into_iter()
            .filter_map(|key| self.document.get(key).and_then(Value::as_str))
            .filter(|id| workflow.contains_key(*id))
            .collect();
        if queue.is_empty() {
            return;
        }

        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(step) = workflow.get(id) {
                queue.extend(
                    raw_successors(step)
                        .into_iter()
                        .filter(|next| workflow.contains_key(*next) && !seen.contains(next)),
                );
            }
        }

        for id in workflow.keys() {
            if !seen.contains(id.as_str()) {
                self.report(
                    Level::Warning,
                    site,
                    id,
                    "step is unreachable from workflow_start",
                );
            }
        }
    }

    fn check_field(&mut self, site: &Site<'a>, spec: &FieldSpec, scope: &Scope<'a>) {
        let name = spec.name;
        let Some(value) = site.container.get(name) else {
            if spec.required {
                self.report(Level::Error, site, name, "missing required field");
            }
            return;
        };

        match spec.kind {
            FieldKind::Text => {
                self.expect_string(site, name, value);
            }
            FieldKind::TextList => {
                self.expect_string_list(site, name, value);
            }
            FieldKind::Timestamp => {
                if let Some(text) = self.expect_string(site, name, value) {
                    if DateTime::parse_from_rfc3339(text).is_err() {
                        self.report(
                            Level::Warning,
                            site,
                            name,
                            format!("'{}' is not an RFC 3339 timestamp", text),
                        );
                    }
                }
            }
            FieldKind::Milliseconds => {
                if !value.is_u64() {
                    self.report(
                        Level::Error,
                        site,
                        name,
                        format!("expected a non-negative integer, found {}", value),
                    );
                }
            }
            FieldKind::Object => {
                if !value.is_object() {
                    self.wrong_type(site, name, "an object", value);
                }
            }
            FieldKind::StepRef => {
                if let Some(id) = self.expect_string(site, name, value) {
                    self.check_step_ref(site, name, id);
                }
            }
            FieldKind::StepRefs => self.check_step_refs(site, name, value),
            FieldKind::StepList => {
                if let Some(ids) = self.expect_string_list(site, name, value) {
                    if ids.is_empty() && spec.required {
                        self.report(Level::Error, site, name, "must list at least one step");
                    }
                    for id in ids {
                        self.check_step_ref(site, name, id);
                    }
                }
            }
            FieldKind::Condition => {
                if let Some(expression) = self.expect_string(site, name, value) {
                    self.check_condition(site, name, expression, scope);
                }
            }
            FieldKind::VariableRef => {
                if let Some(variable) = self.expect_string(site, name, value) {
                    if !is_valid_name(variable) {
                        self.report(
                            Level::Error,
                            site,
                            name,
                            format!("'{}' is not a $$name$$ variable reference", variable),
                        );
                    } else if !scope.contains(variable) {
                        self.report(
                            Level::Warning,
                            site,
                            name,
                            format!("variable '{}' is not declared", variable),
                        );
                    }
                }
            }
            FieldKind::Variables => self.check_variables(site, name, value),
            FieldKind::Commands => self.check_commands(site, name, value),
            FieldKind::AgentRef => {
                if let Some(agent) = self.expect_string(site, name, value) {
                    if !self.agents.contains(agent) {
                        self.report(
                            Level::Error,
                            site,
                            name,
                            format!("agent '{}' is not defined in agent_definitions", agent),
                        );
                    }
                }
            }
            FieldKind::TargetRefs => {
                if let Some(targets) = self.expect_string_list(site, name, value) {
                    for target in targets {
                        if !self.targets.contains(target) {
                            self.report(
                                Level::Error,
                                site,
                                name,
                                format!("target '{}' is not defined in target_definitions", target),
                            );
                        }
                    }
                }
            }
            FieldKind::Cases => self.check_cases(site, name, value),
            FieldKind::Definitions => self.check_definitions(site, name, value),
        }
    }

    fn wrong_type(&mut self, site: &Site<'a>, name: &str, expected: &str, found: &Value) {
        self.report(
            Level::Error,
            site,
            name,
            format!("expected {}, found {}", expected, json_type_name(found)),
        );
    }

    fn expect_string(&mut self, site: &Site<'a>, name: &str, value: &'a Value) -> Option<&'a str> {
        let text = value.as_str();
        if text.is_none() {
            self.wrong_type(site, name, "a string", value);
        }
        text
    }

    fn expect_string_list(
        &mut self,
        site: &Site<'a>,
        name: &str,
        value: &'a Value,
    ) -> Option<Vec<&'a str>> {
        let list = value
            .as_array()
            .and_then(|items| items.iter().map(Value::as_str).collect::<Option<Vec<_>>>());
        if list.is_none() {
            self.wrong_type(site, name, "a list of strings", value);
        }
        list
    }

    fn check_step_ref(&mut self, site: &Site<'a>, name: &str, id: &str) {
        if !self.has_step(id) {
            self.report(
                Level::Error,
                site,
                name,
                format!("references unknown step '{}'", id),
            );
        }
    }

    fn check_step_refs(&mut self, site: &Site<'a>, name: &str, value: &'a Value) {
        match value {
            Value::String(id) => self.check_step_ref(site, name, id),
            Value::Array(_) => {
                if let Some(ids) = self.expect_string_list(site, name, value) {
                    for id in ids {
                        self.check_step_ref(site, name, id);
                    }
                }
            }
            other => self.wrong_type(site, name, "a step id or a list of step ids", other),
        }
    }

    fn check_condition(&mut self, site: &Site<'a>, name: &str, expression: &str, scope: &Scope<'a>) {
        match parse(expression) {
            Err(e) => self.report(Level::Error, site, name, e.to_string()),
            Ok(condition) => {
                let undeclared: Vec<String> = condition
                    .variables()
                    .filter(|v| !scope.contains(v))
                    .map(str::to_string)
                    .collect();
                for variable in undeclared {
                    self.report(
                        Level::Warning,
                        site,
                        name,
                        format!("condition references undeclared variable '{}'", variable),
                    );
                }
            }
        }
    }

    fn check_variables(&mut self, site: &Site<'a>, name: &str, value: &'a Value) {
        let Some(definitions) = value.as_object() else {
            self.wrong_type(site, name, "an object", value);
            return;
        };
        for (id, definition) in definitions {
            if let Err(e) = VariableDescriptor::from_definition(id, definition) {
                self.report(Level::Error, site, name, e.to_string());
            }
        }
    }

    fn check_commands(&mut self, site: &Site<'a>, name: &str, value: &'a Value) {
        let Some(commands) = value.as_array() else {
            self.wrong_type(site, name, "a list of commands", value);
            return;
        };
        if commands.is_empty() {
            self.report(Level::Error, site, name, "action step has no commands");
        }

        for (i, command) in commands.iter().enumerate() {
            let label = format!("{}[{}]", name, i);
            let Some(fields) = command.as_object() else {
                self.wrong_type(site, &label, "a command object", command);
                continue;
            };
            match fields.get("type") {
                Some(Value::String(kind)) if COMMAND_TYPES.contains(&kind.as_str()) => {}
                Some(Value::String(kind)) => self.report(
                    Level::Error,
                    site,
                    &label,
                    format!("unknown command type '{}'", kind),
                ),
                Some(other) => self.wrong_type(site, &label, "a string command type", other),
                None => self.report(Level::Error, site, &label, "command has no type"),
            }
            for key in ["command", "command_b64"] {
                if let Some(body) = fields.get(key) {
                    if !body.is_string() {
                        self.report(
                            Level::Error,
                            site,
                            &label,
                            format!("'{}' must be a string, found {}", key, json_type_name(body)),
                        );
                    }
                }
            }
            if !fields.contains_key("command") && !fields.contains_key("command_b64") {
                self.report(
                    Level::Warning,
                    site,
                    &label,
                    "command has neither 'command' nor 'command_b64'",
                );
            }
        }
    }

    fn check_cases(&mut self, site: &Site<'a>, name: &str, value: &'a Value) {
        let Some(cases) = value.as_object() else {
            self.wrong_type(site, name, "an object of cases", value);
            return;
        };
        if cases.is_empty() {
            self.report(Level::Error, site, name, "switch has no cases");
        }
        for refs in cases.values() {
            self.check_step_refs(site, name, refs);
        }
    }

    fn check_definitions(&mut self, site: &Site<'a>, name: &str, value: &'a Value) {
        let Some(definitions) = value.as_object() else {
            self.wrong_type(site, name, "an object", value);
            return;
        };
        for (key, definition) in definitions {
            match definition.get("type") {
                Some(Value::String(_)) => {}
                _ => self.report(
                    Level::Error,
                    site,
                    name,
                    format!("definition '{}' must be an object with a string 'type'", key),
                ),
            }
        }
    }
}
