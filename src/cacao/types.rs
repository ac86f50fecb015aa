// SPDX-License-Identifier: MIT

//! Typed view of CACAO playbook documents
//!
//! These types are only built from documents that already passed the
//! schema validator, so every field the validator treats as optional is
//! optional here too.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Top-level playbook document
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlaybookDocument {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    pub spec_version: Option<String>,
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub workflow_start: String,
    /// Step run when the workflow aborts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_exception: Option<String>,
    /// Step id -> raw step, in document order
    #[serde(default)]
    pub workflow: Map<String, Value>,
    #[serde(default)]
    pub playbook_variables: Map<String, Value>,
    #[serde(default)]
    pub agent_definitions: Map<String, Value>,
    #[serde(default)]
    pub target_definitions: Map<String, Value>,
    /// Any other top-level property (labels, markings, external references...)
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl PlaybookDocument {
    /// Decode every workflow entry into its typed step, keeping document order
    pub fn steps(&self) -> Result<Vec<(&str, WorkflowStep)>, serde_json::Error> {
        self.workflow
            .iter()
            .map(|(id, raw)| Ok((id.as_str(), serde_json::from_value(raw.clone())?)))
            .collect()
    }
}

/// Discriminator of a workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Start,
    End,
    Action,
    IfCondition,
    WhileCondition,
    SwitchCondition,
    Parallel,
    PlaybookAction,
}

impl StepKind {
    pub const ALL: [StepKind; 8] = [
        StepKind::Start,
        StepKind::End,
        StepKind::Action,
        StepKind::IfCondition,
        StepKind::WhileCondition,
        StepKind::SwitchCondition,
        StepKind::Parallel,
        StepKind::PlaybookAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Start => "start",
            StepKind::End => "end",
            StepKind::Action => "action",
            StepKind::IfCondition => "if-condition",
            StepKind::WhileCondition => "while-condition",
            StepKind::SwitchCondition => "switch-condition",
            StepKind::Parallel => "parallel",
            StepKind::PlaybookAction => "playbook-action",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow step, one variant per step kind
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkflowStep {
    Start(StartStep),
    End(EndStep),
    Action(ActionStep),
    IfCondition(ConditionStep),
    WhileCondition(ConditionStep),
    SwitchCondition(SwitchConditionStep),
    Parallel(ParallelStep),
    PlaybookAction(PlaybookActionStep),
}

/// Fields every step kind may carry
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StepCommon {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_completion: Option<StepRefs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_success: Option<StepRefs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<StepRefs>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub step_variables: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_args: Option<Vec<String>>,
    /// Milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    /// Milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartStep {
    #[serde(flatten)]
    pub common: StepCommon,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndStep {
    #[serde(flatten)]
    pub common: StepCommon,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionStep {
    #[serde(flatten)]
    pub common: StepCommon,
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Key into `agent_definitions`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Keys into `target_definitions`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

/// Shared by if-condition and while-condition steps
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConditionStep {
    #[serde(flatten)]
    pub common: StepCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_true: Option<StepRefs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_false: Option<StepRefs>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SwitchConditionStep {
    #[serde(flatten)]
    pub common: StepCommon,
    /// Variable whose value selects the case
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch: Option<String>,
    /// Case value -> step id(s), in document order
    #[serde(default)]
    pub cases: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParallelStep {
    #[serde(flatten)]
    pub common: StepCommon,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybookActionStep {
    #[serde(flatten)]
    pub common: StepCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook_version: Option<String>,
}

/// A command executed by an action step
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_b64: Option<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

/// Step reference (single id or array)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StepRefs {
    Single(String),
    Multiple(Vec<String>),
}

impl StepRefs {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StepRefs::Single(s) => vec![s.clone()],
            StepRefs::Multiple(v) => v.clone(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            StepRefs::Single(s) => std::slice::from_ref(s),
            StepRefs::Multiple(v) => v,
        };
        items.iter().map(|s| s.as_str())
    }
}

/// Labelled control-flow edge leaving a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    NextStep,
    OnSuccess,
    OnFailure,
    OnTrue,
    OnFalse,
    ParallelStep,
}

impl EdgeKind {
    /// Relation predicate the edge is flattened into
    pub fn predicate(&self) -> &'static str {
        match self {
            EdgeKind::NextStep => "next_step",
            EdgeKind::OnSuccess => "on_success",
            EdgeKind::OnFailure => "on_failure",
            EdgeKind::OnTrue => "on_true",
            EdgeKind::OnFalse => "on_false",
            EdgeKind::ParallelStep => "parallel_step",
        }
    }
}

/// One outgoing edge of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEdge<'a> {
    pub kind: EdgeKind,
    pub target: &'a str,
}

impl WorkflowStep {
    pub fn kind(&self) -> StepKind {
        match self {
            WorkflowStep::Start(_) => StepKind::Start,
            WorkflowStep::End(_) => StepKind::End,
            WorkflowStep::Action(_) => StepKind::Action,
            WorkflowStep::IfCondition(_) => StepKind::IfCondition,
            WorkflowStep::WhileCondition(_) => StepKind::WhileCondition,
            WorkflowStep::SwitchCondition(_) => StepKind::SwitchCondition,
            WorkflowStep::Parallel(_) => StepKind::Parallel,
            WorkflowStep::PlaybookAction(_) => StepKind::PlaybookAction,
        }
    }

    pub fn common(&self) -> &StepCommon {
        match self {
            WorkflowStep::Start(s) => &s.common,
            WorkflowStep::End(s) => &s.common,
            WorkflowStep::Action(s) => &s.common,
            WorkflowStep::IfCondition(s) | WorkflowStep::WhileCondition(s) => &s.common,
            WorkflowStep::SwitchCondition(s) => &s.common,
            WorkflowStep::Parallel(s) => &s.common,
            WorkflowStep::PlaybookAction(s) => &s.common,
        }
    }

    /// All outgoing control-flow edges except switch cases
    pub fn edges(&self) -> Vec<StepEdge<'_>> {
        let common = self.common();
        let mut edges = Vec::new();
        push_refs(&mut edges, EdgeKind::NextStep, common.on_completion.as_ref());
        push_refs(&mut edges, EdgeKind::OnSuccess, common.on_success.as_ref());
        push_refs(&mut edges, EdgeKind::OnFailure, common.on_failure.as_ref());

        match self {
            WorkflowStep::IfCondition(s) | WorkflowStep::WhileCondition(s) => {
                push_refs(&mut edges, EdgeKind::OnTrue, s.on_true.as_ref());
                push_refs(&mut edges, EdgeKind::OnFalse, s.on_false.as_ref());
            }
            WorkflowStep::Parallel(s) => {
                edges.extend(s.next_steps.iter().map(|target| StepEdge {
                    kind: EdgeKind::ParallelStep,
                    target,
                }));
            }
            _ => {}
        }
        edges
    }
}

fn push_refs<'a>(edges: &mut Vec<StepEdge<'a>>, kind: EdgeKind, refs: Option<&'a StepRefs>) {
    for target in refs.into_iter().flat_map(|r| r.iter()) {
        edges.push(StepEdge { kind, target });
    }
}

impl SwitchConditionStep {
    /// Case value with the step ids it branches to
    pub fn case_targets(&self) -> Vec<(&str, Vec<&str>)> {
        self.cases
            .iter()
            .map(|(value, refs)| (value.as_str(), value_refs(refs)))
            .collect()
    }
}

/// Step ids held by a raw `StepRefs`-shaped value
pub fn value_refs(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}
