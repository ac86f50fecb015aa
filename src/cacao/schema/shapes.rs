// SPDX-License-Identifier: MIT

//! Declarative document shapes
//!
//! Each step kind lists the fields it understands, whether they are
//! required, and how their values are checked. The validator walks these
//! tables; it has no per-kind code of its own.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::cacao::types::StepKind;

/// How a field's value is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any string
    Text,
    /// List of strings
    TextList,
    /// RFC 3339 timestamp string
    Timestamp,
    /// Non-negative integer
    Milliseconds,
    /// JSON object
    Object,
    /// A single step id
    StepRef,
    /// A step id or a list of step ids
    StepRefs,
    /// A list of step ids
    StepList,
    /// Condition expression
    Condition,
    /// `$$name$$` reference
    VariableRef,
    /// Map of variable definitions
    Variables,
    /// List of command objects
    Commands,
    /// Key of `agent_definitions`
    AgentRef,
    /// Keys of `target_definitions`
    TargetRefs,
    /// Case value -> step id(s)
    Cases,
    /// Map of agent or target definitions
    Definitions,
}

impl FieldKind {
    /// Whether values of this kind are control-flow edges between steps
    pub fn is_edge(&self) -> bool {
        matches!(
            self,
            FieldKind::StepRef | FieldKind::StepRefs | FieldKind::StepList | FieldKind::Cases
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

/// Shape of one step kind
#[derive(Debug, Clone)]
pub struct StepShape {
    pub fields: Vec<FieldSpec>,
    /// `false` for end steps: any outgoing edge is suspicious
    pub allows_edges: bool,
}

impl StepShape {
    pub fn edge_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.kind.is_edge())
    }
}

/// Command types accepted inside action steps
pub const COMMAND_TYPES: &[&str] = &[
    "manual",
    "bash",
    "powershell",
    "ssh",
    "http-api",
    "openc2-http",
    "caldera-cmd",
    "elastic",
    "jupyter",
    "kestrel",
    "sigma",
    "yara",
];

pub const PLAYBOOK_TYPE: &str = "playbook";

/// Top-level document fields (the workflow itself is walked separately)
pub static PLAYBOOK_FIELDS: &[FieldSpec] = &[
    required("type", FieldKind::Text),
    optional("spec_version", FieldKind::Text),
    required("id", FieldKind::Text),
    required("name", FieldKind::Text),
    optional("description", FieldKind::Text),
    optional("created_by", FieldKind::Text),
    optional("created", FieldKind::Timestamp),
    optional("modified", FieldKind::Timestamp),
    required("workflow_start", FieldKind::StepRef),
    optional("workflow_exception", FieldKind::StepRef),
    optional("playbook_variables", FieldKind::Variables),
    optional("agent_definitions", FieldKind::Definitions),
    optional("target_definitions", FieldKind::Definitions),
];

/// Fields every step kind accepts
static COMMON_FIELDS: &[FieldSpec] = &[
    optional("name", FieldKind::Text),
    optional("description", FieldKind::Text),
    optional("on_completion", FieldKind::StepRefs),
    optional("on_success", FieldKind::StepRefs),
    optional("on_failure", FieldKind::StepRefs),
    optional("step_variables", FieldKind::Variables),
    optional("in_args", FieldKind::TextList),
    optional("out_args", FieldKind::TextList),
    optional("delay", FieldKind::Milliseconds),
    optional("timeout", FieldKind::Milliseconds),
];

fn shape(allows_edges: bool, specific: &[FieldSpec]) -> StepShape {
    // specific entries override common ones with the same name
    let mut fields: Vec<FieldSpec> = COMMON_FIELDS
        .iter()
        .filter(|c| !specific.iter().any(|s| s.name == c.name))
        .copied()
        .collect();
    fields.extend_from_slice(specific);
    StepShape {
        fields,
        allows_edges,
    }
}

pub static STEP_SHAPES: Lazy<HashMap<StepKind, StepShape>> = Lazy::new(|| {
    let condition_fields = [
        required("condition", FieldKind::Condition),
        required("on_true", FieldKind::StepRefs),
        optional("on_false", FieldKind::StepRefs),
    ];

    HashMap::from([
        (
            StepKind::Start,
            shape(true, &[required("on_completion", FieldKind::StepRefs)]),
        ),
        (StepKind::End, shape(false, &[])),
        (
            StepKind::Action,
            shape(
                true,
                &[
                    required("commands", FieldKind::Commands),
                    optional("agent", FieldKind::AgentRef),
                    optional("targets", FieldKind::TargetRefs),
                ],
            ),
        ),
        (StepKind::IfCondition, shape(true, &condition_fields)),
        (StepKind::WhileCondition, shape(true, &condition_fields)),
        (
            StepKind::SwitchCondition,
            shape(
                true,
                &[
                    required("switch", FieldKind::VariableRef),
                    required("cases", FieldKind::Cases),
                ],
            ),
        ),
        (
            StepKind::Parallel,
            shape(true, &[required("next_steps", FieldKind::StepList)]),
        ),
        (
            StepKind::PlaybookAction,
            shape(
                true,
                &[
                    required("playbook_id", FieldKind::Text),
                    optional("playbook_version", FieldKind::Text),
                ],
            ),
        ),
    ])
});

/// Shape for a step kind
pub fn step_shape(kind: StepKind) -> &'static StepShape {
    &STEP_SHAPES[&kind]
}
