// SPDX-License-Identifier: MIT

//! Branch decisions - picks the successors of a step at run time

use serde_json::Value;

use super::condition;
use super::variables::{resolve_str, single_value, VariableContext};
use crate::cacao::types::{value_refs, StepRefs, WorkflowStep};
use crate::error::PlaybookError;

/// Case key taken when no other case matches
pub const DEFAULT_CASE: &str = "default";

/// Step ids to run after `step`, given the current variable context.
///
/// Step-scoped variables shadow playbook variables while the step's
/// condition or switch is evaluated.
pub fn next_steps(step: &WorkflowStep, context: &VariableContext) -> Result<Vec<String>, PlaybookError> {
    let common = step.common();
    let on_completion = refs(common.on_completion.as_ref());

    let next = match step {
        WorkflowStep::IfCondition(s) | WorkflowStep::WhileCondition(s) => {
            let scoped = context.scoped(&common.step_variables)?;
            let expression = s.condition.as_deref().unwrap_or_default();
            if condition::evaluate_str(expression, &scoped)? {
                refs(s.on_true.as_ref())
            } else if s.on_false.is_some() {
                refs(s.on_false.as_ref())
            } else {
                on_completion
            }
        }
        WorkflowStep::SwitchCondition(s) => {
            let scoped = context.scoped(&common.step_variables)?;
            let selector = match s.switch.as_deref() {
                Some(variable) => switch_value(variable, &scoped)?,
                None => None,
            };
            let case = selector
                .as_deref()
                .and_then(|value| s.cases.get(value))
                .or_else(|| s.cases.get(DEFAULT_CASE));
            match case {
                Some(targets) => value_refs(targets).into_iter().map(str::to_string).collect(),
                None => on_completion,
            }
        }
        WorkflowStep::Parallel(s) => s.next_steps.clone(),
        WorkflowStep::Action(_) => {
            let mut next = on_completion;
            for id in refs(common.on_success.as_ref()) {
                if !next.contains(&id) {
                    next.push(id);
                }
            }
            next
        }
        _ => on_completion,
    };

    log::debug!("Step '{}' -> {:?}", step.kind(), next);
    Ok(next)
}

fn refs(refs: Option<&StepRefs>) -> Vec<String> {
    refs.map(StepRefs::to_vec).unwrap_or_default()
}

/// Textual value of the switch variable; strings are used as-is, other
/// scalars by their JSON rendering
fn switch_value(variable: &str, context: &VariableContext) -> Result<Option<String>, PlaybookError> {
    let value = single_value(variable, resolve_str(variable, context)?)?;
    Ok(Some(match value {
        Value::String(s) => s,
        other => other.to_string(),
    }))
}
