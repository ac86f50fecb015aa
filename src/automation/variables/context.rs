// SPDX-License-Identifier: MIT

//! Variable context available during condition evaluation

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::descriptor::VariableDescriptor;
use crate::error::VariableError;

/// Mapping from variable id (`$$name$$`) to its typed descriptor
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    variables: HashMap<String, VariableDescriptor>,
}

impl VariableContext {
    /// Create an empty context
    pub fn empty() -> Self {
        Self {
            variables: HashMap::new(),
        }
    }

    /// Build a context from a `{ "$$id$$": { type, value, constant } }` mapping
    pub fn from_definitions(definitions: &Map<String, Value>) -> Result<Self, VariableError> {
        let mut context = Self::empty();
        for (id, definition) in definitions {
            context.insert(VariableDescriptor::from_definition(id, definition)?);
        }
        Ok(context)
    }

    /// Build a context from any JSON value; anything but an object is rejected
    pub fn from_json(value: &Value) -> Result<Self, VariableError> {
        match value {
            Value::Object(map) => Self::from_definitions(map),
            Value::Null => Ok(Self::empty()),
            other => Err(VariableError::Malformed {
                variable: "<context>".to_string(),
                reason: format!("expected a mapping of variables, got {}", other),
            }),
        }
    }

    /// Insert or replace a descriptor
    pub fn insert(&mut self, descriptor: VariableDescriptor) {
        self.variables
            .insert(descriptor.id().to_string(), descriptor);
    }

    pub fn get(&self, id: &str) -> Option<&VariableDescriptor> {
        self.variables.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.variables.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// A child context where `step_variables` shadow the variables of `self`
    pub fn scoped(&self, step_variables: &Map<String, Value>) -> Result<Self, VariableError> {
        let mut scoped = self.clone();
        for (id, definition) in step_variables {
            scoped.insert(VariableDescriptor::from_definition(id, definition)?);
        }
        Ok(scoped)
    }

    /// Get all variable ids
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.variables.keys()
    }
}
