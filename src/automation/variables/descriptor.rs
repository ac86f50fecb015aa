// SPDX-License-Identifier: MIT

//! Typed variable descriptors

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::VariableError;

/// Declared type of a playbook variable
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Integer,
    Float,
    String,
    Boolean,
    Dictionary,
    List,
}

impl VariableType {
    pub const ALL: [VariableType; 6] = [
        VariableType::Integer,
        VariableType::Float,
        VariableType::String,
        VariableType::Boolean,
        VariableType::Dictionary,
        VariableType::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Integer => "integer",
            VariableType::Float => "float",
            VariableType::String => "string",
            VariableType::Boolean => "boolean",
            VariableType::Dictionary => "dictionary",
            VariableType::List => "list",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Infer the narrowest type for a value; `None` for JSON null
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(VariableType::Boolean),
            Value::Number(n) if n.is_f64() => Some(VariableType::Float),
            Value::Number(_) => Some(VariableType::Integer),
            Value::String(_) => Some(VariableType::String),
            Value::Array(_) => Some(VariableType::List),
            Value::Object(_) => Some(VariableType::Dictionary),
        }
    }

    /// Whether `value` is a valid runtime shape for this declared type.
    /// Integers are accepted where floats are declared.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (VariableType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (VariableType::Float, Value::Number(_)) => true,
            (VariableType::String, Value::String(_)) => true,
            (VariableType::Boolean, Value::Bool(_)) => true,
            (VariableType::Dictionary, Value::Object(_)) => true,
            (VariableType::List, Value::Array(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name used in messages for the runtime shape of a JSON value
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dictionary",
    }
}

/// A variable with its declared type and a value that matches it.
///
/// Construction always goes through [`VariableDescriptor::new`] or
/// [`VariableDescriptor::from_definition`], so a descriptor held by a
/// context is never inconsistent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VariableDescriptor {
    id: String,
    #[serde(rename = "type")]
    var_type: VariableType,
    value: Value,
    constant: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

/// Wire shape of a variable definition inside a document or context file
#[derive(Debug, Clone, Deserialize)]
struct VariableDefinition {
    #[serde(rename = "type", alias = "var_type")]
    var_type: Option<String>,
    #[serde(alias = "var_value")]
    value: Option<Value>,
    #[serde(default)]
    constant: bool,
    description: Option<String>,
}

impl VariableDescriptor {
    pub fn new(
        id: impl Into<String>,
        var_type: VariableType,
        value: Value,
        constant: bool,
    ) -> Result<Self, VariableError> {
        let id = id.into();
        check_name(&id)?;
        if !var_type.accepts(&value) {
            return Err(VariableError::TypeMismatch {
                variable: id,
                declared: var_type.to_string(),
                actual: json_type_name(&value).to_string(),
            });
        }
        Ok(Self {
            id,
            var_type,
            value,
            constant,
            description: None,
        })
    }

    /// Build a descriptor from a `{type, value, constant}` definition.
    /// A missing type is inferred from the value.
    pub fn from_definition(id: &str, definition: &Value) -> Result<Self, VariableError> {
        check_name(id)?;
        let def: VariableDefinition =
            serde_json::from_value(definition.clone()).map_err(|e| VariableError::Malformed {
                variable: id.to_string(),
                reason: e.to_string(),
            })?;

        let value = def.value.unwrap_or(Value::Null);
        let var_type = match def.var_type.as_deref() {
            Some(name) => VariableType::parse(name).ok_or_else(|| VariableError::UnknownType {
                variable: id.to_string(),
                declared: name.to_string(),
            })?,
            None => VariableType::of(&value).ok_or_else(|| VariableError::Malformed {
                variable: id.to_string(),
                reason: "no type declared and no value to infer it from".to_string(),
            })?,
        };

        // A declared but unset variable starts from the empty value of its type
        let value = if value.is_null() {
            empty_value(var_type)
        } else {
            value
        };

        let mut descriptor = Self::new(id, var_type, value, def.constant)?;
        descriptor.description = def.description;
        Ok(descriptor)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn var_type(&self) -> VariableType {
        self.var_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

fn empty_value(var_type: VariableType) -> Value {
    match var_type {
        VariableType::Integer => Value::from(0),
        VariableType::Float => Value::from(0.0),
        VariableType::String => Value::String(String::new()),
        VariableType::Boolean => Value::Bool(false),
        VariableType::Dictionary => Value::Object(Default::default()),
        VariableType::List => Value::Array(Vec::new()),
    }
}

/// Variable ids are `$$name$$` with a non-empty name free of `$`
pub fn is_valid_name(id: &str) -> bool {
    id.len() > 4
        && id.starts_with("$$")
        && id.ends_with("$$")
        && !id[2..id.len() - 2].contains('$')
}

fn check_name(id: &str) -> Result<(), VariableError> {
    if is_valid_name(id) {
        Ok(())
    } else {
        Err(VariableError::InvalidName(id.to_string()))
    }
}
