// SPDX-License-Identifier: MIT

//! Path resolution against a variable context

use serde_json::Value;

use super::context::VariableContext;
use super::descriptor::json_type_name;
use super::path::{Index, PathReference, Segment};
use crate::error::{PlaybookError, ResolutionError};

/// Resolve a path reference to the list of values it addresses.
///
/// A path without wildcards always yields exactly one value. Each wildcard
/// fans out over the list it is applied to; the remaining segments are
/// resolved per element and the results flattened in list order.
pub fn resolve(path: &PathReference, context: &VariableContext) -> Result<Vec<Value>, ResolutionError> {
    let descriptor =
        context
            .get(&path.variable)
            .ok_or_else(|| ResolutionError::UnknownVariable {
                variable: path.variable.clone(),
            })?;

    if path.segments.is_empty() {
        let declared = descriptor.var_type();
        if !declared.accepts(descriptor.value()) {
            return Err(ResolutionError::TypeMismatch {
                variable: path.variable.clone(),
                declared: declared.to_string(),
                actual: json_type_name(descriptor.value()).to_string(),
            });
        }
        return Ok(vec![descriptor.value().clone()]);
    }

    let mut out = Vec::new();
    walk(&path.variable, descriptor.value(), &path.segments, &mut out)?;
    Ok(out)
}

/// Parse and resolve in one step
pub fn resolve_str(path: &str, context: &VariableContext) -> Result<Vec<Value>, PlaybookError> {
    let path: PathReference = path.parse()?;
    Ok(resolve(&path, context)?)
}

/// The one value a wildcard-free reference addresses
pub fn single_value(variable: &str, mut values: Vec<Value>) -> Result<Value, ResolutionError> {
    match values.len() {
        1 => Ok(values.remove(0)),
        count => Err(ResolutionError::Cardinality {
            variable: variable.to_string(),
            count,
        }),
    }
}

fn walk(
    variable: &str,
    value: &Value,
    segments: &[Segment],
    out: &mut Vec<Value>,
) -> Result<(), ResolutionError> {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(value.clone());
        return Ok(());
    };

    let target = match &segment.field {
        None => value,
        Some(field) => match value {
            Value::Object(map) => map.get(field).ok_or_else(|| ResolutionError::MissingField {
                variable: variable.to_string(),
                field: field.clone(),
            })?,
            _ => {
                return Err(ResolutionError::NotADictionary {
                    variable: variable.to_string(),
                    field: field.clone(),
                })
            }
        },
    };

    match segment.index {
        Index::None => walk(variable, target, rest, out),
        Index::Position(index) => {
            let items = as_list(variable, target)?;
            let item = items
                .get(index)
                .ok_or_else(|| ResolutionError::IndexOutOfRange {
                    variable: variable.to_string(),
                    index,
                    len: items.len(),
                })?;
            walk(variable, item, rest, out)
        }
        Index::Wildcard => {
            for item in as_list(variable, target)? {
                walk(variable, item, rest, out)?;
            }
            Ok(())
        }
    }
}

fn as_list<'a>(variable: &str, value: &'a Value) -> Result<&'a Vec<Value>, ResolutionError> {
    value.as_array().ok_or_else(|| ResolutionError::NotAList {
        variable: variable.to_string(),
    })
}
