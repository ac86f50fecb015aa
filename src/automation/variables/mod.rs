// SPDX-License-Identifier: MIT

//! Playbook variables
//!
//! This module provides:
//! - `VariableDescriptor` - a typed variable whose value matches its type
//! - `VariableContext` - the variables visible while evaluating a condition
//! - `PathReference` - `$$var$$:field[index]` addressing
//! - `resolve` - path resolution with wildcard fan-out

mod context;
mod descriptor;
mod path;
mod resolver;

pub use context::VariableContext;
pub use descriptor::{is_valid_name, json_type_name, VariableDescriptor, VariableType};
pub use path::{Index, PathReference, Segment};
pub use resolver::{resolve, resolve_str, single_value};
