// SPDX-License-Identifier: MIT

//! Schema validation for raw playbook documents

pub mod report;
pub mod shapes;
pub mod validator;

pub use report::{ErrorContext, Level, ValidationError, ValidationReport};
pub use validator::{raw_successors, validate};
