// SPDX-License-Identifier: MIT

//! Condition evaluation for playbook branching
//!
//! Conditions are bracketed comparison clauses joined by `AND`:
//! - `[$$severity$$ >= 7]`
//! - `[$$alert$$:iocs[*] = 'evil.example']`
//! - `[$$status$$ = 'open'] AND [$$attempts$$ < 3]`

mod ast;
mod evaluator;
mod lexer;
mod parser;

pub use ast::{Clause, CompareOp, Condition, Literal};
pub use evaluator::{evaluate, evaluate_clause};
pub use parser::parse;

use crate::automation::variables::VariableContext;
use crate::error::PlaybookError;

/// Parse and evaluate in one step
pub fn evaluate_str(expression: &str, context: &VariableContext) -> Result<bool, PlaybookError> {
    let condition = parse(expression)?;
    Ok(evaluate(&condition, context)?)
}
