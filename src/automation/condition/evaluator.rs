// SPDX-License-Identifier: MIT

//! Condition expression evaluator

use serde_json::Value;
use std::cmp::Ordering;

use super::ast::{Clause, CompareOp, Condition, Literal};
use crate::automation::variables::{json_type_name, resolve, single_value, VariableContext};
use crate::error::{ClauseFailure, EvaluationError, TypeError};

/// Evaluate a condition against a variable context.
///
/// Clauses are checked left to right and evaluation stops at the first
/// false clause. Any resolution or type failure aborts with the failing
/// clause text and variable id.
pub fn evaluate(condition: &Condition, context: &VariableContext) -> Result<bool, EvaluationError> {
    for clause in &condition.clauses {
        if !evaluate_clause(clause, context)? {
            log::debug!("Condition clause '{}' is false", clause.text);
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluate a single clause.
///
/// A wildcard clause is true as soon as any element satisfies it. When none
/// does, the first element in list order that could not be compared turns
/// into the clause's error; otherwise the clause is false.
pub fn evaluate_clause(clause: &Clause, context: &VariableContext) -> Result<bool, EvaluationError> {
    let fail = |source: ClauseFailure| EvaluationError {
        clause: clause.text.clone(),
        variable: clause.path.variable.clone(),
        source,
    };

    let values = resolve(&clause.path, context).map_err(|e| fail(e.into()))?;

    if clause.path.has_wildcard() {
        let mut first_error = None;
        for value in &values {
            match compare(value, clause.op, &clause.literal) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        return match first_error {
            Some(e) => Err(fail(e.into())),
            None => Ok(false),
        };
    }

    let value = single_value(&clause.path.variable, values).map_err(|e| fail(e.into()))?;
    compare(&value, clause.op, &clause.literal).map_err(|e| fail(e.into()))
}

/// Numeric view of an operand; integers stay exact until mixed with a float
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_value(value: &Value) -> Option<Self> {
        let Value::Number(n) = value else {
            return None;
        };
        match n.as_i64() {
            Some(i) => Some(Number::Int(i)),
            None => n.as_f64().map(Number::Float),
        }
    }

    fn from_literal(literal: &Literal) -> Option<Self> {
        match literal {
            Literal::Integer(i) => Some(Number::Int(*i)),
            Literal::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

fn compare(value: &Value, op: CompareOp, literal: &Literal) -> Result<bool, TypeError> {
    let ordering = || {
        match (Number::from_value(value), Number::from_literal(literal)) {
            (Some(left), Some(right)) => left.compare(right),
            _ => None,
        }
        .ok_or_else(|| TypeError {
            operator: op.to_string(),
            left: json_type_name(value).to_string(),
            right: literal.type_name().to_string(),
        })
    };

    Ok(match op {
        CompareOp::Eq => values_equal(value, literal),
        CompareOp::NotEq => !values_equal(value, literal),
        CompareOp::Lt => ordering()? == Ordering::Less,
        CompareOp::Lte => ordering()? != Ordering::Greater,
        CompareOp::Gt => ordering()? == Ordering::Greater,
        CompareOp::Gte => ordering()? != Ordering::Less,
    })
}

/// Value equality; numbers compare by magnitude across int/float, any
/// other type mismatch is simply unequal
fn values_equal(value: &Value, literal: &Literal) -> bool {
    if let (Some(left), Some(right)) = (Number::from_value(value), Number::from_literal(literal)) {
        return left.compare(right) == Some(Ordering::Equal);
    }
    match (value, literal) {
        (Value::String(s), Literal::String(rs)) => s == rs,
        (Value::Bool(b), Literal::Boolean(rb)) => b == rb,
        _ => false,
    }
}
