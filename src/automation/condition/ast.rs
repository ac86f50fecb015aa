// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for condition expressions

use std::fmt;

use crate::automation::variables::PathReference;

/// A conjunction of comparison clauses
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub clauses: Vec<Clause>,
}

/// `[ <path> <op> <literal> ]`
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub path: PathReference,
    pub op: CompareOp,
    pub literal: Literal,
    /// Source text of the clause, brackets included
    pub text: String,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// =
    Eq,
    /// !=
    NotEq,
    /// >
    Gt,
    /// >=
    Gte,
    /// <
    Lt,
    /// <=
    Lte,
}

/// Literal values on the right-hand side of a clause
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Integer(_) => "integer",
            Literal::Float(_) => "float",
            Literal::String(_) => "string",
            Literal::Boolean(_) => "boolean",
        }
    }
}

impl Condition {
    /// Variable ids referenced by the clauses, in order of appearance
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.clauses.iter().map(|c| c.path.variable.as_str())
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{:?}", n),
            Literal::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Literal::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {}]", self.path, self.op, self.literal)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_display() {
        assert_eq!(format!("{}", CompareOp::Eq), "=");
        assert_eq!(format!("{}", CompareOp::NotEq), "!=");
        assert_eq!(format!("{}", CompareOp::Gt), ">");
        assert_eq!(format!("{}", CompareOp::Gte), ">=");
        assert_eq!(format!("{}", CompareOp::Lt), "<");
        assert_eq!(format!("{}", CompareOp::Lte), "<=");
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Float(10.0).to_string(), "10.0");
        assert_eq!(Literal::String("it's".to_string()).to_string(), r"'it\'s'");
        assert_eq!(Literal::Boolean(false).to_string(), "false");
    }

    #[test]
    fn test_clause_display() {
        let clause = Clause {
            path: PathReference::variable("$$a$$"),
            op: CompareOp::Gte,
            literal: Literal::Integer(3),
            text: "[$$a$$>=3]".to_string(),
        };
        assert_eq!(clause.to_string(), "[$$a$$ >= 3]");
    }
}
