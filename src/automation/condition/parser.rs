// SPDX-License-Identifier: MIT

//! Recursive-descent parser for condition expressions
//!
//! ```text
//! condition := clause ( "AND" clause )*
//! clause    := "[" path operator literal "]"
//! literal   := integer | float | 'string' | true | false
//! ```

use super::ast::{Clause, CompareOp, Condition, Literal};
use super::lexer::{tokenize, Spanned, Token};
use crate::automation::variables::PathReference;
use crate::error::SyntaxError;

const CONNECTIVE: &str = "AND";

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Condition, SyntaxError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(SyntaxError::new("empty expression", 0, input));
    }
    Parser {
        input,
        tokens,
        pos: 0,
    }
    .condition()
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn condition(mut self) -> Result<Condition, SyntaxError> {
        let mut clauses = vec![self.clause()?];

        while let Some(next) = self.peek() {
            match &next.token {
                Token::Word(word) if word == CONNECTIVE => {
                    let at = next.start;
                    self.pos += 1;
                    if self.peek().is_none() {
                        return Err(self.error(format!("dangling connective '{}'", CONNECTIVE), at));
                    }
                    clauses.push(self.clause()?);
                }
                Token::Word(word) => {
                    return Err(self.error(format!("unknown connective '{}'", word), next.start));
                }
                Token::RBracket => return Err(self.error("unbalanced ']'", next.start)),
                Token::LBracket => {
                    return Err(self.error(
                        format!("expected '{}' between clauses", CONNECTIVE),
                        next.start,
                    ))
                }
                _ => return Err(self.error("unexpected token after clause", next.start)),
            }
        }

        Ok(Condition { clauses })
    }

    fn clause(&mut self) -> Result<Clause, SyntaxError> {
        let open = match self.next() {
            Some(Spanned {
                token: Token::LBracket,
                start,
                ..
            }) => start,
            Some(Spanned {
                token: Token::Path(_),
                start,
                ..
            }) => return Err(self.error("clause must be enclosed in '[' ']'", start)),
            Some(other) => return Err(self.error("expected '['", other.start)),
            None => return Err(self.error("expected '['", self.input.len())),
        };

        let path = self.path()?;
        let op = self.operator()?;
        let literal = self.literal()?;

        let close = match self.next() {
            Some(Spanned {
                token: Token::RBracket,
                end,
                ..
            }) => end,
            Some(other) => return Err(self.error("expected ']'", other.start)),
            None => return Err(self.error("unbalanced '[': missing ']'", open)),
        };

        Ok(Clause {
            path,
            op,
            literal,
            text: self.input[open..close].to_string(),
        })
    }

    fn path(&mut self) -> Result<PathReference, SyntaxError> {
        match self.next() {
            Some(Spanned {
                token: Token::Path(path),
                ..
            }) => Ok(path),
            Some(other) => Err(self.error("expected a variable reference", other.start)),
            None => Err(self.error("expected a variable reference", self.input.len())),
        }
    }

    fn operator(&mut self) -> Result<CompareOp, SyntaxError> {
        match self.next() {
            Some(Spanned {
                token: Token::Op(op),
                ..
            }) => Ok(op),
            Some(other) => Err(self.error("expected a comparison operator", other.start)),
            None => Err(self.error("expected a comparison operator", self.input.len())),
        }
    }

    fn literal(&mut self) -> Result<Literal, SyntaxError> {
        let Some(spanned) = self.next() else {
            return Err(self.error("missing literal", self.input.len()));
        };
        match spanned.token {
            Token::Integer(n) => Ok(Literal::Integer(n)),
            Token::Float(f) => Ok(Literal::Float(f)),
            Token::Str(s) => Ok(Literal::String(s)),
            Token::Word(word) => match word.as_str() {
                "true" | "True" => Ok(Literal::Boolean(true)),
                "false" | "False" => Ok(Literal::Boolean(false)),
                _ => Err(self.error(format!("malformed literal '{}'", word), spanned.start)),
            },
            Token::RBracket => Err(self.error("missing literal", spanned.start)),
            _ => Err(self.error("malformed literal", spanned.start)),
        }
    }

    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>, position: usize) -> SyntaxError {
        SyntaxError::new(message, position, self.input)
    }
}
