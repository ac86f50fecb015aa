// SPDX-License-Identifier: MIT

//! Path references into variables
//!
//! `$$var$$` optionally followed by `:field[index]` segments, where the
//! index is omitted, a non-negative integer, or `*`. A bare `[index]`
//! directly after the variable id indexes a list variable itself.

use std::fmt;
use std::str::FromStr;

use crate::error::SyntaxError;

/// Index applied after a field lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    None,
    Position(usize),
    Wildcard,
}

/// One `:field[index]` step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// `None` only for a leading `[index]` right after the variable id
    pub field: Option<String>,
    pub index: Index,
}

/// A variable id plus the ordered segments to walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathReference {
    pub variable: String,
    pub segments: Vec<Segment>,
}

impl PathReference {
    pub fn variable(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            segments: Vec::new(),
        }
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| s.index == Index::Wildcard)
    }

    /// Parse a reference at the start of `input`, returning it together
    /// with the number of bytes consumed. `offset` is only used to report
    /// positions relative to an enclosing expression.
    pub fn parse_prefix(
        input: &str,
        offset: usize,
        expression: &str,
    ) -> Result<(Self, usize), SyntaxError> {
        let err = |msg: &str, at: usize| SyntaxError::new(msg, offset + at, expression);

        if !input.starts_with("$$") {
            return Err(err("expected a variable reference starting with '$$'", 0));
        }
        let close = input[2..]
            .find("$$")
            .ok_or_else(|| err("unterminated variable reference", 0))?;
        let name_end = 2 + close + 2;
        if close == 0 {
            return Err(err("empty variable name", 0));
        }
        let variable = input[..name_end].to_string();

        let bytes = input.as_bytes();
        let mut pos = name_end;
        let mut segments = Vec::new();

        if bytes.get(pos) == Some(&b'[') {
            let (index, used) = parse_index(&input[pos..]).map_err(|m| err(m, pos))?;
            segments.push(Segment { field: None, index });
            pos += used;
        }

        while bytes.get(pos) == Some(&b':') {
            pos += 1;
            let start = pos;
            while pos < bytes.len() && is_field_byte(bytes[pos]) {
                pos += 1;
            }
            if pos == start {
                return Err(err("expected a field name after ':'", start));
            }
            let field = input[start..pos].to_string();
            let index = if bytes.get(pos) == Some(&b'[') {
                let (index, used) = parse_index(&input[pos..]).map_err(|m| err(m, pos))?;
                pos += used;
                index
            } else {
                Index::None
            };
            segments.push(Segment {
                field: Some(field),
                index,
            });
        }

        Ok((Self { variable, segments }, pos))
    }
}

fn is_field_byte(b: u8) -> bool {
    !(b.is_ascii_whitespace()
        || matches!(b, b':' | b'[' | b']' | b'=' | b'!' | b'<' | b'>' | b'\''))
}

/// Parse `[n]` or `[*]`; returns the index and bytes consumed
fn parse_index(input: &str) -> Result<(Index, usize), &'static str> {
    let close = input.find(']').ok_or("unbalanced '[' in variable path")?;
    let inner = input[1..close].trim();
    let index = if inner == "*" {
        Index::Wildcard
    } else if inner.is_empty() {
        return Err("empty index in variable path");
    } else {
        inner
            .parse::<usize>()
            .map(Index::Position)
            .map_err(|_| "index must be a non-negative integer or '*'")?
    };
    Ok((index, close + 1))
}

impl FromStr for PathReference {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (path, used) = PathReference::parse_prefix(trimmed, 0, trimmed)?;
        if used != trimmed.len() {
            return Err(SyntaxError::new(
                "unexpected trailing characters after variable path",
                used,
                trimmed,
            ));
        }
        Ok(path)
    }
}

impl fmt::Display for PathReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.variable)?;
        for segment in &self.segments {
            if let Some(field) = &segment.field {
                write!(f, ":{}", field)?;
            }
            match segment.index {
                Index::None => {}
                Index::Position(n) => write!(f, "[{}]", n)?,
                Index::Wildcard => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}
