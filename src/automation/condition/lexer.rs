// SPDX-License-Identifier: MIT

//! Tokenizer for condition expressions

use super::ast::CompareOp;
use crate::automation::variables::PathReference;
use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LBracket,
    RBracket,
    Path(PathReference),
    Op(CompareOp),
    Integer(i64),
    Float(f64),
    Str(String),
    /// Bare identifier: connectives and boolean keywords
    Word(String),
}

/// A token with its byte span in the source expression
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let token = match c {
            b'[' => {
                pos += 1;
                Token::LBracket
            }
            b']' => {
                pos += 1;
                Token::RBracket
            }
            b'$' => {
                let (path, used) = PathReference::parse_prefix(&input[pos..], pos, input)?;
                pos += used;
                Token::Path(path)
            }
            b'=' => {
                pos += 1;
                Token::Op(CompareOp::Eq)
            }
            b'!' => {
                if bytes.get(pos + 1) != Some(&b'=') {
                    return Err(SyntaxError::new("expected '!='", pos, input));
                }
                pos += 2;
                Token::Op(CompareOp::NotEq)
            }
            b'<' | b'>' => {
                let or_equal = bytes.get(pos + 1) == Some(&b'=');
                pos += if or_equal { 2 } else { 1 };
                Token::Op(match (c, or_equal) {
                    (b'<', false) => CompareOp::Lt,
                    (b'<', true) => CompareOp::Lte,
                    (_, false) => CompareOp::Gt,
                    (_, true) => CompareOp::Gte,
                })
            }
            b'\'' => {
                let (text, used) = lex_string(&input[pos..])
                    .ok_or_else(|| SyntaxError::new("unterminated string literal", pos, input))?;
                pos += used;
                Token::Str(text)
            }
            b'0'..=b'9' | b'-' | b'+' | b'.' => {
                let used = number_len(&bytes[pos..]);
                let text = &input[pos..pos + used];
                pos += used;
                if bytes.get(pos).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_') {
                    return Err(SyntaxError::new(
                        format!("malformed numeric literal '{}'", &input[start..=pos]),
                        start,
                        input,
                    ));
                }
                lex_number(text)
                    .ok_or_else(|| SyntaxError::new(format!("malformed numeric literal '{}'", text), start, input))?
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                Token::Word(input[start..pos].to_string())
            }
            _ => {
                let ch = input[pos..].chars().next().unwrap_or('?');
                return Err(SyntaxError::new(format!("unexpected character '{}'", ch), pos, input));
            }
        };

        tokens.push(Spanned {
            token,
            start,
            end: pos,
        });
    }

    Ok(tokens)
}

/// Read a single-quoted string starting at the opening quote.
/// Supports `\'` and `\\` escapes. Returns the text and bytes consumed.
fn lex_string(input: &str) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\'' => return Some((out, i + 1)),
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(escaped);
            }
            other => out.push(other),
        }
    }
    None
}

fn number_len(bytes: &[u8]) -> usize {
    let mut len = 0;
    while len < bytes.len() {
        let b = bytes[len];
        let sign_ok = (b == b'-' || b == b'+')
            && (len == 0 || matches!(bytes[len - 1], b'e' | b'E'));
        if b.is_ascii_digit() || b == b'.' || sign_ok || (len > 0 && matches!(b, b'e' | b'E')) {
            len += 1;
        } else {
            break;
        }
    }
    len
}

fn lex_number(text: &str) -> Option<Token> {
    let digits = text.trim_start_matches(['-', '+']);
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().ok().filter(|f| f.is_finite()).map(Token::Float)
    } else {
        text.parse::<i64>().ok().map(Token::Integer)
    }
}
