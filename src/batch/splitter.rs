//! Statement splitting.
//!
//! Turns one block of SQL text into the ordered list of statements a batch
//! executes. Two modes exist:
//!
//! - [`SplitMode::Plain`] splits on every `;`. It does not understand SQL, so a
//!   semicolon inside a string literal, a comment, or a dollar-quoted function
//!   body ends the statement early. Callers are responsible for not embedding
//!   semicolons in statement bodies when using this mode.
//! - [`SplitMode::Lexical`] tracks quote and comment state and only honors a
//!   `;` that appears in plain SQL text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How statement boundaries are found in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Every `;` is a terminator.
    #[default]
    Plain,
    /// `;` is a terminator only outside quotes, comments and dollar-quoted bodies.
    Lexical,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Lexical => write!(f, "lexical"),
        }
    }
}

/// Ordered, trimmed, non-empty statements derived from one input text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementBatch {
    statements: Vec<String>,
}

impl StatementBatch {
    /// Splits `sql` into a batch using the given mode.
    pub fn parse(sql: &str, mode: SplitMode) -> Self {
        let statements = match mode {
            SplitMode::Plain => split_statements(sql),
            SplitMode::Lexical => split_statements_lexical(sql),
        };
        Self { statements }
    }

    /// Number of statements in the batch.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns true if the input held no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Iterates statements in source order.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.statements.iter()
    }
}

impl<'a> IntoIterator for &'a StatementBatch {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}

/// Splits on every `;`, trims each piece and drops the empty ones.
pub fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LexState {
    Normal,
    /// `escapes` is set for `E'...'` strings, where a backslash escapes the next byte.
    SingleQuoted { escapes: bool },
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Splits on `;` only where it terminates a statement.
///
/// Quotes, comments and dollar-quoted bodies are copied through untouched.
/// Pieces that contain nothing but whitespace and comments are dropped.
/// An unterminated quote or comment swallows the rest of the input into the
/// current statement and the server reports the error.
pub fn split_statements_lexical(sql: &str) -> Vec<String> {
    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut state = LexState::Normal;
    let mut start = 0;
    let mut has_code = false;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            LexState::Normal => match b {
                b';' => {
                    push_segment(&mut statements, &sql[start..idx], has_code);
                    start = idx + 1;
                    has_code = false;
                }
                b'\'' => {
                    state = LexState::SingleQuoted {
                        escapes: is_escape_string_prefix(bytes, idx),
                    };
                    has_code = true;
                }
                b'"' => {
                    state = LexState::DoubleQuoted;
                    has_code = true;
                }
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = LexState::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = LexState::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, tag_end)) = dollar_quote_open(bytes, idx) {
                        state = LexState::DollarQuoted(tag);
                        idx = tag_end;
                    }
                    has_code = true;
                }
                _ if b.is_ascii_whitespace() => {}
                _ => has_code = true,
            },
            LexState::SingleQuoted { escapes } => {
                if escapes && b == b'\\' {
                    idx += 1;
                } else if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = LexState::Normal;
                    }
                }
            }
            LexState::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = LexState::Normal;
                    }
                }
            }
            LexState::LineComment => {
                if b == b'\n' {
                    state = LexState::Normal;
                }
            }
            LexState::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = LexState::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        LexState::Normal
                    } else {
                        LexState::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            LexState::DollarQuoted(ref tag) => {
                if b == b'$' && closes_dollar_quote(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = LexState::Normal;
                }
            }
        }
        idx += 1;
    }

    push_segment(&mut statements, &sql[start..], has_code);
    statements
}

fn push_segment(statements: &mut Vec<String>, segment: &str, has_code: bool) {
    let trimmed = segment.trim();
    if has_code && !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// True when the quote at `idx` opens an `E'...'` string.
fn is_escape_string_prefix(bytes: &[u8], idx: usize) -> bool {
    if idx == 0 || !matches!(bytes[idx - 1], b'e' | b'E') {
        return false;
    }
    idx < 2 || !is_ident_byte(bytes[idx - 2])
}

/// Recognizes `$tag$` starting at `start`. Returns the tag and the index of
/// the closing `$` of the opener.
fn dollar_quote_open(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    // `a$b` is an identifier and `$1` a parameter, neither opens a quote.
    if start > 0 && is_ident_byte(bytes[start - 1]) {
        return None;
    }
    if bytes.get(start + 1).is_some_and(u8::is_ascii_digit) {
        return None;
    }

    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }

    if idx < bytes.len() {
        let tag = std::str::from_utf8(&bytes[start + 1..idx]).ok()?;
        Some((tag.to_string(), idx))
    } else {
        None
    }
}

fn closes_dollar_quote(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let tag_start = idx + 1;
    let tag_end = tag_start + tag.len();
    tag_end < bytes.len() && &bytes[tag_start..tag_end] == tag.as_bytes() && bytes[tag_end] == b'$'
}
