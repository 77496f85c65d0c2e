//! Statement classification.
//!
//! Decides from the leading keyword alone whether a statement returns rows or
//! reports an affected-row count. This is syntactic: a writable CTE such as
//! `WITH x AS (DELETE ... RETURNING *) SELECT ...` or
//! `WITH x AS (...) INSERT ...` is classified as row-producing.

use std::fmt;

/// How a statement's result is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Starts with `SELECT` or `WITH`; the result set is fetched.
    RowProducing,
    /// Anything else (DML, DDL, utility commands); the affected-row count is read.
    Mutation,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowProducing => write!(f, "row-producing"),
            Self::Mutation => write!(f, "mutation"),
        }
    }
}

const ROW_PRODUCING_KEYWORDS: [&str; 2] = ["SELECT", "WITH"];

/// Classifies one statement by its leading keyword, case-insensitively.
///
/// Leading whitespace and SQL comments are skipped first.
pub fn classify_statement(sql: &str) -> StatementKind {
    let head = skip_leading_comments(sql);
    let is_row_producing = ROW_PRODUCING_KEYWORDS.iter().any(|keyword| {
        head.get(..keyword.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
    });

    if is_row_producing {
        StatementKind::RowProducing
    } else {
        StatementKind::Mutation
    }
}

fn skip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(newline) => after[newline + 1..].trim_start(),
                None => "",
            };
        } else if rest.starts_with("/*") {
            rest = skip_block_comment(rest).trim_start();
        } else {
            return rest;
        }
    }
}

/// `sql` starts with `/*`. Returns the text after the matching `*/`,
/// honoring nesting, or "" if the comment never closes.
fn skip_block_comment(sql: &str) -> &str {
    let bytes = sql.as_bytes();
    let mut depth = 0u32;
    let mut idx = 0;
    while idx + 1 < bytes.len() {
        match (bytes[idx], bytes[idx + 1]) {
            (b'/', b'*') => {
                depth += 1;
                idx += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                idx += 2;
                if depth == 0 {
                    return &sql[idx..];
                }
            }
            _ => idx += 1,
        }
    }
    ""
}
