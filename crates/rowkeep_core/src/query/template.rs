//! Placeholder scanning and binding for explicit statements.
//!
//! # Invariants
//! - Placeholders inside single-quoted literals are left untouched.
//! - A statement uses either named (`:name`) or positional (`?N`, `?`)
//!   placeholders, never both.
//! - Bound statements only contain numbered placeholders (`?1`, `?2`, ...).

use crate::repo::error::{QueryDerivationError, RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;

use super::args::{Arg, Params};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'(?:[^']|'')*'|:([A-Za-z_][A-Za-z0-9_]*)|\?(\d*)").expect("valid placeholder regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Named(String),
    Positional(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Slot(Slot),
}

/// Statement text split into literal pieces and placeholder slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SqlTemplate {
    source: String,
    pieces: Vec<Piece>,
}

impl SqlTemplate {
    pub(crate) fn parse(sql: &str) -> Result<Self, QueryDerivationError> {
        let source = sql.trim().trim_end_matches(';').trim_end().to_string();
        if source.is_empty() {
            return Err(QueryDerivationError::EmptyStatement);
        }

        let mut pieces = Vec::new();
        let mut cursor = 0;
        let mut highest = 0;
        let (mut named, mut positional) = (false, false);
        for captures in PLACEHOLDER_RE.captures_iter(&source) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let slot = if let Some(name) = captures.get(1) {
                named = true;
                Slot::Named(name.as_str().to_string())
            } else if let Some(digits) = captures.get(2) {
                positional = true;
                // A bare `?` takes the index after the largest one used so far.
                let index = if digits.as_str().is_empty() {
                    highest + 1
                } else {
                    // Out-of-range indexes can never be bound; binding reports them.
                    digits.as_str().parse::<usize>().unwrap_or(usize::MAX)
                };
                highest = highest.max(index);
                Slot::Positional(index)
            } else {
                continue;
            };

            if whole.start() > cursor {
                pieces.push(Piece::Text(source[cursor..whole.start()].to_string()));
            }
            pieces.push(Piece::Slot(slot));
            cursor = whole.end();
        }
        if named && positional {
            return Err(QueryDerivationError::MixedPlaceholders(source));
        }
        if cursor < source.len() {
            pieces.push(Piece::Text(source[cursor..].to_string()));
        }

        Ok(Self { source, pieces })
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names as written (`username`, `?2`), in statement order.
    pub(crate) fn placeholders(&self) -> Vec<String> {
        self.pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Slot(slot) => Some(slot_label(slot)),
                Piece::Text(_) => None,
            })
            .collect()
    }

    /// Rewrites placeholders to numbered binds, expanding lists to
    /// `(?a, ?b, ...)`. Numbering continues from `binds`.
    pub(crate) fn bind(&self, params: &Params, binds: &mut Vec<Value>) -> RepoResult<String> {
        let mut sql = String::with_capacity(self.source.len());
        for piece in &self.pieces {
            let slot = match piece {
                Piece::Text(text) => {
                    sql.push_str(text);
                    continue;
                }
                Piece::Slot(slot) => slot,
            };
            let arg = match slot {
                Slot::Named(name) => params.named(name),
                Slot::Positional(index) => params.positional(*index),
            }
            .ok_or_else(|| RepoError::MissingParameter(slot_label(slot)))?;

            match arg {
                Arg::Value(value) => {
                    binds.push(value.clone());
                    sql.push_str(&format!("?{}", binds.len()));
                }
                Arg::List(values) => {
                    let numbered = values
                        .iter()
                        .map(|value| {
                            binds.push(value.clone());
                            format!("?{}", binds.len())
                        })
                        .collect::<Vec<_>>();
                    sql.push('(');
                    sql.push_str(&numbered.join(", "));
                    sql.push(')');
                }
            }
        }
        Ok(sql)
    }
}

fn slot_label(slot: &Slot) -> String {
    match slot {
        Slot::Named(name) => name.clone(),
        Slot::Positional(index) => format!("?{index}"),
    }
}
