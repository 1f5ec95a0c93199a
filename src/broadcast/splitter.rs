//! Statement splitting
//!
//! Turns a raw text block into individual statements. The broadcaster only
//! sees the `StatementSplitter` trait, so a quote-aware tokenizer can replace
//! the semicolon splitter without touching it.

use serde::Serialize;
use std::fmt;

/// Read or write semantics of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatementKind {
    /// Starts with SELECT; rows are fetched
    Read,
    /// Anything else; committed after execution
    Write,
}

/// A single trimmed, non-empty SQL statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Statement {
    text: String,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Classify by leading keyword (case-insensitive)
    pub fn kind(&self) -> StatementKind {
        let is_select = self
            .text
            .get(..6)
            .map_or(false, |head| head.eq_ignore_ascii_case("select"));
        if is_select {
            StatementKind::Read
        } else {
            StatementKind::Write
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Splits a text block into statements
pub trait StatementSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<Statement>;
}

/// Naive splitter on `;`
///
/// A `;` inside a string literal or comment is treated as a terminator too.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemicolonSplitter;

impl StatementSplitter for SemicolonSplitter {
    fn split(&self, text: &str) -> Vec<Statement> {
        text.split(';')
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .map(Statement::new)
            .collect()
    }
}
