//! Statement classification and the per-connection compiled-statement cache.

pub mod cache;

pub use cache::{CacheStats, CheckedOut, StatementCache};

/// Kind of a statement, derived from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    /// DDL and anything not recognized above.
    Other,
    /// Empty or whitespace-only text.
    Invalid,
}

impl StatementKind {
    /// Classify `sql` by its first word, case-insensitively, after skipping leading whitespace.
    #[must_use]
    pub fn classify(sql: &str) -> Self {
        let trimmed = sql.trim_start_matches([' ', '\t', '\r', '\n']);
        if trimmed.is_empty() {
            return StatementKind::Invalid;
        }
        let word_len = trimmed
            .bytes()
            .position(|b| !b.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let word = &trimmed[..word_len];
        if word.eq_ignore_ascii_case("select") {
            StatementKind::Select
        } else if word.eq_ignore_ascii_case("insert") {
            StatementKind::Insert
        } else if word.eq_ignore_ascii_case("update") {
            StatementKind::Update
        } else if word.eq_ignore_ascii_case("delete") {
            StatementKind::Delete
        } else if word.eq_ignore_ascii_case("replace") {
            StatementKind::Replace
        } else {
            StatementKind::Other
        }
    }

    /// INSERT, UPDATE, DELETE or REPLACE.
    #[must_use]
    pub fn is_dml(self) -> bool {
        matches!(
            self,
            StatementKind::Insert
                | StatementKind::Update
                | StatementKind::Delete
                | StatementKind::Replace
        )
    }
}
