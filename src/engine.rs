//! Boundary with the embedded storage engine.
//!
//! Everything above this module talks to the engine through [`Engine`] only: compile a
//! statement, bind primitives, step it, read columns, reset or finalize it. The real
//! implementation lives in [`sqlite`]; tests can wrap it (see `test_utils::FaultyEngine`).

pub mod sqlite;

use std::fmt;

pub use sqlite::{SqliteEngine, SqliteStatement};

/// Diagnostic reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for EngineError {}

/// Result of a single `step` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Row,
    Done,
    /// A lock needed by the statement is held elsewhere; retryable.
    Busy,
    /// The schema changed underneath the compiled statement.
    SchemaChanged,
    Error(EngineError),
}

/// Runtime storage class of a column value in the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Null,
    Integer,
    Float,
    Text,
    Blob,
}

/// A primitive the engine can bind directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindValue<'a> {
    Null,
    Integer(i64),
    Real(f64),
    Text(&'a str),
    Blob(&'a [u8]),
}

/// Narrow capability interface onto the storage engine.
///
/// Column indices are zero-based, parameter indices one-based, matching the engine's own
/// conventions. Column text and blob accessors borrow the statement, so their data cannot be
/// held across the next `step`.
pub trait Engine {
    type Statement;

    /// Compile one SQL statement.
    ///
    /// # Errors
    /// Returns the engine's diagnostic if the text does not compile.
    fn prepare(&mut self, sql: &str) -> Result<Self::Statement, EngineError>;

    /// Compile the first statement found in `sql` and report how many bytes it consumed.
    /// Returns `None` for the statement when the unit holds only whitespace or comments.
    ///
    /// # Errors
    /// Returns the engine's diagnostic if the unit does not compile.
    fn prepare_first(&mut self, sql: &str)
    -> Result<(Option<Self::Statement>, usize), EngineError>;

    /// # Errors
    /// Returns the engine's diagnostic if the value is rejected.
    fn bind(
        &mut self,
        stmt: &mut Self::Statement,
        index: usize,
        value: BindValue<'_>,
    ) -> Result<(), EngineError>;

    fn bind_parameter_count(&self, stmt: &Self::Statement) -> usize;

    /// Name of the placeholder at `index`, including its prefix character.
    fn bind_parameter_name(&self, stmt: &Self::Statement, index: usize) -> Option<String>;

    fn step(&mut self, stmt: &mut Self::Statement) -> StepResult;

    /// # Errors
    /// Reports the error of the most recent failed step, if any.
    fn reset(&mut self, stmt: &mut Self::Statement) -> Result<(), EngineError>;

    fn clear_bindings(&mut self, stmt: &mut Self::Statement);

    fn finalize(&mut self, stmt: Self::Statement);

    fn column_count(&self, stmt: &Self::Statement) -> usize;

    fn column_name(&self, stmt: &Self::Statement, index: usize) -> String;

    fn column_decltype(&self, stmt: &Self::Statement, index: usize) -> Option<String>;

    fn column_type(&self, stmt: &Self::Statement, index: usize) -> ColumnType;

    fn column_int64(&self, stmt: &Self::Statement, index: usize) -> i64;

    fn column_double(&self, stmt: &Self::Statement, index: usize) -> f64;

    /// Text representation of the column; empty for NULL.
    fn column_text<'s>(&self, stmt: &'s Self::Statement, index: usize) -> &'s [u8];

    fn column_blob<'s>(&self, stmt: &'s Self::Statement, index: usize) -> &'s [u8];

    /// Rows modified by the most recent INSERT/UPDATE/DELETE.
    fn changes(&self) -> u64;

    fn last_insert_rowid(&self) -> i64;

    /// Whether `sql` ends in a complete statement.
    fn is_complete(&self, sql: &str) -> bool;

    /// # Errors
    /// Returns the engine's diagnostic if the handle cannot be released.
    fn close(&mut self) -> Result<(), EngineError>;
}
