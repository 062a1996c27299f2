//! Cursors: one statement execution at a time, with a single look-ahead row.
//!
//! `execute` leaves the first row (if any) buffered and the statement checked out of the
//! cache. Each fetch hands out the buffered row and steps once more, so exhaustion is known
//! as soon as the last row is returned; the statement goes back to the cache at that point.

mod execute;
mod fetch;
mod script;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::connection::Connection;
use crate::conversion::Converter;
use crate::engine::{Engine, SqliteEngine};
use crate::error::SqlCursorError;
use crate::results::{ColumnDescription, Row};
use crate::statement::CheckedOut;

/// A cursor on one [`Connection`].
///
/// Executing, fetching and closing check the connection's thread affinity. The accessors for
/// the last result (`description`, `rowcount`, `lastrowid`, `arraysize`, `is_closed`) only
/// read fields of the cursor itself and are exempt from that check.
pub struct Cursor<E: Engine = SqliteEngine> {
    connection: Connection<E>,
    active: Option<CheckedOut<E::Statement>>,
    pending_row: Option<Row>,
    // failure of the look-ahead step, reported on the following fetch
    deferred_error: Option<SqlCursorError>,
    description: Vec<ColumnDescription>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
    converters: Vec<Option<Converter>>,
    rowcount: i64,
    lastrowid: Option<i64>,
    arraysize: usize,
    closed: bool,
}

impl<E: Engine> fmt::Debug for Cursor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("description", &self.description)
            .field("rowcount", &self.rowcount)
            .field("lastrowid", &self.lastrowid)
            .field("arraysize", &self.arraysize)
            .field("active", &self.active.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<E: Engine> Cursor<E> {
    pub(crate) fn new(connection: Connection<E>) -> Self {
        Self {
            connection,
            active: None,
            pending_row: None,
            deferred_error: None,
            description: Vec::new(),
            column_names: Arc::new(Vec::new()),
            column_index: Arc::new(HashMap::new()),
            converters: Vec::new(),
            rowcount: -1,
            lastrowid: None,
            arraysize: 1,
            closed: false,
        }
    }

    #[must_use]
    pub fn connection(&self) -> &Connection<E> {
        &self.connection
    }

    /// Columns of the last executed statement; empty if it produced no result columns.
    #[must_use]
    pub fn description(&self) -> &[ColumnDescription] {
        &self.description
    }

    /// Rows changed by the last DML execution (summed over `executemany`); -1 otherwise.
    #[must_use]
    pub fn rowcount(&self) -> i64 {
        self.rowcount
    }

    /// Row id of the row inserted by the last INSERT; `None` after any other statement.
    #[must_use]
    pub fn lastrowid(&self) -> Option<i64> {
        self.lastrowid
    }

    /// Default batch size for [`fetchmany`](Self::fetchmany).
    #[must_use]
    pub fn arraysize(&self) -> usize {
        self.arraysize
    }

    pub fn set_arraysize(&mut self, arraysize: usize) {
        self.arraysize = arraysize;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the active statement; every later operation on this cursor fails.
    ///
    /// # Errors
    /// Fails when called from a foreign thread.
    pub fn close(&mut self) -> Result<(), SqlCursorError> {
        self.connection.check_thread()?;
        self.release_active();
        self.clear_result_state();
        self.closed = true;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SqlCursorError> {
        if self.closed {
            Err(SqlCursorError::Closed("cursor".into()))
        } else {
            Ok(())
        }
    }

    fn release_active(&mut self) {
        self.pending_row = None;
        if let Some(checked) = self.active.take() {
            match self.connection.state() {
                Ok(mut state) => state.release(checked),
                // dropped inside a callback of its own connection; the slot stays checked out
                Err(err) => {
                    debug!(error = %err, "finalizing active statement without the cache");
                    drop(checked);
                }
            }
        }
    }

    fn clear_result_state(&mut self) {
        self.pending_row = None;
        self.deferred_error = None;
        self.description.clear();
        self.converters.clear();
        self.column_names = Arc::new(Vec::new());
        self.column_index = Arc::new(HashMap::new());
    }
}

impl<E: Engine> Drop for Cursor<E> {
    fn drop(&mut self) {
        self.release_active();
    }
}

impl<E: Engine> Iterator for Cursor<E> {
    type Item = Result<Row, SqlCursorError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetchone().transpose()
    }
}
