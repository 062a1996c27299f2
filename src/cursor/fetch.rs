use std::sync::Arc;

use super::Cursor;
use crate::connection::ConnectionState;
use crate::conversion::decode_column;
use crate::engine::Engine;
use crate::error::SqlCursorError;
use crate::executor::{StepOutcome, step_with_retry};
use crate::results::Row;
use crate::types::TextPolicy;

impl<E: Engine> Cursor<E> {
    /// Next row of the current result, or `None` once it is exhausted.
    ///
    /// # Errors
    /// Fails on a closed cursor or connection, from a foreign thread, or with the error of
    /// the step that tried to read this row.
    pub fn fetchone(&mut self) -> Result<Option<Row>, SqlCursorError> {
        self.ensure_open()?;
        let connection = self.connection.clone();
        let mut state = connection.lock()?;

        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        let Some(row) = self.pending_row.take() else {
            return Ok(None);
        };
        if let Some(mut checked) = self.active.take() {
            let ConnectionState {
                engine,
                busy_timeout,
                text_policy,
                ..
            } = &mut *state;
            let timeout = *busy_timeout;
            let policy = *text_policy;
            let advanced = match engine.as_mut() {
                Some(engine) => match step_with_retry(engine, checked.statement_mut(), timeout) {
                    Ok(StepOutcome::Row) => self
                        .decode_row(engine, checked.statement(), policy)
                        .map(Some),
                    Ok(StepOutcome::Done) => Ok(None),
                    Err(failure) => Err(failure.into()),
                },
                None => Ok(None),
            };
            match advanced {
                Ok(Some(next)) => {
                    self.pending_row = Some(next);
                    self.active = Some(checked);
                }
                Ok(None) => state.release(checked),
                Err(err) => {
                    self.deferred_error = Some(err);
                    state.release(checked);
                }
            }
        }
        Ok(Some(row))
    }

    /// Up to `size` rows (default: [`arraysize`](Self::arraysize)). Fewer rows mean the
    /// result is exhausted.
    ///
    /// # Errors
    /// As [`fetchone`](Self::fetchone).
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>, SqlCursorError> {
        let size = size.unwrap_or(self.arraysize);
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match self.fetchone()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// All remaining rows.
    ///
    /// # Errors
    /// As [`fetchone`](Self::fetchone).
    pub fn fetchall(&mut self) -> Result<Vec<Row>, SqlCursorError> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub(super) fn decode_row(
        &self,
        engine: &E,
        stmt: &E::Statement,
        policy: TextPolicy,
    ) -> Result<Row, SqlCursorError> {
        let mut values = Vec::with_capacity(self.description.len());
        for (index, column) in self.description.iter().enumerate() {
            let converter = self.converters.get(index).and_then(Option::as_ref);
            values.push(decode_column(engine, stmt, index, &column.name, converter, policy)?);
        }
        Ok(Row::with_shared_index(
            Arc::clone(&self.column_names),
            Arc::clone(&self.column_index),
            values,
        ))
    }
}
