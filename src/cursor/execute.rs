use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::Cursor;
use crate::connection::ConnectionState;
use crate::conversion::{AdapterRegistry, ConverterRegistry, to_bind_value};
use crate::engine::Engine;
use crate::error::SqlCursorError;
use crate::executor::{StepFailure, StepOutcome, step_with_retry};
use crate::results::ColumnDescription;
use crate::results::row::column_index;
use crate::statement::{CheckedOut, StatementKind};
use crate::types::{DetectTypes, Params, RowValues};

impl<E: Engine> Cursor<E> {
    /// Execute one statement with one parameter set.
    ///
    /// After a query the first row is buffered and can be fetched; after DML `rowcount` and
    /// `lastrowid` are updated.
    ///
    /// # Errors
    /// - `ProgrammingError` for empty SQL, wrong parameter count or missing named values
    /// - `OperationalError` for compile and step failures (including more than one statement)
    /// - `Busy` when the database stayed locked past the connection timeout
    /// - `UnsupportedType` / `InterfaceError` when a parameter cannot be bound
    pub fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<&mut Self, SqlCursorError> {
        self.run(sql, std::iter::once(params.into()), false)?;
        Ok(self)
    }

    /// Execute a DML statement once per parameter set. `rowcount` is the sum over all sets.
    ///
    /// # Errors
    /// As [`execute`](Self::execute); additionally `ProgrammingError` for a SELECT or for any
    /// set that yields a row.
    pub fn executemany<I, P>(&mut self, sql: &str, param_sets: I) -> Result<&mut Self, SqlCursorError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        self.run(sql, param_sets.into_iter().map(Into::into), true)?;
        Ok(self)
    }

    fn run<I>(&mut self, sql: &str, param_sets: I, batch: bool) -> Result<(), SqlCursorError>
    where
        I: Iterator<Item = Params>,
    {
        self.ensure_open()?;
        let connection = self.connection.clone();
        let mut state = connection.lock()?;

        self.pending_row = None;
        if let Some(previous) = self.active.take() {
            state.release(previous);
        }
        self.clear_result_state();
        self.rowcount = -1;

        let kind = state.cache.kind_of(sql);
        match kind {
            StatementKind::Invalid => {
                return Err(SqlCursorError::programming("SQL statement is empty"));
            }
            StatementKind::Select if batch => {
                return Err(SqlCursorError::programming(
                    "executemany() can only execute DML statements.",
                ));
            }
            _ => {}
        }

        state.before_execute(kind)?;
        let mut checked = state.checkout(sql)?;
        match self.drive(&mut state, &mut checked, sql, kind, param_sets, batch) {
            Ok(true) => {
                self.active = Some(checked);
                Ok(())
            }
            Ok(false) => {
                state.release(checked);
                Ok(())
            }
            Err(err) => {
                self.pending_row = None;
                state.release(checked);
                Err(err)
            }
        }
    }

    /// Bind and step every parameter set. Returns whether a row is left buffered.
    fn drive<I>(
        &mut self,
        state: &mut ConnectionState<E>,
        checked: &mut CheckedOut<E::Statement>,
        sql: &str,
        kind: StatementKind,
        param_sets: I,
        batch: bool,
    ) -> Result<bool, SqlCursorError>
    where
        I: Iterator<Item = Params>,
    {
        let ConnectionState {
            engine,
            adapters,
            converters,
            busy_timeout,
            detect_types,
            text_policy,
            ..
        } = state;
        let engine = engine
            .as_mut()
            .ok_or_else(|| SqlCursorError::Closed("database".into()))?;

        for params in param_sets {
            if let Err(err) = engine.reset(checked.statement_mut()) {
                debug!(error = %err, "reset before rebinding reported a previous failure");
            }
            engine.clear_bindings(checked.statement_mut());
            bind_params(engine, adapters, checked.statement_mut(), &params)?;

            let outcome =
                first_step(engine, adapters, checked, sql, &params, *busy_timeout)?;

            if self.description.is_empty() {
                self.describe(engine, checked.statement(), converters, *detect_types);
            }

            if outcome == StepOutcome::Row {
                if batch {
                    return Err(SqlCursorError::programming(
                        "executemany() can only execute DML statements.",
                    ));
                }
                let row = self.decode_row(engine, checked.statement(), *text_policy)?;
                self.pending_row = Some(row);
            }

            if kind.is_dml() {
                let changes = i64::try_from(engine.changes()).unwrap_or(i64::MAX);
                self.rowcount = self.rowcount.max(0).saturating_add(changes);
            }
            self.lastrowid = if kind == StatementKind::Insert {
                Some(engine.last_insert_rowid())
            } else {
                None
            };

            if !batch {
                return Ok(outcome == StepOutcome::Row);
            }
        }
        Ok(false)
    }

    /// Fill `description` and the per-column converters from the compiled statement.
    fn describe(
        &mut self,
        engine: &E,
        stmt: &E::Statement,
        registry: &ConverterRegistry,
        detect: DetectTypes,
    ) {
        let count = engine.column_count(stmt);
        if count == 0 {
            return;
        }
        let mut description = Vec::with_capacity(count);
        let mut converters = Vec::with_capacity(count);
        for index in 0..count {
            let raw_name = engine.column_name(stmt, index);
            let declared_type = engine.column_decltype(stmt, index);
            let converter = if detect.is_empty() {
                None
            } else {
                registry.lookup(detect, &raw_name, declared_type.as_deref())
            };
            description.push(ColumnDescription::from_engine_name(&raw_name, declared_type));
            converters.push(converter);
        }
        let names: Vec<String> = description.iter().map(|col| col.name.clone()).collect();
        self.column_index = column_index(&names);
        self.column_names = Arc::new(names);
        self.description = description;
        self.converters = converters;
    }
}

/// Step a freshly bound statement. A schema change gets exactly one recompile-and-retry.
fn first_step<E: Engine>(
    engine: &mut E,
    adapters: &AdapterRegistry,
    checked: &mut CheckedOut<E::Statement>,
    sql: &str,
    params: &Params,
    timeout: Duration,
) -> Result<StepOutcome, SqlCursorError> {
    match step_with_retry(engine, checked.statement_mut(), timeout) {
        Err(StepFailure::SchemaChanged) => {
            debug!(sql, "schema changed; recompiling statement");
            let fresh = engine.prepare(sql)?;
            let stale = checked.replace_statement(fresh);
            engine.finalize(stale);
            bind_params(engine, adapters, checked.statement_mut(), params)?;
            Ok(step_with_retry(engine, checked.statement_mut(), timeout)?)
        }
        other => Ok(other?),
    }
}

fn bind_params<E: Engine>(
    engine: &mut E,
    adapters: &AdapterRegistry,
    stmt: &mut E::Statement,
    params: &Params,
) -> Result<(), SqlCursorError> {
    let expected = engine.bind_parameter_count(stmt);
    match params {
        Params::Positional(values) => {
            if values.len() != expected {
                return Err(SqlCursorError::ProgrammingError(format!(
                    "Incorrect number of bindings supplied. The current statement uses {expected}, and there are {} supplied.",
                    values.len()
                )));
            }
            for (offset, value) in values.iter().enumerate() {
                bind_one(engine, adapters, stmt, offset + 1, value)?;
            }
        }
        Params::Named(values) => {
            for index in 1..=expected {
                let Some(placeholder) = engine.bind_parameter_name(stmt, index) else {
                    return Err(SqlCursorError::ProgrammingError(format!(
                        "Binding {index} has no name, but you supplied a dictionary (which has only names)."
                    )));
                };
                // drop the ':', '@' or '$' prefix
                let name = placeholder.get(1..).unwrap_or_default();
                let Some(value) = values.get(name) else {
                    return Err(SqlCursorError::ProgrammingError(format!(
                        "You did not supply a value for binding {index}."
                    )));
                };
                bind_one(engine, adapters, stmt, index, value)?;
            }
        }
    }
    Ok(())
}

fn bind_one<E: Engine>(
    engine: &mut E,
    adapters: &AdapterRegistry,
    stmt: &mut E::Statement,
    index: usize,
    value: &RowValues,
) -> Result<(), SqlCursorError> {
    let adapted = adapters.adapt(value).map_err(|err| match err {
        SqlCursorError::UnsupportedType(msg) => {
            SqlCursorError::UnsupportedType(format!("Error binding parameter {index}: {msg}"))
        }
        other => other,
    })?;
    let Some(primitive) = to_bind_value(&adapted) else {
        return Err(SqlCursorError::UnsupportedType(format!(
            "Error binding parameter {index}: {:?} is not bindable",
            adapted.kind()
        )));
    };
    engine.bind(stmt, index, primitive).map_err(|err| {
        SqlCursorError::InterfaceError(format!(
            "Error binding parameter {index} - probably unsupported type. ({})",
            err.message
        ))
    })
}
