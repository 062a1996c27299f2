use tracing::{debug, warn};

use super::Cursor;
use crate::connection::ConnectionState;
use crate::engine::Engine;
use crate::error::SqlCursorError;
use crate::executor::run_to_completion;

impl<E: Engine> Cursor<E> {
    /// Run every statement of `script` in order, without parameters and without the
    /// statement cache. Any open transaction is committed first; rows are discarded.
    ///
    /// A trailing fragment that is not a complete statement is skipped.
    ///
    /// # Errors
    /// Stops at the first statement that fails to compile or run and returns its error.
    pub fn executescript(&mut self, script: &str) -> Result<&mut Self, SqlCursorError> {
        self.ensure_open()?;
        let connection = self.connection.clone();
        let mut state = connection.lock()?;

        self.pending_row = None;
        if let Some(previous) = self.active.take() {
            state.release(previous);
        }
        self.clear_result_state();
        self.rowcount = -1;

        state.commit()?;

        let ConnectionState {
            engine,
            busy_timeout,
            ..
        } = &mut *state;
        let engine = engine
            .as_mut()
            .ok_or_else(|| SqlCursorError::Closed("database".into()))?;
        let timeout = *busy_timeout;

        let mut rest = script;
        let mut executed = 0usize;
        while !rest.trim().is_empty() {
            let (stmt, consumed) = match engine.prepare_first(rest) {
                Ok(found) => found,
                Err(_) if !engine.is_complete(rest) => {
                    warn!(fragment = rest.trim(), "ignoring incomplete statement at end of script");
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            let unit = &rest[..consumed];
            rest = &rest[consumed..];
            let Some(mut stmt) = stmt else {
                if consumed == 0 {
                    break;
                }
                continue;
            };
            if !engine.is_complete(unit) {
                engine.finalize(stmt);
                warn!(fragment = unit.trim(), "ignoring incomplete statement at end of script");
                break;
            }
            let result = run_to_completion(engine, &mut stmt, timeout);
            engine.finalize(stmt);
            result?;
            executed += 1;
        }
        debug!(statements = executed, "script executed");
        Ok(self)
    }
}
