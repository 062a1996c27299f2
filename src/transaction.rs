use std::time::Duration;

use tracing::debug;

use crate::engine::Engine;
use crate::error::SqlCursorError;
use crate::executor::execute_one_shot;
use crate::statement::StatementKind;

/// Transaction state of one connection.
///
/// In implicit mode a DML statement opens a transaction when none is active, and any
/// statement classified as `Other` (DDL and the like) commits the open one first. `Select`
/// never changes the state. Explicit `begin` is only available when implicit mode is off.
#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    in_transaction: bool,
    implicit_begin: bool,
}

impl TransactionCoordinator {
    #[must_use]
    pub fn new(implicit_begin: bool) -> Self {
        Self {
            in_transaction: false,
            implicit_begin,
        }
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    #[must_use]
    pub fn implicit_begin(&self) -> bool {
        self.implicit_begin
    }

    /// Open a transaction on request of the caller.
    ///
    /// # Errors
    /// `ProgrammingError` under implicit mode or when a transaction is already open; the
    /// engine's error if `BEGIN` fails.
    pub fn begin<E: Engine>(&mut self, engine: &mut E, timeout: Duration) -> Result<(), SqlCursorError> {
        if self.implicit_begin {
            return Err(SqlCursorError::programming(
                "begin() is not available while implicit transactions are enabled",
            ));
        }
        if self.in_transaction {
            return Err(SqlCursorError::programming(
                "a transaction is already in progress",
            ));
        }
        self.run_begin(engine, timeout)
    }

    /// Commit the open transaction; a no-op without one. The state only changes on success.
    ///
    /// # Errors
    /// Propagates the engine's error (including busy timeout) from `COMMIT`.
    pub fn commit<E: Engine>(&mut self, engine: &mut E, timeout: Duration) -> Result<(), SqlCursorError> {
        if !self.in_transaction {
            return Ok(());
        }
        execute_one_shot(engine, "COMMIT", timeout)?;
        self.in_transaction = false;
        debug!("transaction committed");
        Ok(())
    }

    /// Roll back the open transaction; a no-op without one.
    ///
    /// # Errors
    /// Propagates the engine's error (including busy timeout) from `ROLLBACK`.
    pub fn rollback<E: Engine>(&mut self, engine: &mut E, timeout: Duration) -> Result<(), SqlCursorError> {
        if !self.in_transaction {
            return Ok(());
        }
        execute_one_shot(engine, "ROLLBACK", timeout)?;
        self.in_transaction = false;
        debug!("transaction rolled back");
        Ok(())
    }

    /// Apply the implicit transaction rules ahead of executing a statement of `kind`.
    ///
    /// # Errors
    /// Propagates failures of the implicit `BEGIN` or `COMMIT`.
    pub fn before_execute<E: Engine>(
        &mut self,
        engine: &mut E,
        kind: StatementKind,
        timeout: Duration,
    ) -> Result<(), SqlCursorError> {
        if !self.implicit_begin {
            return Ok(());
        }
        match kind {
            k if k.is_dml() && !self.in_transaction => self.run_begin(engine, timeout),
            StatementKind::Other if self.in_transaction => {
                debug!("committing before non-DML statement");
                self.commit(engine, timeout)
            }
            _ => Ok(()),
        }
    }

    /// Forget the open transaction; used when the engine handle is closed.
    pub(crate) fn reset(&mut self) {
        self.in_transaction = false;
    }

    fn run_begin<E: Engine>(&mut self, engine: &mut E, timeout: Duration) -> Result<(), SqlCursorError> {
        execute_one_shot(engine, "BEGIN", timeout)?;
        self.in_transaction = true;
        debug!("transaction started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SqliteEngine;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn dml_opens_and_ddl_commits() -> Result<(), SqlCursorError> {
        let mut engine = SqliteEngine::open(":memory:")?;
        let mut txn = TransactionCoordinator::new(true);

        txn.before_execute(&mut engine, StatementKind::Select, TIMEOUT)?;
        assert!(!txn.in_transaction());
        txn.before_execute(&mut engine, StatementKind::Insert, TIMEOUT)?;
        assert!(txn.in_transaction());
        txn.before_execute(&mut engine, StatementKind::Update, TIMEOUT)?;
        assert!(txn.in_transaction());
        txn.before_execute(&mut engine, StatementKind::Other, TIMEOUT)?;
        assert!(!txn.in_transaction());
        Ok(())
    }

    #[test]
    fn commit_and_rollback_without_transaction_are_no_ops() -> Result<(), SqlCursorError> {
        let mut engine = SqliteEngine::open(":memory:")?;
        let mut txn = TransactionCoordinator::new(true);
        txn.commit(&mut engine, TIMEOUT)?;
        txn.rollback(&mut engine, TIMEOUT)?;
        assert!(!txn.in_transaction());
        Ok(())
    }

    #[test]
    fn explicit_begin_requires_manual_mode() -> Result<(), SqlCursorError> {
        let mut engine = SqliteEngine::open(":memory:")?;
        let mut implicit = TransactionCoordinator::new(true);
        let err = implicit.begin(&mut engine, TIMEOUT).unwrap_err();
        assert!(matches!(err, SqlCursorError::ProgrammingError(_)));

        let mut manual = TransactionCoordinator::new(false);
        manual.begin(&mut engine, TIMEOUT)?;
        assert!(manual.in_transaction());
        assert!(manual.begin(&mut engine, TIMEOUT).is_err());
        manual.rollback(&mut engine, TIMEOUT)?;
        assert!(!manual.in_transaction());
        Ok(())
    }

    #[test]
    fn manual_mode_ignores_statement_kinds() -> Result<(), SqlCursorError> {
        let mut engine = SqliteEngine::open(":memory:")?;
        let mut manual = TransactionCoordinator::new(false);
        manual.before_execute(&mut engine, StatementKind::Delete, TIMEOUT)?;
        assert!(!manual.in_transaction());
        Ok(())
    }
}
