use super::Connection;
use crate::engine::Engine;
use crate::error::SqlCursorError;

impl<E: Engine> Connection<E> {
    /// Begin a transaction explicitly. Only allowed when implicit transactions are disabled.
    ///
    /// # Errors
    /// Returns `SqlCursorError::ProgrammingError` under implicit mode or when a transaction is
    /// already open, or the engine's error.
    pub fn begin(&self) -> Result<(), SqlCursorError> {
        self.lock()?.begin()
    }

    /// Commit the open transaction. Without one this is a no-op.
    ///
    /// # Errors
    /// Returns the engine's error (the transaction stays open and may be retried).
    pub fn commit(&self) -> Result<(), SqlCursorError> {
        self.lock()?.commit()
    }

    /// Roll back the open transaction. Without one this is a no-op.
    ///
    /// # Errors
    /// Returns the engine's error (the transaction stays open and may be retried).
    pub fn rollback(&self) -> Result<(), SqlCursorError> {
        self.lock()?.rollback()
    }
}
