use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::debug;

use super::config::ConnectOptions;
use crate::conversion::{AdapterRegistry, BoxError, ConverterRegistry};
use crate::cursor::Cursor;
use crate::engine::{Engine, SqliteEngine};
use crate::error::SqlCursorError;
use crate::statement::{CacheStats, CheckedOut, StatementCache, StatementKind};
use crate::transaction::TransactionCoordinator;
use crate::types::{DetectTypes, Params, RowValues, TextPolicy, ValueKind};

/// Mutable state shared by a connection and its cursors.
pub(crate) struct ConnectionState<E: Engine> {
    /// `None` once the connection is closed.
    pub(crate) engine: Option<E>,
    pub(crate) cache: StatementCache<E::Statement>,
    pub(crate) txn: TransactionCoordinator,
    pub(crate) converters: ConverterRegistry,
    pub(crate) adapters: AdapterRegistry,
    pub(crate) busy_timeout: Duration,
    pub(crate) detect_types: DetectTypes,
    pub(crate) text_policy: TextPolicy,
}

/// The state mutex together with the thread currently holding it.
struct Shared<E: Engine> {
    state: Mutex<ConnectionState<E>>,
    holder: Mutex<Option<ThreadId>>,
}

impl<E: Engine> Shared<E> {
    fn set_holder(&self, holder: Option<ThreadId>) {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = holder;
    }

    fn held_by(&self, thread: ThreadId) -> bool {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread)
    }
}

/// Exclusive access to a connection's state. Clears the holder record before unlocking.
pub(crate) struct StateGuard<'a, E: Engine> {
    guard: MutexGuard<'a, ConnectionState<E>>,
    shared: &'a Shared<E>,
}

impl<E: Engine> Deref for StateGuard<'_, E> {
    type Target = ConnectionState<E>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<E: Engine> DerefMut for StateGuard<'_, E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<E: Engine> Drop for StateGuard<'_, E> {
    fn drop(&mut self) {
        self.shared.set_holder(None);
    }
}

fn closed_database() -> SqlCursorError {
    SqlCursorError::Closed("database".into())
}

impl<E: Engine> ConnectionState<E> {
    pub(crate) fn checkout(&mut self, sql: &str) -> Result<CheckedOut<E::Statement>, SqlCursorError> {
        let engine = self.engine.as_mut().ok_or_else(closed_database)?;
        self.cache.checkout(engine, sql)
    }

    /// Hand a statement back to the cache. After close there is no engine left to reset it
    /// with, so it is simply dropped.
    pub(crate) fn release(&mut self, checked: CheckedOut<E::Statement>) {
        match self.engine.as_mut() {
            Some(engine) => self.cache.checkin(engine, checked),
            None => drop(checked),
        }
    }

    pub(crate) fn before_execute(&mut self, kind: StatementKind) -> Result<(), SqlCursorError> {
        let engine = self.engine.as_mut().ok_or_else(closed_database)?;
        self.txn.before_execute(engine, kind, self.busy_timeout)
    }

    pub(crate) fn begin(&mut self) -> Result<(), SqlCursorError> {
        let engine = self.engine.as_mut().ok_or_else(closed_database)?;
        self.txn.begin(engine, self.busy_timeout)
    }

    pub(crate) fn commit(&mut self) -> Result<(), SqlCursorError> {
        let engine = self.engine.as_mut().ok_or_else(closed_database)?;
        self.txn.commit(engine, self.busy_timeout)
    }

    pub(crate) fn rollback(&mut self) -> Result<(), SqlCursorError> {
        let engine = self.engine.as_mut().ok_or_else(closed_database)?;
        self.txn.rollback(engine, self.busy_timeout)
    }

    fn close(&mut self) -> Result<(), SqlCursorError> {
        let Some(mut engine) = self.engine.take() else {
            return Ok(());
        };
        self.cache.clear(&mut engine);
        if let Err(err) = engine.close() {
            self.engine = Some(engine);
            return Err(err.into());
        }
        self.txn.reset();
        debug!("connection closed");
        Ok(())
    }
}

/// A database connection.
///
/// Cloning is cheap and yields another handle to the same connection; cursors hold one such
/// handle. Unless `check_same_thread` was turned off, every operation must come from the
/// thread that opened the connection.
pub struct Connection<E: Engine = SqliteEngine> {
    inner: Arc<Shared<E>>,
    owning_thread: ThreadId,
    check_same_thread: bool,
    busy_timeout: Duration,
}

impl<E: Engine> Clone for Connection<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            owning_thread: self.owning_thread,
            check_same_thread: self.check_same_thread,
            busy_timeout: self.busy_timeout,
        }
    }
}

impl<E: Engine> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("owning_thread", &self.owning_thread)
            .field("check_same_thread", &self.check_same_thread)
            .field("busy_timeout", &self.busy_timeout)
            .finish_non_exhaustive()
    }
}

impl Connection<SqliteEngine> {
    /// Open `path` with default options.
    ///
    /// # Errors
    /// Returns `SqlCursorError::OperationalError` if the database cannot be opened.
    pub fn open(path: &str) -> Result<Self, SqlCursorError> {
        Self::open_with(ConnectOptions::new(path))
    }

    /// # Errors
    /// Returns `SqlCursorError::OperationalError` if the database cannot be opened.
    pub fn open_with(options: ConnectOptions) -> Result<Self, SqlCursorError> {
        let engine = SqliteEngine::open(&options.database)?;
        debug!(database = %options.database, "opened database");
        Ok(Self::open_with_engine(engine, &options))
    }
}

impl<E: Engine> Connection<E> {
    /// Wrap an already opened engine. `options.database` is ignored.
    #[must_use]
    pub fn open_with_engine(engine: E, options: &ConnectOptions) -> Self {
        let converters = if options.default_converters {
            ConverterRegistry::with_defaults()
        } else {
            ConverterRegistry::new()
        };
        let adapters = if options.default_adapters {
            AdapterRegistry::with_defaults()
        } else {
            AdapterRegistry::new()
        };
        let state = ConnectionState {
            engine: Some(engine),
            cache: StatementCache::new(options.cached_statements),
            txn: TransactionCoordinator::new(options.implicit_begin),
            converters,
            adapters,
            busy_timeout: options.timeout(),
            detect_types: options.detect_types,
            text_policy: options.text_policy,
        };
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(state),
                holder: Mutex::new(None),
            }),
            owning_thread: thread::current().id(),
            check_same_thread: options.check_same_thread,
            busy_timeout: options.timeout(),
        }
    }

    pub(crate) fn check_thread(&self) -> Result<(), SqlCursorError> {
        let current = thread::current().id();
        if self.check_same_thread && current != self.owning_thread {
            return Err(SqlCursorError::WrongThread {
                created: self.owning_thread,
                current,
            });
        }
        Ok(())
    }

    /// Lock the shared state without the affinity and open checks.
    ///
    /// A thread that already holds the lock (a converter or adapter calling back into its
    /// own connection) gets a `ProgrammingError` instead of blocking on itself.
    pub(crate) fn state(&self) -> Result<StateGuard<'_, E>, SqlCursorError> {
        let current = thread::current().id();
        let guard = match self.inner.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                if self.inner.held_by(current) {
                    return Err(SqlCursorError::programming(
                        "Recursive use of the connection is not allowed",
                    ));
                }
                self.inner
                    .state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
            }
        };
        self.inner.set_holder(Some(current));
        Ok(StateGuard {
            guard,
            shared: &*self.inner,
        })
    }

    /// Lock the shared state after checking thread affinity and that the connection is open.
    pub(crate) fn lock(&self) -> Result<StateGuard<'_, E>, SqlCursorError> {
        self.check_thread()?;
        let state = self.state()?;
        if state.engine.is_none() {
            return Err(closed_database());
        }
        Ok(state)
    }

    /// Create a cursor on this connection.
    ///
    /// # Errors
    /// Fails on a closed connection or from a foreign thread.
    pub fn cursor(&self) -> Result<Cursor<E>, SqlCursorError> {
        drop(self.lock()?);
        Ok(Cursor::new(self.clone()))
    }

    /// Run one statement on a fresh cursor and return that cursor.
    ///
    /// # Errors
    /// See [`Cursor::execute`].
    pub fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<Cursor<E>, SqlCursorError> {
        let mut cursor = self.cursor()?;
        cursor.execute(sql, params)?;
        Ok(cursor)
    }

    /// Run one statement per parameter set on a fresh cursor.
    ///
    /// # Errors
    /// See [`Cursor::executemany`].
    pub fn executemany<I, P>(&self, sql: &str, param_sets: I) -> Result<Cursor<E>, SqlCursorError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let mut cursor = self.cursor()?;
        cursor.executemany(sql, param_sets)?;
        Ok(cursor)
    }

    /// Run a multi-statement script on a fresh cursor.
    ///
    /// # Errors
    /// See [`Cursor::executescript`].
    pub fn executescript(&self, script: &str) -> Result<Cursor<E>, SqlCursorError> {
        let mut cursor = self.cursor()?;
        cursor.executescript(script)?;
        Ok(cursor)
    }

    /// Register a fetch-direction converter for a declared type or alias tag (case-insensitive).
    ///
    /// # Errors
    /// Fails on a closed connection or from a foreign thread.
    pub fn register_converter<F>(&self, type_name: &str, converter: F) -> Result<(), SqlCursorError>
    where
        F: Fn(&[u8]) -> Result<RowValues, BoxError> + Send + Sync + 'static,
    {
        self.lock()?.converters.register(type_name, converter);
        Ok(())
    }

    /// Register a bind-direction adapter for values of `kind`.
    ///
    /// # Errors
    /// Fails on a closed connection or from a foreign thread.
    pub fn register_adapter<F>(&self, kind: ValueKind, adapter: F) -> Result<(), SqlCursorError>
    where
        F: Fn(&RowValues) -> Result<RowValues, BoxError> + Send + Sync + 'static,
    {
        self.lock()?.adapters.register(kind, adapter);
        Ok(())
    }

    /// # Errors
    /// Fails on a closed connection or from a foreign thread.
    pub fn in_transaction(&self) -> Result<bool, SqlCursorError> {
        Ok(self.lock()?.txn.in_transaction())
    }

    /// # Errors
    /// Fails on a closed connection or from a foreign thread.
    pub fn cache_stats(&self) -> Result<CacheStats, SqlCursorError> {
        Ok(self.lock()?.cache.stats())
    }

    /// How long a locked database is retried before failing with `Busy`. Fixed at open, so
    /// it can be read from any thread.
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    /// # Errors
    /// Fails from a foreign thread or from inside a converter or adapter of this connection.
    pub fn is_closed(&self) -> Result<bool, SqlCursorError> {
        self.check_thread()?;
        Ok(self.state()?.engine.is_none())
    }

    /// Finalize cached statements and release the engine handle. Closing twice is fine; an
    /// open transaction is discarded by the engine.
    ///
    /// # Errors
    /// Fails from a foreign thread, or with the engine's error if the handle cannot be closed.
    pub fn close(&self) -> Result<(), SqlCursorError> {
        self.check_thread()?;
        self.state()?.close()
    }
}
