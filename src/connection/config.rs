use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Connection;
use crate::error::SqlCursorError;
use crate::statement::cache::DEFAULT_CAPACITY;
use crate::types::{DetectTypes, TextPolicy};

/// Options for opening a [`Connection`].
///
/// Every field has a default, so a JSON document only needs the keys it changes:
/// ```rust
/// use sql_cursor::prelude::*;
///
/// let opts = ConnectOptions::from_json_str(r#"{ "database": "app.db", "timeout_ms": 250 }"#)?;
/// assert_eq!(opts.timeout(), std::time::Duration::from_millis(250));
/// assert!(opts.implicit_begin);
/// # Ok::<(), SqlCursorError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Path or URI of the database; `:memory:` for a private in-memory database.
    pub database: String,
    /// How long a step keeps retrying while the database is locked.
    pub timeout_ms: u64,
    /// Which column metadata selects a converter.
    pub detect_types: DetectTypes,
    /// Open and commit transactions around DML and DDL automatically.
    pub implicit_begin: bool,
    /// Reject use from any thread other than the one that opened the connection.
    pub check_same_thread: bool,
    pub text_policy: TextPolicy,
    /// Capacity of the compiled-statement cache.
    pub cached_statements: usize,
    /// Start with the `DATE`/`TIMESTAMP`/`JSON`/`BOOLEAN` converters registered.
    pub default_converters: bool,
    /// Start with the `Bool`/`Timestamp`/`Date`/`JSON` adapters registered.
    pub default_adapters: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            database: ":memory:".to_string(),
            timeout_ms: 5000,
            detect_types: DetectTypes::empty(),
            implicit_begin: true,
            check_same_thread: true,
            text_policy: TextPolicy::default(),
            cached_statements: DEFAULT_CAPACITY,
            default_converters: true,
            default_adapters: true,
        }
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Parse options from a JSON object.
    ///
    /// # Errors
    /// Returns `SqlCursorError::ConfigError` if the document is not valid for these options.
    pub fn from_json_str(json: &str) -> Result<Self, SqlCursorError> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn builder(database: impl Into<String>) -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::new(database)
    }
}

/// Fluent builder for [`ConnectOptions`].
#[derive(Debug, Clone)]
pub struct ConnectOptionsBuilder {
    opts: ConnectOptions,
}

impl ConnectOptionsBuilder {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            opts: ConnectOptions::new(database),
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn detect_types(mut self, detect_types: DetectTypes) -> Self {
        self.opts.detect_types = detect_types;
        self
    }

    #[must_use]
    pub fn implicit_begin(mut self, implicit_begin: bool) -> Self {
        self.opts.implicit_begin = implicit_begin;
        self
    }

    #[must_use]
    pub fn check_same_thread(mut self, check_same_thread: bool) -> Self {
        self.opts.check_same_thread = check_same_thread;
        self
    }

    #[must_use]
    pub fn text_policy(mut self, text_policy: TextPolicy) -> Self {
        self.opts.text_policy = text_policy;
        self
    }

    #[must_use]
    pub fn cached_statements(mut self, capacity: usize) -> Self {
        self.opts.cached_statements = capacity;
        self
    }

    #[must_use]
    pub fn default_converters(mut self, enabled: bool) -> Self {
        self.opts.default_converters = enabled;
        self
    }

    #[must_use]
    pub fn default_adapters(mut self, enabled: bool) -> Self {
        self.opts.default_adapters = enabled;
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectOptions {
        self.opts
    }

    /// Open a connection with the accumulated options.
    ///
    /// # Errors
    /// Returns `SqlCursorError::OperationalError` if the database cannot be opened.
    pub fn build(self) -> Result<Connection, SqlCursorError> {
        Connection::open_with(self.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() -> Result<(), SqlCursorError> {
        let opts = ConnectOptions::from_json_str(r#"{"detect_types": "DECLTYPES", "text_policy": "optimized_ascii"}"#)?;
        assert_eq!(opts.database, ":memory:");
        assert_eq!(opts.timeout(), Duration::from_secs(5));
        assert_eq!(opts.detect_types, DetectTypes::DECLTYPES);
        assert_eq!(opts.text_policy, TextPolicy::OptimizedAscii);
        assert_eq!(opts.cached_statements, 100);
        assert!(opts.check_same_thread);
        Ok(())
    }

    #[test]
    fn bad_documents_are_config_errors() {
        let err = ConnectOptions::from_json_str(r#"{"timeout_ms": "soon"}"#).unwrap_err();
        assert!(matches!(err, SqlCursorError::ConfigError(_)));
    }

    #[test]
    fn builder_sets_every_field() {
        let opts = ConnectOptions::builder("file.db")
            .timeout(Duration::from_millis(20))
            .detect_types(DetectTypes::COLNAMES)
            .implicit_begin(false)
            .check_same_thread(false)
            .text_policy(TextPolicy::Raw)
            .cached_statements(3)
            .default_converters(false)
            .default_adapters(false)
            .finish();
        assert_eq!(
            opts,
            ConnectOptions {
                database: "file.db".into(),
                timeout_ms: 20,
                detect_types: DetectTypes::COLNAMES,
                implicit_begin: false,
                check_same_thread: false,
                text_policy: TextPolicy::Raw,
                cached_statements: 3,
                default_converters: false,
                default_adapters: false,
            }
        );
    }
}
