//! Convenient imports for common functionality.

pub use crate::connection::{ConnectOptions, ConnectOptionsBuilder, Connection};
pub use crate::conversion::{AdapterRegistry, BoxError, ConverterRegistry};
pub use crate::cursor::Cursor;
pub use crate::engine::{Engine, SqliteEngine};
pub use crate::error::{ErrorKind, SqlCursorError};
pub use crate::results::{ColumnDescription, Row};
pub use crate::statement::{CacheStats, StatementKind};
pub use crate::types::{DetectTypes, Params, RowValues, TextPolicy, ValueKind};
