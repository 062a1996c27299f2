//! Cursor-style execution layer over an embedded SQL engine.
//!
//! A [`Connection`] owns the engine handle, an LRU cache of compiled statements, the
//! conversion registries and the implicit-transaction state. [`Cursor`]s run statements on
//! it, binding [`RowValues`] parameters and producing [`Row`]s.
//!
//! ```rust
//! use sql_cursor::prelude::*;
//!
//! let conn = Connection::open(":memory:")?;
//! let mut cur = conn.cursor()?;
//! cur.execute("CREATE TABLE t(x)", ())?;
//! cur.executemany("INSERT INTO t VALUES (?)", [[RowValues::Int(1)], [RowValues::Int(2)]])?;
//! assert_eq!(cur.rowcount(), 2);
//! let rows = cur.execute("SELECT x FROM t ORDER BY x", ())?.fetchall()?;
//! assert_eq!(rows[1].get("x"), Some(&RowValues::Int(2)));
//! # Ok::<(), SqlCursorError>(())
//! ```

pub mod connection;
pub mod conversion;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod results;
pub mod statement;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transaction;
pub mod types;

pub use connection::{ConnectOptions, ConnectOptionsBuilder, Connection};
pub use cursor::Cursor;
pub use error::{ErrorKind, SqlCursorError};
pub use results::{ColumnDescription, Row};
pub use types::{DetectTypes, Params, RowValues, TextPolicy, ValueKind};
