//! [`Engine`] implementation over the bundled libsqlite3, driven through `rusqlite::ffi`.
//!
//! The handle is opened without an engine-level busy handler: `SQLITE_BUSY` is surfaced to
//! the caller so that the retry policy lives in [`crate::executor`].

// FFI calls are confined to this module.
#![allow(unsafe_code)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;

use rusqlite::ffi;

use super::{BindValue, ColumnType, Engine, EngineError, StepResult};

/// An open database handle.
pub struct SqliteEngine {
    db: *mut ffi::sqlite3,
}

// SAFETY: the bundled library is built in serialized threading mode, and every access to
// the handle goes through `&mut self` or the connection mutex above it.
unsafe impl Send for SqliteEngine {}

/// A compiled statement. Dropping it finalizes the engine object.
pub struct SqliteStatement {
    raw: *mut ffi::sqlite3_stmt,
}

// SAFETY: see `SqliteEngine`; a statement is only stepped by the connection that owns it.
unsafe impl Send for SqliteStatement {}

impl Drop for SqliteStatement {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            // SAFETY: `raw` came from a successful prepare and is finalized exactly once.
            unsafe {
                ffi::sqlite3_finalize(self.raw);
            }
            self.raw = ptr::null_mut();
        }
    }
}

impl std::fmt::Debug for SqliteStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStatement")
            .field("raw", &self.raw)
            .finish()
    }
}

impl SqliteEngine {
    /// Open (creating if needed) the database at `path`. URI filenames are accepted.
    ///
    /// # Errors
    /// Returns the engine diagnostic if the database cannot be opened.
    pub fn open(path: &str) -> Result<Self, EngineError> {
        let c_path = CString::new(path).map_err(|_| {
            EngineError::new(
                ffi::SQLITE_MISUSE,
                "database path contains an interior NUL byte",
            )
        })?;
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_URI;
        // SAFETY: `c_path` is NUL-terminated and outlives the call; `db` is a valid out pointer.
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };
        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                errstr(rc)
            } else {
                let msg = errmsg(db);
                // SAFETY: a failed open may still allocate a handle, which must be closed once.
                unsafe {
                    ffi::sqlite3_close(db);
                }
                msg
            };
            return Err(EngineError::new(rc, message));
        }
        Ok(Self { db })
    }

    fn error_for(&self, rc: c_int) -> EngineError {
        if self.db.is_null() {
            EngineError::new(rc, errstr(rc))
        } else {
            EngineError::new(rc, errmsg(self.db))
        }
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.db.is_null() {
            Err(EngineError::new(
                ffi::SQLITE_MISUSE,
                "database handle is closed",
            ))
        } else {
            Ok(())
        }
    }
}

impl Drop for SqliteEngine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: `db` is a live handle; the message is copied out before any other call on it.
    unsafe {
        let msg = ffi::sqlite3_errmsg(db);
        if msg.is_null() {
            String::from("unknown error")
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

fn errstr(rc: c_int) -> String {
    // SAFETY: `sqlite3_errstr` returns a static string or NULL.
    unsafe {
        let msg = ffi::sqlite3_errstr(rc);
        if msg.is_null() {
            format!("error code {rc}")
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

fn c_len(len: usize) -> Result<c_int, EngineError> {
    c_int::try_from(len).map_err(|_| EngineError::new(ffi::SQLITE_TOOBIG, "string or blob too big"))
}

fn c_index(index: usize) -> c_int {
    c_int::try_from(index).unwrap_or(c_int::MAX)
}

fn owned_cstr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: callers pass strings owned by a live statement, copied out immediately.
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

impl Engine for SqliteEngine {
    type Statement = SqliteStatement;

    fn prepare(&mut self, sql: &str) -> Result<SqliteStatement, EngineError> {
        let (stmt, consumed) = self.prepare_first(sql)?;
        let Some(stmt) = stmt else {
            return Err(EngineError::new(
                ffi::SQLITE_MISUSE,
                "no SQL statement to execute",
            ));
        };
        let rest = &sql[consumed..];
        if !rest.trim().is_empty() {
            if let (Some(_extra), _) = self.prepare_first(rest)? {
                return Err(EngineError::new(
                    ffi::SQLITE_MISUSE,
                    "You can only execute one statement at a time.",
                ));
            }
        }
        Ok(stmt)
    }

    fn prepare_first(
        &mut self,
        sql: &str,
    ) -> Result<(Option<SqliteStatement>, usize), EngineError> {
        self.ensure_open()?;
        let len = c_len(sql.len())?;
        let start = sql.as_ptr().cast::<c_char>();
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        // SAFETY: `start` points at `len` readable bytes of `sql`; the out pointers are valid.
        let rc = unsafe { ffi::sqlite3_prepare_v2(self.db, start, len, &mut raw, &mut tail) };
        if rc != ffi::SQLITE_OK {
            if !raw.is_null() {
                // SAFETY: a statement returned alongside an error is still owned by us.
                unsafe {
                    ffi::sqlite3_finalize(raw);
                }
            }
            return Err(self.error_for(rc));
        }
        let consumed = if tail.is_null() {
            sql.len()
        } else {
            // SAFETY: the engine sets `tail` inside the same buffer as `start`.
            let offset = unsafe { tail.offset_from(start) };
            usize::try_from(offset).unwrap_or(sql.len()).min(sql.len())
        };
        let stmt = if raw.is_null() {
            None
        } else {
            Some(SqliteStatement { raw })
        };
        Ok((stmt, consumed))
    }

    fn bind(
        &mut self,
        stmt: &mut SqliteStatement,
        index: usize,
        value: BindValue<'_>,
    ) -> Result<(), EngineError> {
        let idx = c_index(index);
        // SAFETY: `stmt.raw` is a live statement. Text and blob are copied by the engine
        // (`SQLITE_TRANSIENT`), so the borrowed buffers only need to live for the call.
        let rc = match value {
            BindValue::Null => unsafe { ffi::sqlite3_bind_null(stmt.raw, idx) },
            BindValue::Integer(v) => unsafe { ffi::sqlite3_bind_int64(stmt.raw, idx, v) },
            BindValue::Real(v) => unsafe { ffi::sqlite3_bind_double(stmt.raw, idx, v) },
            BindValue::Text(s) => {
                let len = c_len(s.len())?;
                unsafe {
                    ffi::sqlite3_bind_text(
                        stmt.raw,
                        idx,
                        s.as_ptr().cast::<c_char>(),
                        len,
                        ffi::SQLITE_TRANSIENT(),
                    )
                }
            }
            BindValue::Blob(b) => {
                let len = c_len(b.len())?;
                unsafe {
                    ffi::sqlite3_bind_blob(
                        stmt.raw,
                        idx,
                        b.as_ptr().cast::<c_void>(),
                        len,
                        ffi::SQLITE_TRANSIENT(),
                    )
                }
            }
        };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error_for(rc))
        }
    }

    fn bind_parameter_count(&self, stmt: &SqliteStatement) -> usize {
        // SAFETY: `stmt.raw` is a live statement.
        let n = unsafe { ffi::sqlite3_bind_parameter_count(stmt.raw) };
        n.max(0) as usize
    }

    fn bind_parameter_name(&self, stmt: &SqliteStatement, index: usize) -> Option<String> {
        // SAFETY: `stmt.raw` is a live statement; out-of-range indices yield NULL.
        owned_cstr(unsafe { ffi::sqlite3_bind_parameter_name(stmt.raw, c_index(index)) })
    }

    fn step(&mut self, stmt: &mut SqliteStatement) -> StepResult {
        // SAFETY: `stmt.raw` is a live statement of this handle, borrowed mutably.
        let rc = unsafe { ffi::sqlite3_step(stmt.raw) };
        match rc & 0xff {
            ffi::SQLITE_ROW => StepResult::Row,
            ffi::SQLITE_DONE => StepResult::Done,
            ffi::SQLITE_BUSY => StepResult::Busy,
            ffi::SQLITE_SCHEMA => StepResult::SchemaChanged,
            _ => StepResult::Error(self.error_for(rc)),
        }
    }

    fn reset(&mut self, stmt: &mut SqliteStatement) -> Result<(), EngineError> {
        // SAFETY: `stmt.raw` is a live statement.
        let rc = unsafe { ffi::sqlite3_reset(stmt.raw) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error_for(rc))
        }
    }

    fn clear_bindings(&mut self, stmt: &mut SqliteStatement) {
        // SAFETY: `stmt.raw` is a live statement.
        unsafe {
            ffi::sqlite3_clear_bindings(stmt.raw);
        }
    }

    fn finalize(&mut self, stmt: SqliteStatement) {
        drop(stmt);
    }

    fn column_count(&self, stmt: &SqliteStatement) -> usize {
        // SAFETY: `stmt.raw` is a live statement.
        let n = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        n.max(0) as usize
    }

    fn column_name(&self, stmt: &SqliteStatement, index: usize) -> String {
        // SAFETY: `stmt.raw` is a live statement; out-of-range indices yield NULL.
        owned_cstr(unsafe { ffi::sqlite3_column_name(stmt.raw, c_index(index)) })
            .unwrap_or_default()
    }

    fn column_decltype(&self, stmt: &SqliteStatement, index: usize) -> Option<String> {
        // SAFETY: as for `column_name`.
        owned_cstr(unsafe { ffi::sqlite3_column_decltype(stmt.raw, c_index(index)) })
    }

    fn column_type(&self, stmt: &SqliteStatement, index: usize) -> ColumnType {
        // SAFETY: `stmt.raw` is a live statement; out-of-range columns read as NULL.
        match unsafe { ffi::sqlite3_column_type(stmt.raw, c_index(index)) } {
            ffi::SQLITE_INTEGER => ColumnType::Integer,
            ffi::SQLITE_FLOAT => ColumnType::Float,
            ffi::SQLITE_TEXT => ColumnType::Text,
            ffi::SQLITE_BLOB => ColumnType::Blob,
            _ => ColumnType::Null,
        }
    }

    fn column_int64(&self, stmt: &SqliteStatement, index: usize) -> i64 {
        // SAFETY: as for `column_type`.
        unsafe { ffi::sqlite3_column_int64(stmt.raw, c_index(index)) }
    }

    fn column_double(&self, stmt: &SqliteStatement, index: usize) -> f64 {
        // SAFETY: as for `column_type`.
        unsafe { ffi::sqlite3_column_double(stmt.raw, c_index(index)) }
    }

    fn column_text<'s>(&self, stmt: &'s SqliteStatement, index: usize) -> &'s [u8] {
        let idx = c_index(index);
        // SAFETY: the buffer stays valid until the statement is stepped, reset or finalized,
        // all of which need `&mut` access and so cannot overlap the returned borrow.
        unsafe {
            let data = ffi::sqlite3_column_text(stmt.raw, idx);
            if data.is_null() {
                return &[];
            }
            let len = ffi::sqlite3_column_bytes(stmt.raw, idx).max(0) as usize;
            std::slice::from_raw_parts(data, len)
        }
    }

    fn column_blob<'s>(&self, stmt: &'s SqliteStatement, index: usize) -> &'s [u8] {
        let idx = c_index(index);
        // SAFETY: as for `column_text`.
        unsafe {
            let data = ffi::sqlite3_column_blob(stmt.raw, idx);
            if data.is_null() {
                return &[];
            }
            let len = ffi::sqlite3_column_bytes(stmt.raw, idx).max(0) as usize;
            std::slice::from_raw_parts(data.cast::<u8>(), len)
        }
    }

    fn changes(&self) -> u64 {
        if self.db.is_null() {
            return 0;
        }
        // SAFETY: `db` is a live handle.
        let n = unsafe { ffi::sqlite3_changes(self.db) };
        n.max(0) as u64
    }

    fn last_insert_rowid(&self) -> i64 {
        if self.db.is_null() {
            return 0;
        }
        // SAFETY: `db` is a live handle.
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    fn is_complete(&self, sql: &str) -> bool {
        match CString::new(sql) {
            // SAFETY: `c_sql` is NUL-terminated and outlives the call.
            Ok(c_sql) => unsafe { ffi::sqlite3_complete(c_sql.as_ptr()) != 0 },
            Err(_) => false,
        }
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if self.db.is_null() {
            return Ok(());
        }
        // SAFETY: `db` is live and nulled below, so it is closed once. close_v2 defers the
        // release until statements still held by cursors are finalized.
        let rc = unsafe { ffi::sqlite3_close_v2(self.db) };
        if rc != ffi::SQLITE_OK {
            return Err(self.error_for(rc));
        }
        self.db = ptr::null_mut();
        Ok(())
    }
}
