use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use super::BoxError;
use crate::engine::{ColumnType, Engine};
use crate::error::SqlCursorError;
use crate::types::{DetectTypes, RowValues, TextPolicy};

/// Turns the text representation of a column into an application value.
pub type Converter = Arc<dyn Fn(&[u8]) -> Result<RowValues, BoxError> + Send + Sync>;

/// Fetch-direction converters keyed by type tag. Tags are matched case-insensitively.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Converter>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.converters.keys()).finish()
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, BoxError> {
    Ok(std::str::from_utf8(bytes)?.trim())
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn parse_bool(text: &str) -> Result<bool, BoxError> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(i != 0);
    }
    if text.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if text.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(format!("not a boolean: {text:?}").into())
    }
}

impl ConverterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with converters for `DATE`, `TIMESTAMP`/`DATETIME`, `JSON` and
    /// `BOOLEAN`/`BOOL`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("DATE", |bytes| {
            let date = NaiveDate::parse_from_str(utf8(bytes)?, "%Y-%m-%d")?;
            Ok(RowValues::Date(date))
        });
        for name in ["TIMESTAMP", "DATETIME"] {
            registry.register(name, |bytes| {
                Ok(RowValues::Timestamp(parse_timestamp(utf8(bytes)?)?))
            });
        }
        registry.register("JSON", |bytes| {
            Ok(RowValues::JSON(serde_json::from_slice(bytes)?))
        });
        for name in ["BOOLEAN", "BOOL"] {
            registry.register(name, |bytes| Ok(RowValues::Bool(parse_bool(utf8(bytes)?)?)));
        }
        registry
    }

    /// Register (or replace) the converter for `type_name`.
    pub fn register<F>(&mut self, type_name: &str, converter: F)
    where
        F: Fn(&[u8]) -> Result<RowValues, BoxError> + Send + Sync + 'static,
    {
        self.converters
            .insert(type_name.to_uppercase(), Arc::new(converter));
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&Converter> {
        self.converters.get(&type_name.to_uppercase())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Pick the converter for one result column. The bracketed alias tag is tried before the
    /// declared type; either lookup only runs when enabled in `detect`.
    #[must_use]
    pub fn lookup(
        &self,
        detect: DetectTypes,
        column_name: &str,
        declared_type: Option<&str>,
    ) -> Option<Converter> {
        if detect.contains(DetectTypes::COLNAMES) {
            if let Some(found) = alias_tag(column_name).and_then(|tag| self.get(tag)) {
                return Some(Arc::clone(found));
            }
        }
        if detect.contains(DetectTypes::DECLTYPES) {
            if let Some(found) = declared_type
                .map(declared_type_token)
                .and_then(|token| self.get(token))
            {
                return Some(Arc::clone(found));
            }
        }
        None
    }
}

/// The text between the first `[` and the following `]` of a column name.
fn alias_tag(column_name: &str) -> Option<&str> {
    let (_, rest) = column_name.split_once('[')?;
    let (tag, _) = rest.split_once(']')?;
    Some(tag)
}

/// Leading token of a declared type: `NUMERIC(10, 2)` and `TIMESTAMP WITH TZ` both reduce to
/// their first word.
fn declared_type_token(declared: &str) -> &str {
    let declared = declared.trim_start();
    let end = declared
        .find(|c: char| c == ' ' || c == '(')
        .unwrap_or(declared.len());
    &declared[..end]
}

/// Decode one column of the current row.
///
/// With a converter, NULL stays NULL and a failing converter degrades to NULL. Without one,
/// the runtime storage class decides; TEXT follows `policy`.
///
/// # Errors
/// `OperationalError` when `policy` requires UTF-8 and the column text is not.
pub fn decode_column<E: Engine>(
    engine: &E,
    stmt: &E::Statement,
    index: usize,
    column_name: &str,
    converter: Option<&Converter>,
    policy: TextPolicy,
) -> Result<RowValues, SqlCursorError> {
    let column_type = engine.column_type(stmt, index);
    if let Some(convert) = converter {
        if column_type == ColumnType::Null {
            return Ok(RowValues::Null);
        }
        return Ok(match convert(engine.column_text(stmt, index)) {
            Ok(value) => value,
            Err(err) => {
                warn!(column = column_name, error = %err, "converter failed; returning NULL");
                RowValues::Null
            }
        });
    }

    Ok(match column_type {
        ColumnType::Null => RowValues::Null,
        ColumnType::Integer => RowValues::Int(engine.column_int64(stmt, index)),
        ColumnType::Float => RowValues::Float(engine.column_double(stmt, index)),
        ColumnType::Text => decode_text(engine.column_text(stmt, index), column_name, policy)?,
        ColumnType::Blob => RowValues::Blob(engine.column_blob(stmt, index).to_vec()),
    })
}

fn decode_text(bytes: &[u8], column_name: &str, policy: TextPolicy) -> Result<RowValues, SqlCursorError> {
    match policy {
        TextPolicy::Raw => Ok(RowValues::Blob(bytes.to_vec())),
        TextPolicy::OptimizedAscii if bytes.is_ascii() => {
            Ok(RowValues::Text(bytes.iter().map(|&b| char::from(b)).collect()))
        }
        TextPolicy::OptimizedAscii | TextPolicy::Validated => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(RowValues::Text(text.to_owned())),
            Err(_) => Err(SqlCursorError::OperationalError(format!(
                "Could not decode to UTF-8 column '{column_name}' with text '{}'",
                String::from_utf8_lossy(bytes)
            ))),
        },
    }
}
