use std::collections::{BTreeMap, HashMap};

use bitflags::bitflags;
use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Values that can be bound as statement parameters or returned in a row.
///
/// The engine itself only understands `Null`, `Int`, `Float`, `Text` and `Blob`; the
/// remaining variants reach the engine through an adapter (see
/// [`AdapterRegistry`](crate::conversion::AdapterRegistry)):
/// ```rust
/// use sql_cursor::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// Calendar date value
    Date(NaiveDate),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

/// Tag naming the variant of a [`RowValues`]; adapters are registered per tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Text,
    Bool,
    Timestamp,
    Date,
    Null,
    JSON,
    Blob,
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            RowValues::Int(_) => ValueKind::Int,
            RowValues::Float(_) => ValueKind::Float,
            RowValues::Text(_) => ValueKind::Text,
            RowValues::Bool(_) => ValueKind::Bool,
            RowValues::Timestamp(_) => ValueKind::Timestamp,
            RowValues::Date(_) => ValueKind::Date,
            RowValues::Null => ValueKind::Null,
            RowValues::JSON(_) => ValueKind::JSON,
            RowValues::Blob(_) => ValueKind::Blob,
        }
    }

    /// Whether the engine can bind this value without adaptation.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            RowValues::Null
                | RowValues::Int(_)
                | RowValues::Float(_)
                | RowValues::Text(_)
                | RowValues::Blob(_)
        )
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Render the value as JSON, used by the command-line front end.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::from(s.as_str()),
            RowValues::Bool(b) => JsonValue::from(*b),
            RowValues::Timestamp(dt) => JsonValue::from(dt.format("%F %T%.f").to_string()),
            RowValues::Date(d) => JsonValue::from(d.format("%F").to_string()),
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(bytes) => JsonValue::from(bytes.clone()),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// One parameter set for a statement: positional (`?`) or named (`:name`).
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<RowValues>),
    Named(HashMap<String, RowValues>),
}

impl Params {
    /// Build a named parameter set from `(name, value)` pairs.
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Params::default()
    }
}

impl From<Vec<RowValues>> for Params {
    fn from(values: Vec<RowValues>) -> Self {
        Params::Positional(values)
    }
}

impl From<&[RowValues]> for Params {
    fn from(values: &[RowValues]) -> Self {
        Params::Positional(values.to_vec())
    }
}

impl<const N: usize> From<[RowValues; N]> for Params {
    fn from(values: [RowValues; N]) -> Self {
        Params::Positional(values.into())
    }
}

impl From<HashMap<String, RowValues>> for Params {
    fn from(values: HashMap<String, RowValues>) -> Self {
        Params::Named(values)
    }
}

impl From<BTreeMap<String, RowValues>> for Params {
    fn from(values: BTreeMap<String, RowValues>) -> Self {
        Params::Named(values.into_iter().collect())
    }
}

bitflags! {
    /// Which column metadata is consulted when looking up a converter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DetectTypes: u8 {
        /// Look up the declared column type (`CREATE TABLE t(d DATE)`).
        const DECLTYPES = 0b01;
        /// Look up a bracketed tag in the column name (`SELECT d AS "d [date]"`).
        const COLNAMES = 0b10;
    }
}

/// How TEXT columns are turned into application values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPolicy {
    /// Hand back the raw bytes as a `Blob`.
    Raw,
    /// Decode as UTF-8; invalid data is an operational error.
    #[default]
    Validated,
    /// Skip validation for pure-ASCII text, decode UTF-8 otherwise.
    OptimizedAscii,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_become_null() {
        let absent: Option<i64> = None;
        assert_eq!(RowValues::from(absent), RowValues::Null);
        assert_eq!(RowValues::from(Some("x")), RowValues::Text("x".into()));
    }

    #[test]
    fn unit_is_an_empty_positional_set() {
        let params: Params = ().into();
        assert!(params.is_empty());
        assert!(matches!(params, Params::Positional(_)));
    }

    #[test]
    fn only_engine_native_values_are_primitive() {
        assert!(RowValues::Blob(vec![1]).is_primitive());
        assert!(!RowValues::Bool(true).is_primitive());
        assert_eq!(RowValues::Bool(true).kind(), ValueKind::Bool);
    }
}
