//! Rows and column metadata produced by a cursor.

pub mod row;

pub use row::Row;

/// Metadata for one result column, as exposed through `Cursor::description`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    /// Column name, cut at the first space so a `name [tag]` alias reports `name`.
    pub name: String,
    /// Declared type from the table schema, when the column maps to one.
    pub declared_type: Option<String>,
}

impl ColumnDescription {
    pub(crate) fn from_engine_name(raw_name: &str, declared_type: Option<String>) -> Self {
        let name = raw_name
            .split_once(' ')
            .map_or(raw_name, |(head, _)| head)
            .to_string();
        Self {
            name,
            declared_type,
        }
    }
}
