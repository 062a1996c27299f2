use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// One decoded result row.
///
/// Column names are shared by every row of the same statement execution, as is the lookup
/// table built from them, so a row only owns its values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names as described for the statement (shared across all rows)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row, in column order
    pub values: Vec<RowValues>,
    // lower-cased name -> first index with that name
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

/// Build the case-insensitive name lookup for a set of column names. The first column wins
/// when two names differ only in case.
pub(crate) fn column_index(column_names: &[String]) -> Arc<HashMap<String, usize>> {
    let mut index = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        index.entry(name.to_lowercase()).or_insert(i);
    }
    Arc::new(index)
}

impl Row {
    /// Create a row, building its own name lookup.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<RowValues>) -> Self {
        let cache = column_index(&column_names);
        Self {
            column_names,
            values,
            column_index_cache: cache,
        }
    }

    pub(crate) fn with_shared_index(
        column_names: Arc<Vec<String>>,
        column_index_cache: Arc<HashMap<String, usize>>,
        values: Vec<RowValues>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index_cache,
        }
    }

    /// Index of a column by name, ignoring ASCII and Unicode case.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_index_cache
            .get(&column_name.to_lowercase())
            .copied()
    }

    /// Value of the named column (case-insensitive).
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate `(column name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }
}
