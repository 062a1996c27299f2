//! Value conversion in both directions.
//!
//! Bind direction: an application [`RowValues`](crate::types::RowValues) goes through the
//! connection's [`AdapterRegistry`] and must come out as an engine primitive. Fetch
//! direction: a column either goes through a converter from the [`ConverterRegistry`]
//! (when type detection finds one) or is mapped by its runtime storage class.

pub mod adapters;
pub mod converters;

pub use adapters::{Adapter, AdapterRegistry, to_bind_value};
pub use converters::{Converter, ConverterRegistry, decode_column};

/// Error type returned by user-supplied adapters and converters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
