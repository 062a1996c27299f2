use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::BoxError;
use crate::engine::BindValue;
use crate::error::SqlCursorError;
use crate::types::{RowValues, ValueKind};

/// Turns a value of one [`ValueKind`] into something the engine can bind.
pub type Adapter = Arc<dyn Fn(&RowValues) -> Result<RowValues, BoxError> + Send + Sync>;

/// Bind-direction adapters, keyed by the kind of value they accept.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ValueKind, Adapter>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.adapters.keys()).finish()
    }
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with adapters for `Bool` (0/1), `Timestamp` and `Date` (ISO text) and `JSON`
    /// (serialized text).
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ValueKind::Bool, |value| match value {
            RowValues::Bool(b) => Ok(RowValues::Int(i64::from(*b))),
            other => Err(unexpected(ValueKind::Bool, other)),
        });
        registry.register(ValueKind::Timestamp, |value| match value {
            RowValues::Timestamp(dt) => Ok(RowValues::Text(dt.format("%F %T%.f").to_string())),
            other => Err(unexpected(ValueKind::Timestamp, other)),
        });
        registry.register(ValueKind::Date, |value| match value {
            RowValues::Date(d) => Ok(RowValues::Text(d.format("%F").to_string())),
            other => Err(unexpected(ValueKind::Date, other)),
        });
        registry.register(ValueKind::JSON, |value| match value {
            RowValues::JSON(v) => Ok(RowValues::Text(serde_json::to_string(v)?)),
            other => Err(unexpected(ValueKind::JSON, other)),
        });
        registry
    }

    /// Register (or replace) the adapter for `kind`.
    pub fn register<F>(&mut self, kind: ValueKind, adapter: F)
    where
        F: Fn(&RowValues) -> Result<RowValues, BoxError> + Send + Sync + 'static,
    {
        self.adapters.insert(kind, Arc::new(adapter));
    }

    #[must_use]
    pub fn contains(&self, kind: ValueKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Resolve `value` to an engine primitive.
    ///
    /// A registered adapter for the value's kind takes precedence; otherwise primitives pass
    /// through unchanged.
    ///
    /// # Errors
    /// `UnsupportedType` if no adapter applies to a non-primitive value, if the adapter fails,
    /// or if it produces another non-primitive value.
    pub fn adapt<'v>(&self, value: &'v RowValues) -> Result<Cow<'v, RowValues>, SqlCursorError> {
        let kind = value.kind();
        match self.adapters.get(&kind) {
            Some(adapter) => {
                let adapted = adapter(value).map_err(|err| {
                    SqlCursorError::UnsupportedType(format!("adapter for {kind:?} failed: {err}"))
                })?;
                if adapted.is_primitive() {
                    Ok(Cow::Owned(adapted))
                } else {
                    Err(SqlCursorError::UnsupportedType(format!(
                        "adapter for {kind:?} produced a non-bindable {:?}",
                        adapted.kind()
                    )))
                }
            }
            None if value.is_primitive() => Ok(Cow::Borrowed(value)),
            None => Err(SqlCursorError::UnsupportedType(format!(
                "no adapter registered for {kind:?} values"
            ))),
        }
    }
}

fn unexpected(expected: ValueKind, got: &RowValues) -> BoxError {
    format!("expected a {expected:?} value, got {:?}", got.kind()).into()
}

/// Borrow an engine primitive out of `value`; `None` for values that need adapting.
#[must_use]
pub fn to_bind_value(value: &RowValues) -> Option<BindValue<'_>> {
    match value {
        RowValues::Null => Some(BindValue::Null),
        RowValues::Int(i) => Some(BindValue::Integer(*i)),
        RowValues::Float(f) => Some(BindValue::Real(*f)),
        RowValues::Text(s) => Some(BindValue::Text(s)),
        RowValues::Blob(b) => Some(BindValue::Blob(b)),
        RowValues::Bool(_)
        | RowValues::Timestamp(_)
        | RowValues::Date(_)
        | RowValues::JSON(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn primitives_pass_through_without_adapters() -> Result<(), SqlCursorError> {
        let registry = AdapterRegistry::new();
        let value = RowValues::Text("x".into());
        assert!(matches!(registry.adapt(&value)?, Cow::Borrowed(_)));
        assert!(matches!(
            registry.adapt(&RowValues::Bool(true)),
            Err(SqlCursorError::UnsupportedType(_))
        ));
        Ok(())
    }

    #[test]
    fn default_adapters_produce_primitives() -> Result<(), SqlCursorError> {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(
            registry.adapt(&RowValues::Bool(true))?.into_owned(),
            RowValues::Int(1)
        );
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            registry.adapt(&RowValues::Date(date))?.into_owned(),
            RowValues::Text("2024-02-29".into())
        );
        let ts = date.and_hms_opt(8, 30, 0).unwrap();
        assert_eq!(
            registry.adapt(&RowValues::Timestamp(ts))?.into_owned(),
            RowValues::Text("2024-02-29 08:30:00".into())
        );
        let json = RowValues::JSON(serde_json::json!({"a": 1}));
        assert_eq!(
            registry.adapt(&json)?.into_owned(),
            RowValues::Text("{\"a\":1}".into())
        );
        Ok(())
    }

    #[test]
    fn registered_adapter_wins_over_native_mapping() -> Result<(), SqlCursorError> {
        let mut registry = AdapterRegistry::new();
        registry.register(ValueKind::Text, |v| {
            Ok(RowValues::Text(v.as_text().unwrap_or_default().to_uppercase()))
        });
        assert_eq!(
            registry.adapt(&RowValues::Text("abc".into()))?.into_owned(),
            RowValues::Text("ABC".into())
        );
        Ok(())
    }

    #[test]
    fn adapter_output_must_be_bindable() {
        let mut registry = AdapterRegistry::new();
        registry.register(ValueKind::Bool, |v| Ok(v.clone()));
        assert!(matches!(
            registry.adapt(&RowValues::Bool(false)),
            Err(SqlCursorError::UnsupportedType(_))
        ));
        registry.register(ValueKind::Bool, |_| Err("nope".into()));
        let err = registry.adapt(&RowValues::Bool(false)).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn bind_values_borrow_primitives() {
        let text = RowValues::Text("t".into());
        assert_eq!(to_bind_value(&text), Some(BindValue::Text("t")));
        assert_eq!(to_bind_value(&RowValues::Null), Some(BindValue::Null));
        assert_eq!(to_bind_value(&RowValues::Bool(true)), None);
    }
}
