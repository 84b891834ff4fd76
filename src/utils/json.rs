use serde_json::Value;

/// A PATCH field: absent keeps the stored value, `null` clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NullableValue<T> {
    Omitted,
    Null,
    Value(T),
}

impl<T> NullableValue<T> {
    pub fn into_patch(self) -> Option<Option<T>> {
        match self {
            NullableValue::Omitted => None,
            NullableValue::Null => Some(None),
            NullableValue::Value(value) => Some(Some(value)),
        }
    }
}

/// Blank strings count as `null`.
pub fn classify_nullable(optional_value: Option<&Value>) -> Result<NullableValue<String>, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::Value(s.trim().to_owned())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

pub fn classify_nullable_integer(
    optional_value: Option<&Value>,
) -> Result<NullableValue<i64>, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(NullableValue::Value)
            .ok_or_else(|| format!("expected integer, got {n}")),
        Some(other) => Err(format!("expected integer or null, got {other}")),
    }
}
