//! Declarative translation between kintone field codes and domain models.
//!
//! Every app gets one [`FieldMap`]: a static table of external field code,
//! internal key and [`Coercion`]. `decode` turns a stored record into any
//! `Deserialize` model and `encode` turns any `Serialize` model into a write
//! payload. Keys a model leaves out are left out of the payload.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Number, Value};
use thiserror::Error;

use super::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Record number (`$id`); read only.
    Id,
    Text,
    Number,
    /// Checkbox / multi-select: list of strings.
    Set,
    /// RFC 3339 datetime.
    Timestamp,
    /// Attachment list.
    Files,
    /// Boolean stored as a marker value (`true` when the value or list contains it).
    Flag(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub external: &'static str,
    pub internal: &'static str,
    pub coercion: Coercion,
}

pub const fn field(external: &'static str, internal: &'static str, coercion: Coercion) -> FieldSpec {
    FieldSpec {
        external,
        internal,
        coercion,
    }
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("field {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to build model: {0}")]
    Model(#[from] serde_json::Error),
    #[error("model must serialize to a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    fields: &'static [FieldSpec],
}

impl FieldMap {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    /// Field selection list sent with every read.
    pub fn external_codes(&self) -> Vec<&'static str> {
        self.fields.iter().map(|spec| spec.external).collect()
    }

    pub fn decode<T: DeserializeOwned>(&self, record: &Record) -> Result<T, MappingError> {
        let mut internal = Map::new();
        for spec in self.fields {
            let Some(raw) = record.get(spec.external).and_then(|entry| entry.get("value")) else {
                continue;
            };
            let value = decode_value(spec, raw)?;
            // Absent rather than null, so serde defaults apply to blank fields.
            if !value.is_null() {
                internal.insert(spec.internal.to_string(), value);
            }
        }
        Ok(serde_json::from_value(Value::Object(internal))?)
    }

    pub fn decode_all<T: DeserializeOwned>(&self, records: &[Record]) -> Result<Vec<T>, MappingError> {
        records.iter().map(|record| self.decode(record)).collect()
    }

    pub fn encode<T: Serialize>(&self, model: &T) -> Result<Record, MappingError> {
        let Value::Object(internal) = serde_json::to_value(model)? else {
            return Err(MappingError::NotAnObject);
        };

        let mut record = Record::new();
        for spec in self.fields {
            if spec.coercion == Coercion::Id {
                continue;
            }
            let Some(value) = internal.get(spec.internal) else {
                continue;
            };
            record.insert(
                spec.external.to_string(),
                json!({ "value": encode_value(spec, value)? }),
            );
        }
        Ok(record)
    }
}

fn invalid(spec: &FieldSpec, reason: impl Into<String>) -> MappingError {
    MappingError::InvalidValue {
        field: spec.external,
        reason: reason.into(),
    }
}

fn decode_value(spec: &FieldSpec, raw: &Value) -> Result<Value, MappingError> {
    match spec.coercion {
        Coercion::Id => match raw {
            Value::String(s) => s
                .parse::<u64>()
                .map(Value::from)
                .map_err(|_| invalid(spec, format!("not a record id: {s}"))),
            Value::Number(_) => Ok(raw.clone()),
            other => Err(invalid(spec, format!("unexpected id value {other}"))),
        },
        Coercion::Text | Coercion::Timestamp => match raw {
            Value::Null => Ok(Value::Null),
            Value::String(s) if s.is_empty() => Ok(Value::Null),
            Value::String(_) => Ok(raw.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            other => Err(invalid(spec, format!("expected text, got {other}"))),
        },
        Coercion::Number => match raw {
            Value::Null => Ok(Value::Null),
            Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::String(s) => parse_number(s.trim())
                .map(Value::Number)
                .ok_or_else(|| invalid(spec, format!("not a number: {s}"))),
            Value::Number(_) => Ok(raw.clone()),
            other => Err(invalid(spec, format!("expected number, got {other}"))),
        },
        Coercion::Set => match raw {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::String(s) if s.is_empty() => Ok(Value::Array(Vec::new())),
            Value::String(_) => Ok(Value::Array(vec![raw.clone()])),
            Value::Array(items) => {
                if items.iter().all(Value::is_string) {
                    Ok(raw.clone())
                } else {
                    Err(invalid(spec, "set entries must be strings"))
                }
            }
            other => Err(invalid(spec, format!("expected list, got {other}"))),
        },
        Coercion::Files => match raw {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::Array(items) => items
                .iter()
                .map(|item| decode_file(spec, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(invalid(spec, format!("expected attachments, got {other}"))),
        },
        Coercion::Flag(marker) => match raw {
            Value::Null => Ok(Value::Bool(false)),
            Value::String(s) => Ok(Value::Bool(s == marker)),
            Value::Array(items) => Ok(Value::Bool(
                items.iter().any(|item| item.as_str() == Some(marker)),
            )),
            Value::Bool(_) => Ok(raw.clone()),
            other => Err(invalid(spec, format!("expected marker, got {other}"))),
        },
    }
}

fn decode_file(spec: &FieldSpec, item: &Value) -> Result<Value, MappingError> {
    let text = |key: &str| -> String {
        item.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    };
    let file_key = text("fileKey");
    if file_key.is_empty() {
        return Err(invalid(spec, "attachment without fileKey"));
    }
    let size = match item.get("size") {
        Some(Value::String(s)) => s.parse::<u64>().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    };
    Ok(json!({
        "file_key": file_key,
        "name": text("name"),
        "content_type": text("contentType"),
        "size": size,
    }))
}

fn encode_value(spec: &FieldSpec, value: &Value) -> Result<Value, MappingError> {
    match spec.coercion {
        Coercion::Id => Err(invalid(spec, "record ids are read only")),
        Coercion::Text | Coercion::Timestamp => match value {
            Value::Null => Ok(Value::String(String::new())),
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(invalid(spec, format!("cannot store {other} as text"))),
        },
        Coercion::Number => match value {
            Value::Null => Ok(Value::String(String::new())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::String(s) if s.is_empty() || parse_number(s).is_some() => Ok(value.clone()),
            other => Err(invalid(spec, format!("cannot store {other} as number"))),
        },
        Coercion::Set => match value {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(value.clone()),
            other => Err(invalid(spec, format!("cannot store {other} as list"))),
        },
        Coercion::Files => match value {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.get("file_key")
                        .and_then(Value::as_str)
                        .map(|key| json!({ "fileKey": key }))
                        .ok_or_else(|| invalid(spec, "attachment without file_key"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(invalid(spec, format!("cannot store {other} as attachments"))),
        },
        Coercion::Flag(marker) => match value {
            Value::Bool(true) => Ok(Value::String(marker.to_string())),
            Value::Bool(false) | Value::Null => Ok(Value::String(String::new())),
            other => Err(invalid(spec, format!("cannot store {other} as marker"))),
        },
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Number::from(int));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}
