//! Typed access to persisted settings maps
//!
//! Settings round-trip through JSON object maps. The helpers here read one
//! key with the expected type and report what went wrong precisely enough
//! for callers to decide between failing a restore and skipping an entry.

use serde_json::Value;

use crate::error::StoreError;

/// The persisted form of every restorable object
pub type Store = serde_json::Map<String, Value>;

/// Key for the `index`-th entry under `prefix`, e.g. `Step.0`
pub fn indexed_key(prefix: &str, index: usize) -> String {
    format!("{prefix}.{index}")
}

pub fn read_bool(map: &Store, key: &str) -> Result<bool, StoreError> {
    match map.get(key) {
        None => Err(StoreError::MissingKey { key: key.into() }),
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(StoreError::WrongType {
            key: key.into(),
            expected: "bool",
        }),
    }
}

/// Read a bool, defaulting when the key is absent
pub fn read_bool_or(map: &Store, key: &str, default: bool) -> Result<bool, StoreError> {
    match read_bool(map, key) {
        Err(StoreError::MissingKey { .. }) => Ok(default),
        other => other,
    }
}

pub fn read_usize(map: &Store, key: &str) -> Result<usize, StoreError> {
    match map.get(key) {
        None => Err(StoreError::MissingKey { key: key.into() }),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(|value| value as usize)
            .ok_or_else(|| StoreError::WrongType {
                key: key.into(),
                expected: "non-negative integer",
            }),
        Some(_) => Err(StoreError::WrongType {
            key: key.into(),
            expected: "non-negative integer",
        }),
    }
}

/// Read a count-like integer, defaulting when the key is absent
pub fn read_usize_or(map: &Store, key: &str, default: usize) -> Result<usize, StoreError> {
    match read_usize(map, key) {
        Err(StoreError::MissingKey { .. }) => Ok(default),
        other => other,
    }
}

pub fn read_str<'a>(map: &'a Store, key: &str) -> Result<&'a str, StoreError> {
    match map.get(key) {
        None => Err(StoreError::MissingKey { key: key.into() }),
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(StoreError::WrongType {
            key: key.into(),
            expected: "string",
        }),
    }
}

/// Read a string, defaulting when the key is absent
pub fn read_str_or<'a>(
    map: &'a Store,
    key: &str,
    default: &'a str,
) -> Result<&'a str, StoreError> {
    match read_str(map, key) {
        Err(StoreError::MissingKey { .. }) => Ok(default),
        other => other,
    }
}

pub fn read_string_list(map: &Store, key: &str) -> Result<Vec<String>, StoreError> {
    match map.get(key) {
        None => Err(StoreError::MissingKey { key: key.into() }),
        Some(Value::Array(values)) => values
            .iter()
            .map(|value| match value {
                Value::String(item) => Ok(item.clone()),
                _ => Err(StoreError::WrongType {
                    key: key.into(),
                    expected: "list of strings",
                }),
            })
            .collect(),
        Some(_) => Err(StoreError::WrongType {
            key: key.into(),
            expected: "list of strings",
        }),
    }
}

/// Read a string list, defaulting to empty when the key is absent
pub fn read_string_list_or_default(map: &Store, key: &str) -> Result<Vec<String>, StoreError> {
    match read_string_list(map, key) {
        Err(StoreError::MissingKey { .. }) => Ok(Vec::new()),
        other => other,
    }
}

pub fn read_map<'a>(map: &'a Store, key: &str) -> Result<&'a Store, StoreError> {
    match map.get(key) {
        None => Err(StoreError::MissingKey { key: key.into() }),
        Some(Value::Object(value)) => Ok(value),
        Some(_) => Err(StoreError::WrongType {
            key: key.into(),
            expected: "map",
        }),
    }
}
