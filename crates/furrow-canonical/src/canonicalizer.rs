use canonical_json::to_string;
use serde::Serialize;
use serde_json::Value;

use std::fmt;

/// Error returned when canonicalization fails.
#[derive(thiserror::Error, Debug)]
pub enum CanonicalizationError {
    /// The value could not be converted into a JSON tree.
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// Non-finite number (NaN/Infinity) detected.
    #[error("non-finite number detected at {0}")]
    NonFiniteNumber(String),
    /// The RFC 8785 encoder rejected the value.
    #[error("canonical encoding failed: {0}")]
    Encoding(String),
}

/// JSON path used in error messages.
#[derive(Debug, Clone)]
struct Path {
    segments: Vec<String>,
}

impl Path {
    fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    fn push_field(&self, field: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(field.to_string());
        Self { segments }
    }

    fn push_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(format!("[{}]", index));
        Self { segments }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.segments.join("."))
        }
    }
}

/// Produces RFC 8785 bytes for any serializable value.
///
/// Numbers are rendered as their decimal strings before encoding, so a stored
/// record that went through a JSON round trip hashes to the same bytes as the
/// in-memory value it was written from.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalizationError> {
    let mut tree = serde_json::to_value(value)
        .map_err(|e| CanonicalizationError::Serialization(e.to_string()))?;
    check_finite(&tree, Path::root())?;
    stringify_numbers(&mut tree);
    canonical_value_bytes(&tree)
}

/// Produces RFC 8785 bytes for an already-built JSON tree, without rewriting numbers.
pub fn canonical_value_bytes(value: &Value) -> Result<Vec<u8>, CanonicalizationError> {
    check_finite(value, Path::root())?;
    let canonical =
        to_string(value).map_err(|err| CanonicalizationError::Encoding(err.to_string()))?;
    Ok(canonical.into_bytes())
}

fn check_finite(value: &Value, path: Path) -> Result<(), CanonicalizationError> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                check_finite(child, path.push_field(key))?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                check_finite(item, path.push_index(idx))?;
            }
            Ok(())
        }
        Value::Number(num) => match num.as_f64() {
            Some(f) if !f.is_finite() => Err(CanonicalizationError::NonFiniteNumber(path.to_string())),
            _ => Ok(()),
        },
        Value::String(_) | Value::Bool(_) | Value::Null => Ok(()),
    }
}

/// Recursively converts all JSON numbers into strings.
fn stringify_numbers(value: &mut Value) {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            *value = Value::String(s);
        }
        Value::Array(arr) => {
            for v in arr {
                stringify_numbers(v);
            }
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                stringify_numbers(v);
            }
        }
        _ => {}
    }
}
