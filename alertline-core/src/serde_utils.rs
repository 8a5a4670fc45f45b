use std::path::Path;

use crate::errors::{CoreError, Result};

/// Serializes a value to pretty JSON with canonical error handling.
pub fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|err| CoreError::Serialization(err.to_string()))
}

/// Deserializes a JSON string into the provided type with shared error semantics.
pub fn from_json_str<T: serde::de::DeserializeOwned>(input: &str) -> Result<T> {
    serde_json::from_str(input).map_err(|err| CoreError::Deserialization(err.to_string()))
}

/// Deserializes a JSON or YAML document. YAML is a superset of JSON, so a
/// single parser covers both formats.
pub fn from_document_str<T: serde::de::DeserializeOwned>(input: &str) -> Result<T> {
    serde_yaml::from_str(input).map_err(|err| CoreError::Deserialization(err.to_string()))
}

/// Whether a path carries one of the document extensions we know how to parse.
pub fn is_document_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("json" | "yaml" | "yml")
    )
}
