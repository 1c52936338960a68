//! Free-form attribute maps carried by every persisted entity.
//!
//! At every boundary (storage, HTTP, RPC) metadata is a plain string-keyed
//! JSON object. Decoding a stored column happens exactly once per entity,
//! through [`decode_metadata`]; nothing else in the crate interprets the raw
//! column text, so no storage artifact can leak into a serialized response.

use serde_json::{Map, Value};

use crate::core::errors::ServiceError;

/// A plain string-keyed map of JSON-compatible values.
pub type Metadata = Map<String, Value>;

/// Decode a stored metadata column into a plain map.
///
/// `NULL` and the empty string load as the empty map. Any stored value that
/// is not a JSON object is a defect in the row and surfaces as an error
/// rather than being coerced.
///
/// # Errors
/// Returns an error if the column is not valid JSON or not a JSON object.
pub fn decode_metadata(raw: Option<&str>) -> Result<Metadata, ServiceError> {
    let raw = match raw {
        None => return Ok(Metadata::new()),
        Some(s) if s.is_empty() => return Ok(Metadata::new()),
        Some(s) => s,
    };
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(ServiceError::InvalidArgument(format!(
            "stored metadata is not a JSON object: {other}"
        ))),
    }
}

/// Encode a metadata map for storage.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn encode_metadata(metadata: &Metadata) -> Result<String, ServiceError> {
    Ok(serde_json::to_string(metadata)?)
}

/// Shallow-merge `patch` into `base`: new keys are added, existing keys are
/// overwritten, untouched keys are preserved.
pub fn merge_metadata(base: &mut Metadata, patch: Metadata) {
    for (key, value) in patch {
        base.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_decode_null_and_empty() {
        assert!(decode_metadata(None).unwrap().is_empty());
        assert!(decode_metadata(Some("")).unwrap().is_empty());
        assert!(decode_metadata(Some("{}")).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(decode_metadata(Some("[1,2]")).is_err());
        assert!(decode_metadata(Some("\"str\"")).is_err());
        assert!(decode_metadata(Some("not json")).is_err());
    }

    #[test]
    fn test_shallow_merge() {
        let mut base = map(json!({"a": 1, "b": 2}));
        merge_metadata(&mut base, map(json!({"b": 3, "c": 4})));
        assert_eq!(Value::Object(base), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_merge_is_shallow_not_deep() {
        let mut base = map(json!({"nested": {"x": 1, "y": 2}}));
        merge_metadata(&mut base, map(json!({"nested": {"y": 3}})));
        // The whole nested value is replaced, not merged key-by-key.
        assert_eq!(Value::Object(base), json!({"nested": {"y": 3}}));
    }

    #[test]
    fn test_encode_roundtrip() {
        let original = map(json!({"tags": ["a", "b"], "count": 2}));
        let encoded = encode_metadata(&original).unwrap();
        let decoded = decode_metadata(Some(&encoded)).unwrap();
        assert_eq!(original, decoded);
    }
}
