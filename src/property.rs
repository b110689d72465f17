//! The property bag's value model (spec §3, §9).
//!
//! The store itself is weakly typed on disk — every property is a file of
//! raw bytes — but callers work with a small tagged variant, and a handful
//! of reserved property names are coerced to a fixed encoding on write.

use std::collections::BTreeMap;

use crate::constants::{PROP_CHECKSUM, PROP_CREATION_TIME, PROP_FILESIZE, PROP_TIMESTAMP};

/// A single scalar property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl PropertyValue {
    /// Encode to the raw bytes written to `metadata/<name>`.
    ///
    /// Strings are UTF-8, numbers are decimal ASCII, byte sequences are
    /// written verbatim — matching `metadatastore.py`'s `_set_property`.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            PropertyValue::Text(s) => s.as_bytes().to_vec(),
            PropertyValue::Int(i) => i.to_string().into_bytes(),
            PropertyValue::Float(f) => f.to_string().into_bytes(),
            PropertyValue::Bytes(b) => b.clone(),
        }
    }

    /// Decode raw bytes read from disk, given an expectation for reserved
    /// numeric properties. Unreserved properties decode as UTF-8 text when
    /// possible, falling back to raw bytes.
    pub fn decode(name: &str, bytes: Vec<u8>) -> Self {
        if is_numeric_property(name) {
            if let Ok(s) = String::from_utf8(bytes.clone()) {
                if let Ok(i) = s.trim().parse::<i64>() {
                    return PropertyValue::Int(i);
                }
                if let Ok(f) = s.trim().parse::<f64>() {
                    return PropertyValue::Float(f);
                }
            }
            return PropertyValue::Bytes(bytes);
        }

        match String::from_utf8(bytes.clone()) {
            Ok(s) => PropertyValue::Text(s),
            Err(_) => PropertyValue::Bytes(bytes),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::Float(f) => Some(*f as i64),
            PropertyValue::Text(s) => s.trim().parse().ok(),
            PropertyValue::Bytes(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Text(s) => s.trim().parse().ok(),
            PropertyValue::Bytes(_) => None,
        }
    }

    /// Rendered as a display string, e.g. for CLI output or computed props.
    pub fn to_display_string(&self) -> String {
        match self {
            PropertyValue::Text(s) => s.clone(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

fn is_numeric_property(name: &str) -> bool {
    matches!(
        name,
        PROP_TIMESTAMP | PROP_CREATION_TIME | PROP_FILESIZE
    )
}

/// A property bag: a mapping from property name to value. Keyed by
/// `BTreeMap` so iteration is deterministic (useful for metadata-store
/// delete-diffing and for tests).
pub type PropertyBag = BTreeMap<String, PropertyValue>;

/// Strip a `:type` suffix some legacy callers still attach to property
/// names (spec §3): everything from the first colon on is discarded.
pub fn sanitize_key(name: &str) -> &str {
    match name.find(':') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Checksum helper: render a 128-bit MD5 digest as lowercase hex, matching
/// the format `metadatastore.py` stores it in.
pub fn checksum_property(hex_digest: String) -> (String, PropertyValue) {
    (PROP_CHECKSUM.to_string(), PropertyValue::Text(hex_digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_key_strips_suffix() {
        assert_eq!(sanitize_key("title:text"), "title");
        assert_eq!(sanitize_key("title"), "title");
        assert_eq!(sanitize_key(":weird"), "");
    }

    #[test]
    fn test_numeric_roundtrip() {
        let value = PropertyValue::Int(1_700_000_000);
        let bytes = value.encode();
        assert_eq!(bytes, b"1700000000");
        let decoded = PropertyValue::decode("timestamp", bytes);
        assert_eq!(decoded.as_i64(), Some(1_700_000_000));
    }

    #[test]
    fn test_text_roundtrip() {
        let value = PropertyValue::Text("hello world".to_string());
        let bytes = value.encode();
        let decoded = PropertyValue::decode("title", bytes);
        assert_eq!(decoded.as_text(), Some("hello world"));
    }

    #[test]
    fn test_bytes_property_survives_non_utf8() {
        let raw = vec![0xff, 0xfe, 0x00, 0x01];
        let decoded = PropertyValue::decode("preview", raw.clone());
        match decoded {
            PropertyValue::Bytes(b) => assert_eq!(b, raw),
            other => panic!("expected Bytes variant, got {:?}", other),
        }
    }

    proptest! {
        #[test]
        fn proptest_text_property_roundtrips(s in "[\\PC]{0,64}") {
            let value = PropertyValue::Text(s.clone());
            let decoded = PropertyValue::decode("description", value.encode());
            prop_assert_eq!(decoded.as_text(), Some(s.as_str()));
        }

        #[test]
        fn proptest_numeric_property_roundtrips(i in i64::MIN..i64::MAX) {
            let value = PropertyValue::Int(i);
            let decoded = PropertyValue::decode("timestamp", value.encode());
            prop_assert_eq!(decoded.as_i64(), Some(i));
        }

        #[test]
        fn proptest_arbitrary_bytes_survive_when_non_utf8(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let decoded = PropertyValue::decode("preview", bytes.clone());
            match (std::str::from_utf8(&bytes), decoded) {
                (Ok(s), PropertyValue::Text(t)) => prop_assert_eq!(t, s),
                (Err(_), PropertyValue::Bytes(b)) => prop_assert_eq!(b, bytes),
                (ok, other) => prop_assert!(false, "unexpected decode for utf8={:?}: {:?}", ok.is_ok(), other),
            }
        }
    }
}
