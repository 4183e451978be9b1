//! Payload integrity codes.
//!
//! The checksum is a CRC-32 over a canonical JSON rendering of the payload:
//! object keys sorted at every depth, no whitespace. Two payloads that are
//! logically equal always produce the same checksum regardless of how the
//! producer's serializer ordered their fields.

use serde_json::Value;

/// Render `value` as canonical JSON.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// CRC-32 of the canonical rendering of `payload`.
pub fn checksum(payload: &Value) -> u32 {
    crc32fast::hash(canonical_json(payload).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": [3, {"y": 1, "x": 2}], "c": null}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":null,"z":[3,{"x":2,"y":1}]},"b":1}"#
        );
    }

    #[test]
    fn test_checksum_independent_of_key_order() {
        let a: Value = serde_json::from_str(r#"{"name": "A", "tags": ["x"], "n": 1}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"n":1,"tags":["x"],"name":"A"}"#).unwrap();
        assert_eq!(checksum(&a), checksum(&b));
    }

    #[test]
    fn test_checksum_detects_change() {
        assert_ne!(checksum(&json!({"name": "A"})), checksum(&json!({"name": "B"})));
        assert_ne!(checksum(&json!([1, 2])), checksum(&json!([2, 1])));
    }

    #[test]
    fn test_strings_are_escaped() {
        let value = json!({"quote\"key": "line\nbreak"});
        assert_eq!(canonical_json(&value), r#"{"quote\"key":"line\nbreak"}"#);
    }

    #[test]
    fn test_known_crc() {
        // CRC-32 (IEEE) of the ASCII bytes `"Cool task"`.
        assert_eq!(
            checksum(&json!("Cool task")),
            crc32fast::hash(b"\"Cool task\"")
        );
    }
}
