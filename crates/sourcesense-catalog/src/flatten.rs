//! Flattening of nested API payloads into flat record fields
//!
//! Nested objects are promoted to dotted keys (`owner.login`) up to a maximum
//! depth. Objects below that depth and all arrays are kept as compact JSON
//! text under their dotted key.

use serde_json::Value;
use sourcesense_core::ScalarValue;
use std::collections::BTreeMap;

/// Default nesting depth promoted to dotted keys
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Key separator for promoted fields
pub const KEY_SEPARATOR: char = '.';

/// Flatten a JSON object; non-object input yields an empty map
pub fn flatten_json(value: &Value, max_depth: usize) -> BTreeMap<String, ScalarValue> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = value {
        for (key, child) in map {
            flatten_into(&mut out, key.clone(), child, 1, max_depth);
        }
    }
    out
}

fn flatten_into(
    out: &mut BTreeMap<String, ScalarValue>,
    key: String,
    value: &Value,
    depth: usize,
    max_depth: usize,
) {
    match value {
        Value::Object(map) if depth < max_depth => {
            for (child_key, child) in map {
                let joined = format!("{}{}{}", key, KEY_SEPARATOR, child_key);
                flatten_into(out, joined, child, depth + 1, max_depth);
            }
        }
        Value::Object(_) | Value::Array(_) => {
            out.insert(key, ScalarValue::Text(value.to_string()));
        }
        scalar => {
            if let Some(v) = ScalarValue::from_json(scalar) {
                out.insert(key, v);
            }
        }
    }
}
