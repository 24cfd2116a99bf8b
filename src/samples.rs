use std::collections::HashMap;

use itertools::Itertools;
use serde_json::Value;

/// Flatten one sample document into dotted field paths.
///
/// Objects recurse (`a.b.c`), `null` becomes the empty string, strings are
/// taken as-is, and everything else (numbers, bools, arrays) keeps its JSON
/// rendering. Non-object documents flatten to nothing.
pub fn flatten_document(doc: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Value::Object(map) = doc {
        for (key, value) in map {
            flatten_into(key, value, &mut out);
        }
    }
    out
}

fn flatten_into(path: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(&format!("{}.{}", path, key), child, out);
            }
        }
        Value::Null => out.push((path.to_string(), String::new())),
        Value::String(s) => out.push((path.to_string(), s.clone())),
        other => out.push((path.to_string(), other.to_string())),
    }
}

/// Per-field origin values across the sample set: field path to one value per
/// document that contained it, in document order. Documents missing a field
/// simply contribute nothing for it.
pub fn origin_value_table(docs: &[Value]) -> HashMap<String, Vec<String>> {
    docs.iter()
        .flat_map(flatten_document)
        .into_group_map()
}
