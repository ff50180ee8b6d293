//! Deep merge of patch fragments into the base document.
//!
//! Objects merge key by key, arrays go through [`merge_array`] first, and
//! every other value (including `null`) overwrites what was there.

use serde_json::{Map, Value};

/// Name of the array whose unmarked string elements append instead of
/// replacing.
pub const APPEND_ARRAY: &str = "skins";

/// Merge `patch` into `original` using the `+` / `-` marker convention.
///
/// Elements apply in order:
/// - a non-string element is appended,
/// - `"+x"` appends `"x"`,
/// - `"-x"` removes the first `"x"`, if any,
/// - a plain string appends only when `append` is set.
///
/// If no element took one of those paths the patch replaces the original
/// outright.
pub fn merge_array(original: &[Value], patch: &[Value], append: bool) -> Vec<Value> {
    let mut result = original.to_vec();
    let mut recognized = false;

    for element in patch {
        let Value::String(s) = element else {
            result.push(element.clone());
            recognized = true;
            continue;
        };

        if let Some(added) = s.strip_prefix('+') {
            result.push(Value::String(added.to_string()));
            recognized = true;
        } else if let Some(removed) = s.strip_prefix('-') {
            if let Some(pos) = result.iter().position(|v| v.as_str() == Some(removed)) {
                result.remove(pos);
            }
            recognized = true;
        } else if append {
            result.push(element.clone());
            recognized = true;
        }
    }

    if recognized { result } else { patch.to_vec() }
}

/// Recursively merge `patch` into `original`.
pub fn merge_objects(original: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Object(patch_obj) => match original.get_mut(&key) {
                Some(Value::Object(orig_obj)) => merge_objects(orig_obj, patch_obj),
                _ => {
                    let mut fresh = Map::new();
                    merge_objects(&mut fresh, patch_obj);
                    original.insert(key, Value::Object(fresh));
                }
            },
            Value::Array(patch_arr) => {
                let merged = match original.get(&key) {
                    Some(Value::Array(orig_arr)) => {
                        merge_array(orig_arr, &patch_arr, key == APPEND_ARRAY)
                    }
                    _ => merge_array(&[], &patch_arr, key == APPEND_ARRAY),
                };
                original.insert(key, Value::Array(merged));
            }
            other => {
                original.insert(key, other);
            }
        }
    }
}

/// Merge a patch value into a document value. Non-object roots overwrite.
pub fn merge_value(original: &mut Value, patch: Value) {
    match (original, patch) {
        (Value::Object(orig), Value::Object(p)) => merge_objects(orig, p),
        (slot, other) => *slot = other,
    }
}
