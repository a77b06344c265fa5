//! Deep merge of layered `serde_json::Value`s.
//!
//! Each of the five layers (defaults, local file, user file, environment,
//! CLI args) produces a `Value`; merging is a recursive object-key union
//! where a later layer's key always wins. Scalars and arrays replace
//! wholesale rather than merging element-wise — this is "deep on nested
//! maps; scalar and array values replace" per spec.

use serde_json::Value;

/// Merge `layer` into `base` in place. `layer` wins on every key it sets.
pub fn deep_merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, layer_value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, layer_value),
                    None => {
                        base_map.insert(key, layer_value);
                    }
                }
            }
        }
        (base_slot, layer_value) => *base_slot = layer_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_layer_scalar_wins() {
        let mut base = json!({"a": 1, "b": 2});
        deep_merge(&mut base, json!({"a": 99}));
        assert_eq!(base, json!({"a": 99, "b": 2}));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let mut base = json!({"gitlab": {"host": "a", "timeout": 30}});
        deep_merge(&mut base, json!({"gitlab": {"host": "b"}}));
        assert_eq!(base, json!({"gitlab": {"host": "b", "timeout": 30}}));
    }

    #[test]
    fn arrays_replace_wholesale_not_concatenate() {
        let mut base = json!({"scopes": ["a", "b"]});
        deep_merge(&mut base, json!({"scopes": ["c"]}));
        assert_eq!(base, json!({"scopes": ["c"]}));
    }

    #[test]
    fn new_keys_in_layer_are_added() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, json!({"b": 2}));
        assert_eq!(base, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn type_mismatch_replaces_rather_than_merging() {
        let mut base = json!({"a": {"nested": true}});
        deep_merge(&mut base, json!({"a": "scalar now"}));
        assert_eq!(base, json!({"a": "scalar now"}));
    }
}
