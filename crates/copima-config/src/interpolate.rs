//! `${VAR}` template interpolation over the merged configuration.
//!
//! A regex-free scan (per Design Notes: "no crate dependency needed beyond
//! serde_json already in the workspace"): walk every string value, find
//! `${`/`}` pairs, substitute from the variable map. Unresolved tokens are
//! left verbatim rather than erroring — documented behavior, not a panic.

use std::collections::HashMap;

use serde_json::Value;

/// Expand `${VAR}` tokens in every string value of `value`, recursively,
/// using `vars` as the substitution source.
pub fn interpolate(value: &mut Value, vars: &HashMap<String, String>) {
    match value {
        Value::String(s) => *s = expand_string(s, vars),
        Value::Array(items) => {
            for item in items {
                interpolate(item, vars);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                interpolate(v, vars);
            }
        }
        _ => {}
    }
}

fn expand_string(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}').map(|i| start + i) else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..end];
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..=end]),
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_known_variable() {
        let mut value = json!({"host": "https://${GITLAB_HOST}"});
        interpolate(&mut value, &vars(&[("GITLAB_HOST", "gitlab.internal")]));
        assert_eq!(value["host"], "https://gitlab.internal");
    }

    #[test]
    fn unresolved_token_left_verbatim() {
        let mut value = json!({"host": "${UNKNOWN}"});
        interpolate(&mut value, &HashMap::new());
        assert_eq!(value["host"], "${UNKNOWN}");
    }

    #[test]
    fn multiple_tokens_in_one_string() {
        let mut value = json!("${A}/${B}");
        interpolate(&mut value, &vars(&[("A", "x"), ("B", "y")]));
        assert_eq!(value, "x/y");
    }

    #[test]
    fn recurses_into_nested_objects_and_arrays() {
        let mut value = json!({"list": ["${A}", {"nested": "${A}"}]});
        interpolate(&mut value, &vars(&[("A", "z")]));
        assert_eq!(value["list"][0], "z");
        assert_eq!(value["list"][1]["nested"], "z");
    }

    #[test]
    fn unterminated_token_left_verbatim() {
        let mut value = json!("prefix-${A");
        interpolate(&mut value, &vars(&[("A", "z")]));
        assert_eq!(value, "prefix-${A");
    }
}
