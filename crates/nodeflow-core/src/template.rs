//! `{{path}}` templates over JSON data.
//!
//! Unresolved placeholders are left in the output untouched so a wrong path
//! stays visible in the rendered text instead of collapsing to nothing.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is valid")
});

/// Walk `root` along a dot-separated path.
///
/// Objects are indexed by key and arrays by numeric segment. Returns `None`
/// as soon as a step hits something that is not a container or a missing key.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Text form of a value: strings verbatim, everything else as compact JSON.
pub fn stringify(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

/// Render a template value. Non-string templates render as `""`.
pub fn interpolate(template: &Value, data: &Value) -> String {
    match template.as_str() {
        Some(s) => interpolate_str(s, data),
        None => String::new(),
    }
}

/// Replace every `{{path}}` in `template` with the value found in `data`.
///
/// Single pass: text produced by a substitution is never scanned again.
pub fn interpolate_str(template: &str, data: &Value) -> String {
    if !has_placeholders(template) {
        return template.to_string();
    }
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            match resolve_path(data, &caps[1]) {
                Some(value) => stringify(value).into_owned(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Whether the template contains at least one placeholder.
pub fn has_placeholders(template: &str) -> bool {
    PLACEHOLDER.is_match(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_nested_path() {
        let data = json!({"a": {"b": 2}});
        assert_eq!(resolve_path(&data, "a.b"), Some(&json!(2)));
        assert_eq!(resolve_path(&data, "a.c"), None);
        assert_eq!(resolve_path(&Value::Null, "a.b"), None);
    }

    #[test]
    fn test_resolve_stops_at_scalars_and_nulls() {
        let data = json!({"a": {"b": null, "n": 5}});
        assert_eq!(resolve_path(&data, "a.b.c"), None);
        assert_eq!(resolve_path(&data, "a.n.x"), None);
        assert_eq!(resolve_path(&data, "a.b"), Some(&Value::Null));
    }

    #[test]
    fn test_resolve_array_index() {
        let data = json!({"items": [{"id": "x"}, {"id": "y"}]});
        assert_eq!(resolve_path(&data, "items.1.id"), Some(&json!("y")));
        assert_eq!(resolve_path(&data, "items.7.id"), None);
        assert_eq!(resolve_path(&data, "items.first"), None);
    }

    #[test]
    fn test_interpolate_resolved() {
        let data = json!({"a": {"b": "Sam"}});
        assert_eq!(interpolate_str("Hi {{a.b}}", &data), "Hi Sam");
        assert_eq!(interpolate_str("Hi {{ a.b }}!", &data), "Hi Sam!");
    }

    #[test]
    fn test_interpolate_preserves_unresolved() {
        let data = json!({"a": {"b": "Sam"}});
        assert_eq!(interpolate_str("Hi {{a.c}}", &data), "Hi {{a.c}}");
        assert_eq!(
            interpolate_str("{{a.b}} and {{missing}}", &data),
            "Sam and {{missing}}"
        );
    }

    #[test]
    fn test_interpolate_non_string_values() {
        let data = json!({"n": 42, "ok": true, "obj": {"k": [1, 2]}, "nil": null});
        assert_eq!(interpolate_str("{{n}}/{{ok}}", &data), "42/true");
        assert_eq!(interpolate_str("{{obj}}", &data), r#"{"k":[1,2]}"#);
        assert_eq!(interpolate_str("{{nil}}", &data), "null");
    }

    #[test]
    fn test_interpolate_non_string_template() {
        let data = json!({"a": 1});
        assert_eq!(interpolate(&json!(5), &data), "");
        assert_eq!(interpolate(&Value::Null, &data), "");
        assert_eq!(interpolate(&json!("{{a}}"), &data), "1");
    }

    #[test]
    fn test_interpolate_does_not_recurse() {
        let data = json!({"a": "{{b}}", "b": "nope"});
        assert_eq!(interpolate_str("x {{a}}", &data), "x {{b}}");
    }

    #[test]
    fn test_interpolate_idempotent_without_placeholders() {
        let data = json!({"a": {"b": "Sam"}});
        let once = interpolate_str("Hello {{a.b}}, {single} brace", &data);
        assert_eq!(interpolate_str(&once, &data), once);
        assert_eq!(interpolate_str("plain text", &data), "plain text");
    }

    #[test]
    fn test_has_placeholders() {
        assert!(has_placeholders("Created {{data.id}}"));
        assert!(!has_placeholders("Failed"));
    }
}
