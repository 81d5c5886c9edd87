//! Helpers for attribute bags.

use serde_json::{Map, Value};

/// Attributes owned by the server, dropped before sending attributes back.
pub const SERVER_MANAGED: &[&str] = &[
    "id",
    "slug",
    "userId",
    "createdAt",
    "updatedAt",
    "status",
    "errorMessage",
    "taskId",
    "clonedHost",
    "dataLastUpdated",
    "sources",
    "layer",
    "widget",
    "metadata",
    "vocabulary",
    "user",
];

/// Returns a copy of `attributes` without server-managed keys.
///
/// If `keys` is given, only those keys are kept.
///
/// # Examples
///
/// ```
/// use serde_json::json;
///
/// let attributes = json!({"name": "A", "slug": "a", "provider": "cartodb"});
/// let attributes = attributes.as_object().unwrap();
/// let writable = rwapi::attributes::writable(attributes, None);
/// assert!(writable.contains_key("name"));
/// assert!(!writable.contains_key("slug"));
///
/// let writable = rwapi::attributes::writable(attributes, Some(&["provider".to_string()]));
/// assert_eq!(writable.len(), 1);
/// ```
pub fn writable(attributes: &Map<String, Value>, keys: Option<&[String]>) -> Map<String, Value> {
    attributes
        .iter()
        .filter(|(key, _)| !SERVER_MANAGED.contains(&key.as_str()))
        .filter(|(key, _)| keys.is_none_or(|keys| keys.iter().any(|k| k == *key)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Returns a string attribute.
pub fn str_value<'a>(attributes: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    attributes.get(key).and_then(Value::as_str)
}

/// Returns true if `value` contains `term`, ignoring case.
pub(crate) fn contains_ignore_case(value: Option<&str>, term: &str) -> bool {
    value.is_some_and(|value| value.to_lowercase().contains(&term.to_lowercase()))
}

/// Replaces substrings in every string of a JSON value.
///
/// Used to point cloned widget configs at cloned layers.
pub(crate) fn replace_strings(value: &mut Value, replacements: &[(String, String)]) {
    match value {
        Value::String(s) => {
            for (from, to) in replacements {
                if s.contains(from.as_str()) {
                    *s = s.replace(from.as_str(), to);
                }
            }
        }
        Value::Array(values) => {
            for value in values {
                replace_strings(value, replacements);
            }
        }
        Value::Object(object) => {
            for value in object.values_mut() {
                replace_strings(value, replacements);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::replace_strings;
    use serde_json::json;

    #[test]
    fn replace_nested_strings() {
        let mut config = json!({
            "layer_id": "old-layer",
            "paramsConfig": {"layers": ["old-layer", "other"]},
            "url": "https://api.resourcewatch.org/v1/layer/old-layer/tile",
            "zoom": 3
        });
        replace_strings(
            &mut config,
            &[("old-layer".to_string(), "new-layer".to_string())],
        );
        assert_eq!(
            config,
            json!({
                "layer_id": "new-layer",
                "paramsConfig": {"layers": ["new-layer", "other"]},
                "url": "https://api.resourcewatch.org/v1/layer/new-layer/tile",
                "zoom": 3
            })
        );
    }
}
