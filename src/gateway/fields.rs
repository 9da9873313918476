//! Lenient readers for loosely-typed backend JSON.
//!
//! The backend renames and re-wraps fields between endpoints, so every read
//! takes a list of candidate keys and accepts numbers encoded as strings.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

pub type Object = Map<String, Value>;

/// Keys under which list-shaped payloads have been observed.
pub const LIST_KEYS: &[&str] = &["data", "items", "results", "users", "transactions", "scans", "history"];

/// Keys under which object-shaped payloads have been observed.
pub const OBJECT_KEYS: &[&str] = &["data", "overview", "stats", "result"];

/// First present, non-null value among `keys`.
pub fn first<'a>(map: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

/// String value; numbers and booleans are rendered as text.
pub fn first_str(map: &Object, keys: &[&str]) -> Option<String> {
    first(map, keys).and_then(value_to_string)
}

pub fn first_f64(map: &Object, keys: &[&str]) -> Option<f64> {
    first(map, keys).and_then(value_to_f64)
}

pub fn first_u64(map: &Object, keys: &[&str]) -> Option<u64> {
    first(map, keys).and_then(|v| match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub fn first_decimal(map: &Object, keys: &[&str]) -> Option<Decimal> {
    first(map, keys).and_then(|v| match v {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    })
}

pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A bare list, or a list wrapped one or two levels deep under a known key.
/// Anything else is an empty list.
pub fn unwrap_list(value: &Value, keys: &[&str]) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => keys
            .iter()
            .filter_map(|k| map.get(*k))
            .find_map(|inner| match inner {
                Value::Array(items) => Some(items.clone()),
                Value::Object(_) => {
                    let nested = unwrap_list(inner, keys);
                    (!nested.is_empty()).then_some(nested)
                }
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Objects only, from [`unwrap_list`].
pub fn unwrap_object_list(value: &Value, keys: &[&str]) -> Vec<Object> {
    unwrap_list(value, keys)
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// The object wrapped under a known key, else the object itself, else empty.
pub fn unwrap_object(value: &Value, keys: &[&str]) -> Object {
    let Value::Object(map) = value else {
        return Object::new();
    };
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(|v| v.as_object().cloned())
        .unwrap_or_else(|| map.clone())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn obj(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn first_skips_missing_and_null() {
        let map = obj(json!({"a": null, "b": "x", "c": "y"}));
        assert_eq!(first_str(&map, &["a", "b", "c"]).as_deref(), Some("x"));
        assert_eq!(first_str(&map, &["z"]), None);
    }

    #[test]
    fn numbers_from_strings() {
        let map = obj(json!({"score": "0.75", "count": "12", "bal": "10.5", "n": 3}));
        assert_eq!(first_f64(&map, &["score"]), Some(0.75));
        assert_eq!(first_u64(&map, &["count"]), Some(12));
        assert_eq!(first_u64(&map, &["n"]), Some(3));
        assert_eq!(first_decimal(&map, &["bal"]), Some(dec!(10.5)));
        assert_eq!(first_str(&map, &["n"]).as_deref(), Some("3"));
    }

    #[test]
    fn decimal_from_json_number() {
        let map = obj(json!({"tdl": 12.25}));
        assert_eq!(first_decimal(&map, &["tdl"]), Some(dec!(12.25)));
    }

    #[test]
    fn list_bare_or_wrapped() {
        assert_eq!(unwrap_list(&json!([1, 2]), LIST_KEYS).len(), 2);
        assert_eq!(unwrap_list(&json!({"users": [1]}), LIST_KEYS).len(), 1);
        assert_eq!(unwrap_list(&json!({"data": {"items": [1, 2, 3]}}), LIST_KEYS).len(), 3);
        assert!(unwrap_list(&json!({"unexpected": [1]}), LIST_KEYS).is_empty());
        assert!(unwrap_list(&json!("text"), LIST_KEYS).is_empty());
    }

    #[test]
    fn object_list_drops_non_objects() {
        let list = unwrap_object_list(&json!([{"a": 1}, 2, "x", {"b": 2}]), LIST_KEYS);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn object_wrapped_or_bare() {
        let wrapped = unwrap_object(&json!({"data": {"total_users": 5}}), OBJECT_KEYS);
        assert_eq!(wrapped.get("total_users"), Some(&json!(5)));

        let bare = unwrap_object(&json!({"total_users": 7}), OBJECT_KEYS);
        assert_eq!(bare.get("total_users"), Some(&json!(7)));

        assert!(unwrap_object(&json!([1, 2]), OBJECT_KEYS).is_empty());
    }
}
