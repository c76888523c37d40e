//! Deserialization helpers for rows coming back from the remote store
//!
//! The REST backend may hand out numeric or string primary keys and sends
//! `null` for empty arrays and unset columns; the cache normalises both.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accept a string or integer id and store it as a string
pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Like [`id`] but for nullable foreign keys
pub fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Treat an explicit `null` as the type's default
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Missing or `null` flags that default to on
pub fn null_as_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

/// Tag lists may be ids of either shape
pub fn id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    values
        .into_iter()
        .filter(|v| !v.is_null())
        .map(|v| match v {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number tag id, got {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Row {
        #[serde(deserialize_with = "super::id")]
        id: String,
        #[serde(default, deserialize_with = "super::optional_id")]
        parent: Option<String>,
        #[serde(default, deserialize_with = "super::id_list")]
        tags: Vec<String>,
        #[serde(default, deserialize_with = "super::null_as_default")]
        price: f64,
        #[serde(default = "enabled", deserialize_with = "super::null_as_true")]
        active: bool,
    }

    fn enabled() -> bool {
        true
    }

    #[test]
    fn test_numeric_ids_become_strings() {
        let row: Row =
            serde_json::from_str(r#"{"id": 42, "parent": 7, "tags": [1, "spicy"]}"#).unwrap();
        assert_eq!(row.id, "42");
        assert_eq!(row.parent.as_deref(), Some("7"));
        assert_eq!(row.tags, vec!["1", "spicy"]);
    }

    #[test]
    fn test_nulls_fall_back_to_defaults() {
        let row: Row =
            serde_json::from_str(r#"{"id": "a", "parent": null, "tags": null, "price": null}"#)
                .unwrap();
        assert_eq!(row.parent, None);
        assert!(row.tags.is_empty());
        assert_eq!(row.price, 0.0);
    }

    #[test]
    fn test_null_flag_defaults_to_on() {
        let explicit: Row = serde_json::from_str(r#"{"id": "a", "active": null}"#).unwrap();
        assert!(explicit.active);
        let missing: Row = serde_json::from_str(r#"{"id": "a"}"#).unwrap();
        assert!(missing.active);
        let off: Row = serde_json::from_str(r#"{"id": "a", "active": false}"#).unwrap();
        assert!(!off.active);
    }

    #[test]
    fn test_rejects_object_ids() {
        assert!(serde_json::from_str::<Row>(r#"{"id": {"nested": true}}"#).is_err());
    }
}
