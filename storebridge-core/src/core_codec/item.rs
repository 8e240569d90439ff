use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::errors::{CodecError, CodecResult};

/// A single `(key, value)` pair, serialized as a two-element JSON array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item<V = String>(pub String, pub V);

impl<V> Item<V> {
    pub fn key(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> &V {
        &self.1
    }
}

/// Local write intent: inserts/overwrites plus deletions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub insert: Option<HashMap<String, String>>,
    pub delete: Option<HashSet<String>>,
}

impl UpdateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or overwrite) one insert
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Add one deletion
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.delete
            .get_or_insert_with(HashSet::new)
            .insert(key.into());
        self
    }

    /// True when there is nothing to insert and nothing to delete
    pub fn is_empty(&self) -> bool {
        self.insert.as_ref().map_or(true, HashMap::is_empty)
            && self.delete.as_ref().map_or(true, HashSet::is_empty)
    }
}

/// Wire form of an [`UpdateRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemsPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert: Option<Vec<Item>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Vec<String>>,
}

/// Wire form of a change notification. `None` marks a key that no longer exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEventPayload {
    pub items: Vec<Item<Option<String>>>,
}

/// Decoded change notification as delivered to local listeners
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsChangeEvent {
    pub items: HashMap<String, Option<String>>,
}

impl ItemsChangeEvent {
    /// Keys whose current value is the missing marker
    pub fn deleted_keys(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.as_str())
    }
}

/// Flatten a mapping into items, sorted by key so the wire form is stable
pub fn encode<V: Clone>(mapping: &HashMap<String, V>) -> Vec<Item<V>> {
    let mut items: Vec<Item<V>> = mapping
        .iter()
        .map(|(k, v)| Item(k.clone(), v.clone()))
        .collect();
    items.sort_by(|a, b| a.0.cmp(&b.0));
    items
}

/// Rebuild a mapping; on duplicate keys the last occurrence wins
pub fn decode<V>(items: Vec<Item<V>>) -> HashMap<String, V> {
    let mut mapping = HashMap::with_capacity(items.len());
    for Item(key, value) in items {
        mapping.insert(key, value);
    }
    mapping
}

pub fn encode_update(request: &UpdateRequest) -> UpdateItemsPayload {
    let delete = request.delete.as_ref().map(|keys| {
        let mut keys: Vec<String> = keys.iter().cloned().collect();
        keys.sort();
        keys
    });

    UpdateItemsPayload {
        insert: request.insert.as_ref().map(encode),
        delete,
    }
}

pub fn decode_update(payload: UpdateItemsPayload) -> UpdateRequest {
    UpdateRequest {
        insert: payload.insert.map(decode),
        delete: payload.delete.map(|keys| keys.into_iter().collect()),
    }
}

fn from_value<T: DeserializeOwned>(value: Value, what: &str) -> CodecResult<T> {
    serde_json::from_value(value).map_err(|e| CodecError::Malformed(format!("{}: {}", what, e)))
}

/// Validate a `getItems` response
pub fn decode_snapshot(value: Value) -> CodecResult<HashMap<String, String>> {
    if !value.is_array() {
        return Err(CodecError::Malformed("snapshot is not an array".to_string()));
    }
    let items: Vec<Item> = from_value(value, "snapshot")?;
    Ok(decode(items))
}

/// Validate an `updateItems` argument
pub fn decode_update_payload(value: Value) -> CodecResult<UpdateItemsPayload> {
    if !value.is_object() {
        return Err(CodecError::Malformed(
            "update request is not an object".to_string(),
        ));
    }
    from_value(value, "update request")
}

/// Validate an `onDidChangeItems` payload
pub fn decode_change_event(value: Value) -> CodecResult<ItemsChangeEvent> {
    let items = match value {
        Value::Object(mut fields) => fields.remove("items"),
        _ => None,
    };

    match items {
        Some(items @ Value::Array(_)) => {
            let items: Vec<Item<Option<String>>> = from_value(items, "change event")?;
            Ok(ItemsChangeEvent {
                items: decode(items),
            })
        }
        _ => Err(CodecError::Malformed(
            "change event items is not an array".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_item_wire_shape() {
        let item = Item("color".to_string(), "blue".to_string());
        assert_eq!(serde_json::to_value(&item).unwrap(), json!(["color", "blue"]));

        let missing: Item<Option<String>> = Item("gone".to_string(), None);
        assert_eq!(serde_json::to_value(&missing).unwrap(), json!(["gone", null]));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let items = vec![
            Item("a".to_string(), "1".to_string()),
            Item("b".to_string(), "2".to_string()),
            Item("a".to_string(), "3".to_string()),
        ];
        let mapping = decode(items);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["a"], "3");
    }

    #[test]
    fn test_encode_is_sorted() {
        let mapping: HashMap<String, String> = [("z", "1"), ("a", "2"), ("m", "3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let keys: Vec<String> = encode(&mapping).into_iter().map(|i| i.0).collect();
        assert_eq!(keys, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_empty_update_request() {
        assert!(UpdateRequest::new().is_empty());
        assert!(UpdateRequest {
            insert: Some(HashMap::new()),
            delete: Some(HashSet::new()),
        }
        .is_empty());
        assert!(!UpdateRequest::new().delete("k").is_empty());
        assert!(!UpdateRequest::new().insert("k", "v").is_empty());
    }

    #[test]
    fn test_update_payload_omits_absent_parts() {
        let request = UpdateRequest::new().insert("k", "v");
        let wire = serde_json::to_value(encode_update(&request)).unwrap();
        assert_eq!(wire, json!({ "insert": [["k", "v"]] }));

        let request = UpdateRequest::new().delete("b").delete("a");
        let wire = serde_json::to_value(encode_update(&request)).unwrap();
        assert_eq!(wire, json!({ "delete": ["a", "b"] }));
    }

    #[test]
    fn test_update_payload_roundtrip() {
        let request = UpdateRequest::new().insert("k", "v").delete("old");
        let wire = serde_json::to_value(encode_update(&request)).unwrap();
        let decoded = decode_update(decode_update_payload(wire).unwrap());
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_update_payload_rejects_bad_shapes() {
        assert!(decode_update_payload(json!([["k", "v"]])).is_err());
        assert!(decode_update_payload(json!({ "insert": [["k"]] })).is_err());
        assert!(decode_update_payload(json!({ "delete": [1, 2] })).is_err());
        assert!(decode_update_payload(json!({})).is_ok());
    }

    #[test]
    fn test_snapshot_validation() {
        let mapping = decode_snapshot(json!([["a", "1"], ["b", "2"]])).unwrap();
        assert_eq!(mapping["b"], "2");

        assert!(decode_snapshot(json!({ "a": "1" })).is_err());
        assert!(decode_snapshot(json!([["a", 1]])).is_err());
        assert!(decode_snapshot(json!([["a", "1", "extra"]])).is_err());
        assert!(decode_snapshot(json!([[null, "1"]])).is_err());
    }

    #[test]
    fn test_change_event_carries_missing_marker() {
        let event = decode_change_event(json!({ "items": [["a", "1"], ["gone", null]] })).unwrap();
        assert_eq!(event.items["a"], Some("1".to_string()));
        assert_eq!(event.items["gone"], None);
        assert_eq!(event.deleted_keys().collect::<Vec<_>>(), vec!["gone"]);
    }

    #[test]
    fn test_change_event_rejects_non_array() {
        assert!(decode_change_event(json!({ "items": "nope" })).is_err());
        assert!(decode_change_event(json!({ "items": { "a": "1" } })).is_err());
        assert!(decode_change_event(json!({})).is_err());
        assert!(decode_change_event(json!(42)).is_err());
        assert!(decode_change_event(Value::Null).is_err());
    }

    proptest! {
        #[test]
        fn prop_mapping_roundtrip(mapping in prop::collection::hash_map(".*", ".*", 0..32)) {
            let wire = serde_json::to_value(encode(&mapping)).unwrap();
            prop_assert_eq!(decode_snapshot(wire).unwrap(), mapping);
        }

        #[test]
        fn prop_nullable_roundtrip(
            mapping in prop::collection::hash_map("[a-z]{1,8}", prop::option::of(".*"), 0..16)
        ) {
            let payload = ChangeEventPayload { items: encode(&mapping) };
            let wire = serde_json::to_value(&payload).unwrap();
            prop_assert_eq!(decode_change_event(wire).unwrap().items, mapping);
        }
    }
}
