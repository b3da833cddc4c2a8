//! Field values stored on game objects.
//!
//! Values mirror the JSON shapes the server sends, with one addition: a JSON
//! object whose only key is `id` is a reference to another game object and is
//! kept as [`Value::Ref`] rather than a nested map. References are plain ids,
//! so cyclic object graphs (a player and its opponent) need no shared
//! ownership.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as Json};

use crate::types::GameObjectId;

/// A single field value inside the game object graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Ref(GameObjectId),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Decode a JSON value, turning `{"id": ..}` objects into references.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => number_value(n),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => match reference_id(map) {
                Some(id) => Value::Ref(id),
                None => Value::Map(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                ),
            },
        }
    }

    /// Encode for the wire; references become `{"id": ..}`.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Ref(id) => {
                let mut map = Map::with_capacity(1);
                map.insert("id".to_string(), Json::String(id.as_str().to_string()));
                Json::Object(map)
            }
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats; servers drop the fraction of whole numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<&GameObjectId> {
        match self {
            Value::Ref(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<GameObjectId> for Value {
    fn from(value: GameObjectId) -> Self {
        Value::Ref(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

fn number_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else {
        Value::Float(n.as_f64().unwrap_or_default())
    }
}

/// Id carried by a JSON id (string or non-negative integer).
pub(crate) fn id_from_json(json: &Json) -> Option<GameObjectId> {
    match json {
        Json::String(s) => Some(GameObjectId::from(s.as_str())),
        Json::Number(n) => n.as_u64().map(GameObjectId::from),
        _ => None,
    }
}

/// `Some(id)` when `map` is a game object reference: exactly one key, `id`.
pub(crate) fn reference_id(map: &Map<String, Json>) -> Option<GameObjectId> {
    if map.len() != 1 {
        return None;
    }
    map.get("id").and_then(id_from_json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_only_objects_become_references() {
        let v = Value::from_json(&json!({"id": "4"}));
        assert_eq!(v, Value::Ref(GameObjectId::from("4")));

        let v = Value::from_json(&json!({"id": 4}));
        assert_eq!(v.as_ref_id().map(|id| id.as_str()), Some("4"));

        // Two keys is an ordinary map, even if one of them is `id`.
        let v = Value::from_json(&json!({"id": "4", "name": "x"}));
        assert!(v.as_map().is_some());
    }

    #[test]
    fn references_encode_back_to_id_objects() {
        let v = Value::List(vec![Value::Ref("1".into()), Value::Int(3), Value::from("e4")]);
        assert_eq!(v.to_json(), json!([{"id": "1"}, 3, "e4"]));
    }

    #[test]
    fn numeric_accessors() {
        assert_eq!(Value::from_json(&json!(12)).as_i64(), Some(12));
        assert_eq!(Value::from_json(&json!(12)).as_f64(), Some(12.0));
        assert_eq!(Value::from_json(&json!(1.5)).as_f64(), Some(1.5));
        assert_eq!(Value::from_json(&json!(1.5)).as_i64(), None);
        assert!(Value::from_json(&json!(null)).is_null());
    }
}
