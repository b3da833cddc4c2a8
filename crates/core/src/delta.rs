//! Delta patches - partial state updates sent by the server
//!
//! A delta mirrors the shape of the game state but only carries what changed.
//! Three encodings sit on top of plain JSON:
//!
//! - the removed sentinel (`&RM` by default) as a value deletes the entry
//! - an object carrying the list-length key (`&LEN` by default) is a list
//!   patch: the new length plus index-keyed element patches
//! - an object whose only key is `id` is a game object reference
//!
//! The root key `gameObjects` maps object ids to per-object patches. A new
//! object's patch names its type in `gameObjectName`.
//!
//! Parsing produces a [`DeltaPatch`] without touching any state; the graph
//! validates it against its current contents and only then commits, so a
//! rejected delta never leaves a half-applied graph behind.

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::types::{GameObjectId, DELTA_LIST_LENGTH, DELTA_REMOVED};
use crate::value::{id_from_json, reference_id, Value};

/// Root key holding per-object patches.
pub const GAME_OBJECTS_KEY: &str = "gameObjects";

/// Key naming the type of a newly created game object.
pub const TYPE_NAME_KEY: &str = "gameObjectName";

/// Sentinels negotiated in the `lobbied` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaConstants {
    pub removed: String,
    pub list_length: String,
}

impl Default for DeltaConstants {
    fn default() -> Self {
        Self {
            removed: DELTA_REMOVED.to_string(),
            list_length: DELTA_LIST_LENGTH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeltaError {
    #[error("malformed delta at {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("game object {id} has unknown type {type_name:?}")]
    UnknownType { id: GameObjectId, type_name: String },
    #[error("new game object {id} does not declare its type")]
    MissingType { id: GameObjectId },
    #[error("game object {id} was removed and cannot be recreated")]
    ReusedId { id: GameObjectId },
    #[error("game object {id} is a {existing}, delta declares {declared}")]
    TypeMismatch {
        id: GameObjectId,
        existing: String,
        declared: String,
    },
}

fn malformed(path: &str, reason: impl Into<String>) -> DeltaError {
    DeltaError::Malformed {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Change to a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Delete the entry (a list element becomes `Null`).
    Remove,
    /// Replace the value outright.
    Set(Value),
    /// Merge into a map, key by key.
    Merge(BTreeMap<String, Patch>),
    /// Resize a list, then patch individual elements.
    List {
        len: usize,
        items: BTreeMap<usize, Patch>,
    },
}

/// Change to one game object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectPatch {
    Remove,
    Upsert {
        type_name: Option<String>,
        fields: BTreeMap<String, Patch>,
    },
}

/// A parsed, not yet applied, delta.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeltaPatch {
    pub game: BTreeMap<String, Patch>,
    pub objects: BTreeMap<GameObjectId, ObjectPatch>,
}

impl DeltaPatch {
    /// Parse the root of a delta message.
    pub fn parse(root: &Json, constants: &DeltaConstants) -> Result<Self, DeltaError> {
        let Json::Object(root) = root else {
            return Err(malformed("game", "delta root must be an object"));
        };

        let mut patch = DeltaPatch::default();
        for (key, value) in root {
            if key == GAME_OBJECTS_KEY {
                patch.objects = parse_objects(value, constants)?;
            } else {
                let path = format!("game.{key}");
                patch.game.insert(key.clone(), parse_patch(value, constants, &path)?);
            }
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.game.is_empty() && self.objects.is_empty()
    }
}

fn parse_objects(
    value: &Json,
    constants: &DeltaConstants,
) -> Result<BTreeMap<GameObjectId, ObjectPatch>, DeltaError> {
    let Json::Object(entries) = value else {
        return Err(malformed(GAME_OBJECTS_KEY, "expected an object keyed by id"));
    };

    let mut objects = BTreeMap::new();
    for (id, entry) in entries {
        let path = format!("{GAME_OBJECTS_KEY}.{id}");
        let id = GameObjectId::from(id.as_str());
        let patch = match entry {
            Json::String(s) if *s == constants.removed => ObjectPatch::Remove,
            Json::Object(map) => parse_object(&id, map, constants, &path)?,
            _ => return Err(malformed(&path, "expected an object patch or the removed sentinel")),
        };
        objects.insert(id, patch);
    }
    Ok(objects)
}

fn parse_object(
    id: &GameObjectId,
    map: &Map<String, Json>,
    constants: &DeltaConstants,
    path: &str,
) -> Result<ObjectPatch, DeltaError> {
    let mut type_name = None;
    let mut fields = BTreeMap::new();

    for (key, value) in map {
        match key.as_str() {
            TYPE_NAME_KEY => match value {
                Json::String(name) => type_name = Some(name.clone()),
                _ => return Err(malformed(path, "gameObjectName must be a string")),
            },
            "id" => {
                if id_from_json(value).as_ref() != Some(id) {
                    return Err(malformed(path, "id field does not match its key"));
                }
            }
            _ => {
                let field_path = format!("{path}.{key}");
                fields.insert(key.clone(), parse_patch(value, constants, &field_path)?);
            }
        }
    }

    Ok(ObjectPatch::Upsert { type_name, fields })
}

fn parse_patch(value: &Json, constants: &DeltaConstants, path: &str) -> Result<Patch, DeltaError> {
    match value {
        Json::String(s) if *s == constants.removed => Ok(Patch::Remove),
        Json::Object(map) => {
            if map.contains_key(&constants.list_length) {
                return parse_list(map, constants, path);
            }
            if let Some(id) = reference_id(map) {
                return Ok(Patch::Set(Value::Ref(id)));
            }
            let mut children = BTreeMap::new();
            for (key, child) in map {
                let child_path = format!("{path}.{key}");
                children.insert(key.clone(), parse_patch(child, constants, &child_path)?);
            }
            Ok(Patch::Merge(children))
        }
        other => Ok(Patch::Set(Value::from_json(other))),
    }
}

fn parse_list(
    map: &Map<String, Json>,
    constants: &DeltaConstants,
    path: &str,
) -> Result<Patch, DeltaError> {
    let len = map
        .get(&constants.list_length)
        .and_then(Json::as_u64)
        .ok_or_else(|| malformed(path, "list length must be a non-negative integer"))?;
    let len = usize::try_from(len).map_err(|_| malformed(path, "list length out of range"))?;

    let mut items = BTreeMap::new();
    for (key, value) in map {
        if *key == constants.list_length {
            continue;
        }
        let index: usize = key
            .parse()
            .map_err(|_| malformed(path, format!("list index {key:?} is not a number")))?;
        if index >= len {
            return Err(malformed(
                path,
                format!("list index {index} is past the new length {len}"),
            ));
        }
        let item_path = format!("{path}[{index}]");
        items.insert(index, parse_patch(value, constants, &item_path)?);
    }

    Ok(Patch::List { len, items })
}

/// Apply `patch` to the entry `key` of `fields`.
pub(crate) fn apply_entry(fields: &mut BTreeMap<String, Value>, key: &str, patch: &Patch) {
    match patch {
        Patch::Remove => {
            fields.remove(key);
        }
        Patch::Set(value) => {
            fields.insert(key.to_string(), value.clone());
        }
        Patch::Merge(_) | Patch::List { .. } => {
            let slot = fields.entry(key.to_string()).or_default();
            apply_value(slot, patch);
        }
    }
}

/// Apply `patch` to a value in place. Never fails: a structural patch on a
/// value of another shape replaces it with a fresh container.
pub(crate) fn apply_value(slot: &mut Value, patch: &Patch) {
    match patch {
        Patch::Remove => *slot = Value::Null,
        Patch::Set(value) => *slot = value.clone(),
        Patch::Merge(children) => {
            if let Value::List(items) = slot {
                for (key, child) in children {
                    if let Some(item) = key.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                        apply_value(item, child);
                    }
                }
                return;
            }
            if !matches!(slot, Value::Map(_)) {
                *slot = Value::Map(BTreeMap::new());
            }
            if let Value::Map(map) = slot {
                for (key, child) in children {
                    apply_entry(map, key, child);
                }
            }
        }
        Patch::List { len, items } => {
            if !matches!(slot, Value::List(_)) {
                *slot = Value::List(Vec::with_capacity(*len));
            }
            if let Value::List(list) = slot {
                list.resize(*len, Value::Null);
                for (index, child) in items {
                    if let Some(item) = list.get_mut(*index) {
                        apply_value(item, child);
                    }
                }
            }
        }
    }
}
