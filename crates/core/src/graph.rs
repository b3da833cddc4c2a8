//! Game object graph - the client's mirror of server-side state
//!
//! All instances live in one map keyed by id. Cross references are ids, never
//! ownership, so cycles between objects cost nothing and a removed object
//! simply stops resolving.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as Json;
use tracing::debug;

use crate::delta::{apply_entry, DeltaConstants, DeltaError, DeltaPatch, ObjectPatch};
use crate::registry::{Fields, TypeRegistry};
use crate::types::GameObjectId;
use crate::value::Value;

/// One server-owned entity.
#[derive(Debug, Clone, PartialEq)]
pub struct GameObject {
    id: GameObjectId,
    type_name: String,
    fields: Fields,
}

impl GameObject {
    pub fn new(id: GameObjectId, type_name: impl Into<String>, fields: Fields) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn id(&self) -> &GameObjectId {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.field(name).and_then(Value::as_bool)
    }

    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(Value::as_i64)
    }

    pub fn f64_field(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(Value::as_f64)
    }

    pub fn ref_field(&self, name: &str) -> Option<&GameObjectId> {
        self.field(name).and_then(Value::as_ref_id)
    }

    pub fn list_field(&self, name: &str) -> Option<&[Value]> {
        self.field(name).and_then(Value::as_list)
    }
}

/// Counts reported by one delta application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaSummary {
    pub game_fields: usize,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Mutable mirror of the game state.
#[derive(Debug, Clone)]
pub struct GameObjectGraph {
    registry: TypeRegistry,
    constants: DeltaConstants,
    game: Fields,
    objects: BTreeMap<GameObjectId, GameObject>,
    removed: BTreeSet<GameObjectId>,
    deltas_applied: u64,
}

impl GameObjectGraph {
    pub fn new(registry: TypeRegistry) -> Self {
        let game = registry.game_defaults();
        Self {
            registry,
            constants: DeltaConstants::default(),
            game,
            objects: BTreeMap::new(),
            removed: BTreeSet::new(),
            deltas_applied: 0,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn constants(&self) -> &DeltaConstants {
        &self.constants
    }

    pub fn set_constants(&mut self, constants: DeltaConstants) {
        self.constants = constants;
    }

    /// Parse and apply a delta message body.
    ///
    /// The delta is applied entirely or not at all.
    pub fn apply_delta(&mut self, delta: &Json) -> Result<DeltaSummary, DeltaError> {
        let patch = DeltaPatch::parse(delta, &self.constants)?;
        self.apply(&patch)
    }

    /// Validate `patch` against the current graph, then commit it.
    pub fn apply(&mut self, patch: &DeltaPatch) -> Result<DeltaSummary, DeltaError> {
        self.validate(patch)?;
        let summary = self.commit(patch);
        self.deltas_applied += 1;
        debug!(
            created = summary.created,
            updated = summary.updated,
            removed = summary.removed,
            game_fields = summary.game_fields,
            "applied delta"
        );
        Ok(summary)
    }

    fn validate(&self, patch: &DeltaPatch) -> Result<(), DeltaError> {
        for (id, object) in &patch.objects {
            let ObjectPatch::Upsert { type_name, .. } = object else {
                continue;
            };

            if let Some(existing) = self.objects.get(id) {
                if let Some(declared) = type_name {
                    if declared != existing.type_name() {
                        return Err(DeltaError::TypeMismatch {
                            id: id.clone(),
                            existing: existing.type_name().to_string(),
                            declared: declared.clone(),
                        });
                    }
                }
                continue;
            }

            if self.removed.contains(id) {
                return Err(DeltaError::ReusedId { id: id.clone() });
            }
            let Some(type_name) = type_name else {
                return Err(DeltaError::MissingType { id: id.clone() });
            };
            if !self.registry.contains(type_name) {
                return Err(DeltaError::UnknownType {
                    id: id.clone(),
                    type_name: type_name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Infallible once `validate` accepted the patch.
    fn commit(&mut self, patch: &DeltaPatch) -> DeltaSummary {
        let mut summary = DeltaSummary::default();

        for (id, object) in &patch.objects {
            match object {
                ObjectPatch::Remove => {
                    if self.objects.remove(id).is_some() {
                        self.removed.insert(id.clone());
                        summary.removed += 1;
                    }
                }
                ObjectPatch::Upsert { type_name, fields } => {
                    if self.objects.contains_key(id) {
                        summary.updated += 1;
                    } else {
                        let created = type_name
                            .as_deref()
                            .and_then(|name| self.registry.instantiate(id.clone(), name));
                        let Some(created) = created else {
                            continue;
                        };
                        self.objects.insert(id.clone(), created);
                        summary.created += 1;
                    }
                    let Some(target) = self.objects.get_mut(id) else {
                        continue;
                    };
                    for (key, field) in fields {
                        apply_entry(&mut target.fields, key, field);
                    }
                }
            }
        }

        for (key, field) in &patch.game {
            apply_entry(&mut self.game, key, field);
            summary.game_fields += 1;
        }

        summary
    }

    /// Root game record.
    pub fn game(&self) -> &Fields {
        &self.game
    }

    pub fn game_field(&self, name: &str) -> Option<&Value> {
        self.game.get(name)
    }

    /// `None` means the object does not exist (never created, or destroyed).
    pub fn get(&self, id: &GameObjectId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &GameObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn is_removed(&self, id: &GameObjectId) -> bool {
        self.removed.contains(id)
    }

    /// Follow a reference value.
    pub fn resolve(&self, value: &Value) -> Option<&GameObject> {
        value.as_ref_id().and_then(|id| self.get(id))
    }

    pub fn objects(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.values()
    }

    pub fn objects_of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a GameObject> {
        self.objects
            .values()
            .filter(move |object| object.type_name() == type_name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn deltas_applied(&self) -> u64 {
        self.deltas_applied
    }

    /// Drop every instance at session end.
    pub fn clear(&mut self) {
        self.removed.extend(std::mem::take(&mut self.objects).into_keys());
        self.game = self.registry.game_defaults();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fields;
    use serde_json::json;

    fn registry() -> TypeRegistry {
        TypeRegistry::new("Duel", || {
            fields([
                ("players", Value::List(Vec::new())),
                ("turn", Value::Int(0)),
            ])
        })
        .with_type("Player", || {
            fields([
                ("name", Value::from("")),
                ("opponent", Value::Null),
                ("won", Value::Bool(false)),
            ])
        })
        .with_type("Piece", || fields([("square", Value::Null)]))
    }

    fn started() -> GameObjectGraph {
        let mut graph = GameObjectGraph::new(registry());
        graph
            .apply_delta(&json!({
                "gameObjects": {
                    "0": {"id": "0", "gameObjectName": "Player", "name": "white", "opponent": {"id": "1"}},
                    "1": {"id": "1", "gameObjectName": "Player", "name": "black", "opponent": {"id": "0"}},
                    "2": {"id": "2", "gameObjectName": "Piece", "square": "e2"},
                },
                "players": {"&LEN": 2, "0": {"id": "0"}, "1": {"id": "1"}},
            }))
            .unwrap();
        graph
    }

    #[test]
    fn creates_objects_with_defaults_and_cycles() {
        let graph = started();
        assert_eq!(graph.len(), 3);

        let white = graph.get(&"0".into()).unwrap();
        assert_eq!(white.type_name(), "Player");
        assert_eq!(white.str_field("name"), Some("white"));
        assert_eq!(white.bool_field("won"), Some(false));

        let black = graph.resolve(white.field("opponent").unwrap()).unwrap();
        assert_eq!(black.str_field("name"), Some("black"));
        let back = graph.resolve(black.field("opponent").unwrap()).unwrap();
        assert_eq!(back.id(), white.id());

        let players = graph.game_field("players").unwrap().as_list().unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(graph.objects_of_type("Piece").count(), 1);
    }

    #[test]
    fn field_removal_keeps_owner() {
        let mut graph = started();
        graph
            .apply_delta(&json!({"gameObjects": {"2": {"square": "&RM"}}}))
            .unwrap();

        let piece = graph.get(&"2".into()).unwrap();
        assert!(piece.field("square").is_none());
    }

    #[test]
    fn object_removal_is_final() {
        let mut graph = started();
        let summary = graph.apply_delta(&json!({"gameObjects": {"2": "&RM"}})).unwrap();
        assert_eq!(summary.removed, 1);

        let id = GameObjectId::from("2");
        assert!(graph.get(&id).is_none());
        assert!(graph.is_removed(&id));
        assert!(graph.resolve(&Value::Ref(id.clone())).is_none());

        let err = graph
            .apply_delta(&json!({"gameObjects": {"2": {"gameObjectName": "Piece"}}}))
            .unwrap_err();
        assert_eq!(err, DeltaError::ReusedId { id: id.clone() });
        assert!(graph.get(&id).is_none());
    }

    #[test]
    fn rejected_delta_changes_nothing() {
        let mut graph = started();
        let before = graph.clone();

        let err = graph
            .apply_delta(&json!({
                "turn": 9,
                "gameObjects": {
                    "0": {"name": "renamed"},
                    "7": {"gameObjectName": "Dragon"},
                },
            }))
            .unwrap_err();
        assert!(matches!(err, DeltaError::UnknownType { .. }));

        assert_eq!(graph.game(), before.game());
        assert_eq!(
            graph.get(&"0".into()).unwrap().str_field("name"),
            Some("white")
        );
        assert_eq!(graph.deltas_applied(), before.deltas_applied());

        let err = graph
            .apply_delta(&json!({"gameObjects": {"8": {"square": "a1"}}}))
            .unwrap_err();
        assert!(matches!(err, DeltaError::MissingType { .. }));

        let err = graph
            .apply_delta(&json!({"gameObjects": {"2": {"gameObjectName": "Player"}}}))
            .unwrap_err();
        assert!(matches!(err, DeltaError::TypeMismatch { .. }));
    }

    #[test]
    fn replaying_a_delta_is_harmless() {
        let delta = json!({
            "turn": 3,
            "players": {"&LEN": 1},
            "gameObjects": {
                "0": {"won": true},
                "2": "&RM",
            },
        });

        let mut once = started();
        once.apply_delta(&delta).unwrap();
        let mut twice = started();
        twice.apply_delta(&delta).unwrap();
        twice.apply_delta(&delta).unwrap();

        assert_eq!(once.game(), twice.game());
        assert_eq!(
            once.objects().collect::<Vec<_>>(),
            twice.objects().collect::<Vec<_>>()
        );
    }

    #[test]
    fn sequential_deltas_match_cumulative_delta() {
        let steps = [
            json!({"turn": 1, "gameObjects": {"2": {"square": "e4"}}}),
            json!({"turn": 2, "gameObjects": {"0": {"won": true}, "3": {"gameObjectName": "Piece", "square": "d5"}}}),
            json!({"gameObjects": {"3": {"square": "&RM"}, "1": {"name": "black (resigned)"}}}),
        ];
        let cumulative = json!({
            "turn": 2,
            "gameObjects": {
                "0": {"won": true},
                "1": {"name": "black (resigned)"},
                "2": {"square": "e4"},
                "3": {"gameObjectName": "Piece", "square": "&RM"},
            },
        });

        let mut sequential = started();
        for step in &steps {
            sequential.apply_delta(step).unwrap();
        }
        let mut merged = started();
        merged.apply_delta(&cumulative).unwrap();

        assert_eq!(sequential.game(), merged.game());
        assert_eq!(
            sequential.objects().collect::<Vec<_>>(),
            merged.objects().collect::<Vec<_>>()
        );
    }

    #[test]
    fn clear_forgets_everything() {
        let mut graph = started();
        graph.clear();
        assert!(graph.is_empty());
        assert!(graph.is_removed(&"0".into()));
        assert_eq!(graph.game_field("turn"), Some(&Value::Int(0)));
    }
}
