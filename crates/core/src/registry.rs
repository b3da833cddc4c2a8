//! Static registry of the entity types a game can instantiate.
//!
//! Each game registers its type names once at startup together with a
//! factory producing the default fields of a fresh instance. The graph only
//! ever creates objects through this table, so an unknown type name in a
//! delta is rejected instead of guessed at.

use std::collections::BTreeMap;

use crate::graph::GameObject;
use crate::types::GameObjectId;
use crate::value::Value;

/// Field name -> value mapping of one record.
pub type Fields = BTreeMap<String, Value>;

/// Produces the default fields of a new instance.
pub type Factory = fn() -> Fields;

/// Build a [`Fields`] map from literal pairs.
pub fn fields<I>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Type name -> factory table for one game.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    game_name: String,
    game_factory: Factory,
    types: BTreeMap<String, Factory>,
}

impl TypeRegistry {
    /// Registry for `game_name`, whose root record starts from `game_factory`.
    pub fn new(game_name: impl Into<String>, game_factory: Factory) -> Self {
        Self {
            game_name: game_name.into(),
            game_factory,
            types: BTreeMap::new(),
        }
    }

    /// Register a game object type.
    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>, factory: Factory) -> Self {
        self.types.insert(type_name.into(), factory);
        self
    }

    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub(crate) fn game_defaults(&self) -> Fields {
        (self.game_factory)()
    }

    /// Fresh instance of `type_name`, or `None` if the type is not registered.
    pub fn instantiate(&self, id: GameObjectId, type_name: &str) -> Option<GameObject> {
        let factory = self.types.get(type_name)?;
        Some(GameObject::new(id, type_name, factory()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_defaults() -> Fields {
        fields([("hp", Value::Int(10)), ("owner", Value::Null)])
    }

    #[test]
    fn instantiates_registered_types_only() {
        let registry = TypeRegistry::new("Skirmish", Fields::new).with_type("Unit", unit_defaults);

        let unit = registry.instantiate("3".into(), "Unit").unwrap();
        assert_eq!(unit.type_name(), "Unit");
        assert_eq!(unit.field("hp"), Some(&Value::Int(10)));

        assert!(registry.instantiate("4".into(), "Tower").is_none());
        assert_eq!(registry.type_names().collect::<Vec<_>>(), vec!["Unit"]);
    }
}
