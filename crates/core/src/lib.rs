//! Core module - the game object graph, pure and synchronous
//!
//! This crate mirrors the server-authoritative game state on the client. It
//! has **no networking or async dependencies**; the client runtime feeds it
//! delta messages and the AI reads from it between deltas.
//!
//! # Module Structure
//!
//! - [`value`]: field values, including references to other game objects
//! - [`registry`]: static type-name -> factory table, one per game
//! - [`delta`]: delta patch parsing (sentinels, list lengths, references)
//! - [`graph`]: the arena of game objects and atomic delta application
//!
//! # Example
//!
//! ```
//! use joueur_core::{fields, GameObjectGraph, TypeRegistry, Value};
//! use serde_json::json;
//!
//! let registry = TypeRegistry::new("Duel", || fields([("turn", Value::Int(0))]))
//!     .with_type("Player", || fields([("name", Value::from(""))]));
//! let mut graph = GameObjectGraph::new(registry);
//!
//! graph
//!     .apply_delta(&json!({
//!         "turn": 1,
//!         "gameObjects": {"0": {"id": "0", "gameObjectName": "Player", "name": "Ada"}},
//!     }))
//!     .unwrap();
//!
//! assert_eq!(graph.game_field("turn"), Some(&Value::Int(1)));
//! assert_eq!(graph.get(&"0".into()).unwrap().str_field("name"), Some("Ada"));
//! ```

pub mod delta;
pub mod graph;
pub mod registry;
pub mod value;

pub use joueur_types as types;

pub use delta::{DeltaConstants, DeltaError, DeltaPatch, ObjectPatch, Patch};
pub use graph::{DeltaSummary, GameObject, GameObjectGraph};
pub use registry::{fields, Factory, Fields, TypeRegistry};
pub use value::Value;
