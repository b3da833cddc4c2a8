//! Chess type registry and typed, read-only views over the graph.

use joueur_core::{fields, Fields, GameObject, GameObjectGraph, TypeRegistry, Value};
use joueur_types::GameObjectId;

/// Canonical game name the server reports in `named`.
pub const GAME_NAME: &str = "Chess";

pub const PLAYER: &str = "Player";
pub const GAME_OBJECT: &str = "GameObject";

/// Every type the Chess server may create.
pub fn registry() -> TypeRegistry {
    TypeRegistry::new(GAME_NAME, game_defaults)
        .with_type(PLAYER, player_defaults)
        .with_type(GAME_OBJECT, object_defaults)
}

fn game_defaults() -> Fields {
    fields([
        ("fen", Value::from("")),
        ("history", Value::List(Vec::new())),
        ("players", Value::List(Vec::new())),
        ("session", Value::from("")),
    ])
}

fn object_defaults() -> Fields {
    fields([("logs", Value::List(Vec::new()))])
}

fn player_defaults() -> Fields {
    let mut player = object_defaults();
    player.extend(fields([
        ("clientType", Value::from("")),
        ("color", Value::from("")),
        ("lost", Value::Bool(false)),
        ("name", Value::from("")),
        ("opponent", Value::Null),
        ("reasonLost", Value::from("")),
        ("reasonWon", Value::from("")),
        ("timeRemaining", Value::Float(0.0)),
        ("won", Value::Bool(false)),
    ]));
    player
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "white" | "w" => Some(Color::White),
            "black" | "b" => Some(Color::Black),
            _ => None,
        }
    }

    /// Side-to-move letter used in FEN.
    pub fn fen_side(self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }
}

/// The root Chess record.
#[derive(Debug, Clone, Copy)]
pub struct ChessGame<'a> {
    graph: &'a GameObjectGraph,
}

impl<'a> ChessGame<'a> {
    pub fn new(graph: &'a GameObjectGraph) -> Self {
        Self { graph }
    }

    /// Current board in Forsyth-Edwards Notation.
    pub fn fen(&self) -> &'a str {
        self.graph
            .game_field("fen")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Moves so far, oldest first.
    pub fn history(&self) -> Vec<&'a str> {
        self.list("history").filter_map(Value::as_str).collect()
    }

    pub fn players(&self) -> Vec<PlayerView<'a>> {
        self.list("players")
            .filter_map(|v| self.graph.resolve(v))
            .map(|object| PlayerView::new(self.graph, object))
            .collect()
    }

    pub fn session(&self) -> &'a str {
        self.graph
            .game_field("session")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn player(&self, id: &GameObjectId) -> Option<PlayerView<'a>> {
        let object = self.graph.get(id)?;
        (object.type_name() == PLAYER).then(|| PlayerView::new(self.graph, object))
    }

    fn list(&self, name: &str) -> impl Iterator<Item = &'a Value> {
        self.graph
            .game_field(name)
            .and_then(Value::as_list)
            .unwrap_or(&[])
            .iter()
    }
}

/// One Chess player.
#[derive(Debug, Clone, Copy)]
pub struct PlayerView<'a> {
    graph: &'a GameObjectGraph,
    object: &'a GameObject,
}

impl<'a> PlayerView<'a> {
    fn new(graph: &'a GameObjectGraph, object: &'a GameObject) -> Self {
        Self { graph, object }
    }

    pub fn id(&self) -> &'a GameObjectId {
        self.object.id()
    }

    pub fn name(&self) -> &'a str {
        self.object.str_field("name").unwrap_or("")
    }

    pub fn client_type(&self) -> &'a str {
        self.object.str_field("clientType").unwrap_or("")
    }

    pub fn color(&self) -> Option<Color> {
        self.object.str_field("color").and_then(Color::parse)
    }

    pub fn opponent(&self) -> Option<PlayerView<'a>> {
        let id = self.object.ref_field("opponent")?;
        self.graph.get(id).map(|object| PlayerView::new(self.graph, object))
    }

    pub fn won(&self) -> bool {
        self.object.bool_field("won").unwrap_or(false)
    }

    pub fn lost(&self) -> bool {
        self.object.bool_field("lost").unwrap_or(false)
    }

    pub fn reason_won(&self) -> &'a str {
        self.object.str_field("reasonWon").unwrap_or("")
    }

    pub fn reason_lost(&self) -> &'a str {
        self.object.str_field("reasonLost").unwrap_or("")
    }

    /// Seconds left on this player's clock.
    pub fn time_remaining(&self) -> f64 {
        self.object.f64_field("timeRemaining").unwrap_or(0.0)
    }

    pub fn logs(&self) -> Vec<&'a str> {
        self.object
            .list_field("logs")
            .unwrap_or(&[])
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }
}
