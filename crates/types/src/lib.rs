//! Core types module - shared vocabulary for the session protocol
//!
//! This module defines the identifiers, states, and constants used by every
//! other crate in the workspace. All types are plain data with no external
//! dependencies, so the game object graph, the client runtime, and the game
//! bindings can agree on them without pulling in networking or serde.
//!
//! # Protocol Constants
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `DEFAULT_HOST` | `127.0.0.1` | Game server host |
//! | `DEFAULT_PORT` | 3000 | Game server port |
//! | `FRAME_TERMINATOR` | `0x04` | Byte that ends every message on the wire |
//! | `DELTA_REMOVED` | `&RM` | Sentinel value meaning "this entry was deleted" |
//! | `DELTA_LIST_LENGTH` | `&LEN` | Key carrying the new length of a list patch |
//! | `DEFAULT_REQUESTED_SESSION` | `*` | Ask the server for any open session |
//!
//! # Session Lifecycle
//!
//! ```text
//! Connecting -> Named -> Lobbied -> Started -> Over
//!      \__________\_________\_________\______-> Errored
//! ```
//!
//! # Examples
//!
//! ```
//! use joueur_types::{GameObjectId, SessionState};
//!
//! let id = GameObjectId::from("12");
//! assert_eq!(id.as_str(), "12");
//!
//! assert!(SessionState::Connecting.can_advance_to(SessionState::Named));
//! assert!(!SessionState::Started.can_advance_to(SessionState::Named));
//! assert!(SessionState::Lobbied.can_advance_to(SessionState::Errored));
//! ```

use std::fmt;

/// Default game server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default game server port
pub const DEFAULT_PORT: u16 = 3000;

/// End-of-transmission byte terminating every framed message
pub const FRAME_TERMINATOR: u8 = 0x04;

/// Default value that marks a deleted field, map entry, or game object
pub const DELTA_REMOVED: &str = "&RM";

/// Default key that carries the new length of a list inside a delta
pub const DELTA_LIST_LENGTH: &str = "&LEN";

/// Session name asking the server to place us in any open session
pub const DEFAULT_REQUESTED_SESSION: &str = "*";

/// Client type reported to the server in the `play` message
pub const CLIENT_TYPE: &str = "Rust";

/// Server-assigned identifier of a game object.
///
/// Ids arrive as strings on the wire (integers are normalized to their decimal
/// form). An id is unique within a session and never reused once the object
/// it named is removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameObjectId(String);

impl GameObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GameObjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GameObjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for GameObjectId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for GameObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of one game session.
///
/// States only move forward; `Errored` is reachable from anywhere and, like
/// `Over`, is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    Named,
    Lobbied,
    Started,
    Over,
    Errored,
}

impl SessionState {
    /// Whether `next` is a legal transition from `self`.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == SessionState::Errored || next > self
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Over | SessionState::Errored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Named => "named",
            SessionState::Lobbied => "lobbied",
            SessionState::Started => "started",
            SessionState::Over => "over",
            SessionState::Errored => "errored",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process exit codes shared with the other clients of the game framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    None = 0,
    InvalidArgs = 20,
    CouldNotConnect = 21,
    DisconnectedUnexpectedly = 22,
    CannotReadSocket = 23,
    DeltaMergeFailure = 24,
    UnknownEventFromServer = 26,
    ServerTimeout = 27,
    FatalEvent = 28,
    GameNotFound = 29,
    MalformedJson = 30,
    AiErrored = 42,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        use SessionState::*;

        assert!(Connecting.can_advance_to(Named));
        assert!(Named.can_advance_to(Lobbied));
        assert!(Lobbied.can_advance_to(Started));
        assert!(Started.can_advance_to(Over));

        assert!(!Named.can_advance_to(Connecting));
        assert!(!Started.can_advance_to(Started));
        assert!(!Over.can_advance_to(Errored));
        assert!(!Errored.can_advance_to(Over));
    }

    #[test]
    fn errored_reachable_from_any_live_state() {
        use SessionState::*;

        for state in [Connecting, Named, Lobbied, Started] {
            assert!(state.can_advance_to(Errored), "{state} -> errored");
        }
    }

    #[test]
    fn ids_normalize_integers() {
        assert_eq!(GameObjectId::from(7u64), GameObjectId::from("7"));
        assert_eq!(GameObjectId::new("abc").to_string(), "abc");
    }

    #[test]
    fn exit_codes_match_framework() {
        assert_eq!(ExitCode::None.code(), 0);
        assert_eq!(ExitCode::DeltaMergeFailure.code(), 24);
        assert_eq!(ExitCode::FatalEvent.code(), 28);
        assert_eq!(ExitCode::AiErrored.code(), 42);
    }
}
