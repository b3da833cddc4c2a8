//! Chess binding for the client runtime.
//!
//! Registers the Chess game object types, offers typed views over the
//! mirrored state, and ships a small AI that plays scripted moves and then
//! prompts on standard input.

pub mod ai;
pub mod fen;
pub mod game;

pub use ai::{ChessAi, MAKE_MOVE};
pub use fen::pretty_fen;
pub use game::{registry, ChessGame, Color, PlayerView, GAME_NAME};
