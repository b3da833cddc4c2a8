//! Joueur (workspace facade crate).
//!
//! Re-exports the member crates under one name so the binary, integration
//! tests, and benches use `joueur::{client,core,chess,types}` while the
//! implementation lives in dedicated crates under `crates/`.

pub use joueur_chess as chess;
pub use joueur_client as client;
pub use joueur_core as core;
pub use joueur_types as types;
