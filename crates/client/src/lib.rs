//! Client module - the session protocol runtime
//!
//! This crate connects an AI to a game server and keeps a local mirror of the
//! server-authoritative game state. The server decides everything; the
//! client applies deltas, answers orders, and asks the server to run
//! functions on game objects.
//!
//! # Protocol Overview
//!
//! The runtime implements an **EOT-delimited JSON protocol** over TCP:
//!
//! 1. **Connection**: Client connects to TCP socket (default: 127.0.0.1:3000)
//! 2. **Alias**: Client sends `alias`, server answers `named` with the canonical game name
//! 3. **Lobby**: Client sends `play`, server answers `lobbied` with the session id
//! 4. **Start**: Server sends `start` with this client's player id
//! 5. **Turn loop**: Server streams `delta`s and sends `order`s; the AI answers
//!    orders with `finished` and may send `run`s, answered by `ran`
//! 6. **Over**: Server sends `over`, the session closes
//!
//! # Message Types
//!
//! ## Client → Server
//!
//! - **alias**: Game alias to resolve
//! - **play**: Player name, game, requested session, optional settings
//! - **run**: Invoke a function on a game object (`caller`, `functionName`, `args`, `orderId`)
//! - **finished**: Result of a server order (`orderIndex`, `returned`)
//!
//! ## Server → Client
//!
//! - **named**, **lobbied**, **start**: Handshake steps
//! - **delta**: Changes to the game state
//! - **order**: Request for the AI to act
//! - **ran**: Result of a `run`
//! - **invalid**: Something the client sent was rejected
//! - **fatal**: Unrecoverable server-side failure
//! - **over**: Game finished, with the outcome for this player
//!
//! # Example Protocol Flow
//!
//! ```text
//! Client -> Server: {"event":"alias","data":"chess","sentTime":1700000000000}
//! Server -> Client: {"event":"named","data":"Chess"}
//! Client -> Server: {"event":"play","data":{"clientType":"Rust","playerName":"Rusty","gameName":"Chess","requestedSession":"*"}}
//! Server -> Client: {"event":"lobbied","data":{"gameName":"Chess","gameSession":"1","constants":{"DELTA_REMOVED":"&RM","DELTA_LIST_LENGTH":"&LEN"}}}
//! Server -> Client: {"event":"delta","data":{"fen":"...","gameObjects":{"0":{"id":"0","gameObjectName":"Player"}}}}
//! Server -> Client: {"event":"start","data":{"playerID":"0"}}
//! Server -> Client: {"event":"order","data":{"name":"makeMove","index":0,"args":[]}}
//! Client -> Server: {"event":"finished","data":{"orderIndex":0,"returned":"e2e4"}}
//! Server -> Client: {"event":"over","data":{"won":true,"reason":"Checkmate"}}
//! ```
//!
//! Every message is followed by one `0x04` byte.
//!
//! # Implementation
//!
//! - Uses **tokio** for async networking; reading and writing run on their own tasks
//! - All inbound events are processed in arrival order by one [`dispatcher`]
//! - The AI runs between events, never concurrently with them
//! - See [`protocol`] for message structure definitions
//! - See [`session`] for the state machine and turn loop
//!
//! # Environment Variables
//!
//! - `JOUEUR_SERVER`: Server host, optionally `host:port` (default: "127.0.0.1")
//! - `JOUEUR_PORT`: Port number (default: 3000)
//! - `JOUEUR_PRINT_IO`: Set to "1" or "true" to echo raw frames to stderr
//! - `JOUEUR_WIRE_LOG`: Append raw frames to this file
//! - `JOUEUR_HANDSHAKE_TIMEOUT_SECS`: Handshake timeout, 0 waits forever (default: 30)

pub mod ai;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orders;
pub mod protocol;
pub mod session;
pub mod transport;

pub use joueur_core as core;
pub use joueur_types as types;

pub use ai::{Ai, AiSettings, GameContext, OrderRequest, TurnContext};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use orders::{OrderArgs, OrderTicket};
pub use session::{GameOutcome, Session};
pub use transport::Transport;
