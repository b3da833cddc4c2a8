//! The AI surface: the hooks a game AI implements and the contexts it sees.
//!
//! Hooks are called one at a time from the session loop. [`Ai::take_turn`]
//! is the only async hook; while it awaits an order, the runtime keeps
//! applying inbound envelopes in order, so the graph visible through the
//! [`TurnContext`] after each await reflects every delta received so far.

use std::collections::BTreeMap;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::core::{GameObject, GameObjectGraph, Value};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::orders::{OrderArgs, OrderTicket};
use crate::protocol::{self, DecodeError};
use crate::session::SessionCore;
use crate::types::{GameObjectId, SessionState};

/// A game-playing AI.
///
/// Only [`name`](Ai::name) and [`take_turn`](Ai::take_turn) are required.
/// Errors returned from any hook end the session with an AI error.
#[allow(async_fn_in_trait)]
pub trait Ai {
    /// Player name sent to the server unless the config overrides it.
    fn name(&self) -> String;

    fn set_settings(&mut self, _settings: AiSettings) {}

    /// Called once when the game starts, after the initial state is applied.
    fn start(&mut self, _game: &GameContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the graph changes. Several deltas may be coalesced into
    /// one call; it never interrupts [`take_turn`](Ai::take_turn).
    fn game_updated(&mut self, _game: &GameContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// The server rejected something this AI sent.
    ///
    /// Called after the turn that caused it. There is no error to return:
    /// nothing done here can end the session.
    fn invalid(&mut self, _game: &GameContext<'_>, message: &str) {
        warn!(%message, "server reported an invalid message");
    }

    /// Answer a server order. The returned value is sent back as the result.
    async fn take_turn(
        &mut self,
        order: &OrderRequest,
        turn: &mut TurnContext<'_>,
    ) -> anyhow::Result<Value>;

    fn ended(&mut self, _game: &GameContext<'_>, _won: bool, _reason: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An order from the server with its arguments decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub name: String,
    pub index: i64,
    pub args: Vec<Value>,
}

// ============== Settings ==============

/// Settings handed to the AI from the command line, `key=value&key=value`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiSettings(BTreeMap<String, String>);

impl AiSettings {
    pub fn parse(raw: &str) -> Self {
        let map = raw
            .split('&')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Comma separated values of `key`.
    pub fn get_list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============== Contexts ==============

/// Read-only view of the session handed to the AI hooks.
#[derive(Debug, Clone, Copy)]
pub struct GameContext<'a> {
    graph: &'a GameObjectGraph,
    player_id: Option<&'a GameObjectId>,
    game_name: &'a str,
    game_session: &'a str,
}

impl<'a> GameContext<'a> {
    pub fn new(
        graph: &'a GameObjectGraph,
        player_id: Option<&'a GameObjectId>,
        game_name: &'a str,
        game_session: &'a str,
    ) -> Self {
        Self {
            graph,
            player_id,
            game_name,
            game_session,
        }
    }

    pub fn graph(&self) -> &'a GameObjectGraph {
        self.graph
    }

    pub fn player_id(&self) -> Option<&'a GameObjectId> {
        self.player_id
    }

    /// This AI's player object.
    pub fn player(&self) -> Option<&'a GameObject> {
        self.player_id.and_then(|id| self.graph.get(id))
    }

    pub fn game_name(&self) -> &'a str {
        self.game_name
    }

    pub fn game_session(&self) -> &'a str {
        self.game_session
    }
}

/// What [`Ai::take_turn`] may do: read the game and send orders.
pub struct TurnContext<'s> {
    dispatcher: &'s mut Dispatcher<SessionCore>,
    core: &'s mut SessionCore,
}

impl<'s> TurnContext<'s> {
    pub(crate) fn new(dispatcher: &'s mut Dispatcher<SessionCore>, core: &'s mut SessionCore) -> Self {
        Self { dispatcher, core }
    }

    pub fn game(&self) -> GameContext<'_> {
        self.core.game_context()
    }

    pub fn graph(&self) -> &GameObjectGraph {
        &self.core.graph
    }

    pub fn player_id(&self) -> Option<&GameObjectId> {
        self.core.player_id.as_ref()
    }

    /// Where the session stands; `Over` once the game ended mid-turn.
    pub fn state(&self) -> SessionState {
        self.core.state
    }

    /// Send `function_name` to run on `target` without waiting for the reply.
    pub fn submit(
        &mut self,
        target: &GameObjectId,
        function_name: &str,
        args: OrderArgs,
    ) -> Result<OrderTicket> {
        let ticket = self.core.orders.register()?;
        let run = protocol::create_run(ticket.order_id(), target, function_name, args.into_map())
            .map_err(DecodeError::from);
        let run = match run {
            Ok(run) => run,
            Err(e) => {
                self.core.orders.forget(ticket.order_id());
                return Err(e.into());
            }
        };
        self.core.send(run)?;
        debug!(order_id = ticket.order_id(), %target, function_name, "order sent");
        Ok(ticket)
    }

    /// Wait for a submitted order, processing inbound envelopes meanwhile.
    pub async fn resolve(&mut self, mut ticket: OrderTicket) -> Result<Value> {
        loop {
            if let Some(reply) = ticket.try_take() {
                return reply;
            }
            self.pump().await?;
        }
    }

    /// Submit and resolve in one step.
    pub async fn order(
        &mut self,
        target: &GameObjectId,
        function_name: &str,
        args: OrderArgs,
    ) -> Result<Value> {
        let ticket = self.submit(target, function_name, args)?;
        self.resolve(ticket).await
    }

    /// Attach a message to `target`, visible to spectators of the game.
    pub async fn log(&mut self, target: &GameObjectId, message: &str) -> Result<()> {
        self.order(target, "log", OrderArgs::new().with("message", message))
            .await
            .map(|_| ())
    }

    async fn pump(&mut self) -> Result<()> {
        match self.dispatcher.pump(self.core).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(self.core.record_failure(e)),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for TurnContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("state", &self.core.state)
            .field("outstanding", &self.core.orders.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_parse_pairs_and_lists() {
        let settings = AiSettings::parse("moves=e2e4, d2d4&depth=3&verbose&=x");
        assert_eq!(settings.get_list("moves"), vec!["e2e4", "d2d4"]);
        assert_eq!(settings.get_parsed::<u32>("depth"), Some(3));
        assert_eq!(settings.get("verbose"), Some(""));
        assert_eq!(settings.get("missing"), None);
        assert!(settings.get_list("missing").is_empty());
        assert!(AiSettings::parse("").is_empty());
    }

    #[test]
    fn unparsable_values_are_none() {
        let settings = AiSettings::parse("depth=deep");
        assert_eq!(settings.get_parsed::<u32>("depth"), None);
    }
}
