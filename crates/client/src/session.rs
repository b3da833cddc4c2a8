//! Session state machine
//!
//! ```text
//! Connecting --named--> Named --lobbied--> Lobbied --start--> Started --over--> Over
//!      \___________________\___________________\_________________\____> Errored
//! ```
//!
//! [`Session`] drives one connection through the handshake, then runs the
//! turn loop: deltas update the graph, `order` messages become
//! [`Ai::take_turn`] calls, and `over` ends the game. The AI never runs
//! concurrently with message processing; it runs between envelopes and, while
//! waiting on its own orders, lets the runtime process envelopes in order.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::ai::{Ai, AiSettings, GameContext, OrderRequest, TurnContext};
use crate::config::ClientConfig;
use crate::core::{Fields, GameObjectGraph, TypeRegistry, Value};
use crate::dispatcher::{DispatchContext, Dispatcher};
use crate::error::{ClientError, Result};
use crate::orders::OrderBook;
use crate::protocol::{
    self, events, DecodeError, Envelope, FatalData, InvalidData, LobbiedData, OrderData,
    OrderReturn, OverData, StartData,
};
use crate::transport::{InboundReceiver, Transport};
use crate::types::{GameObjectId, SessionState};

/// How a finished game ended for this player.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameOutcome {
    pub won: bool,
    pub reason: String,
    pub message: Option<String>,
}

impl From<OverData> for GameOutcome {
    fn from(over: OverData) -> Self {
        Self {
            won: over.won,
            reason: over.reason,
            message: over.message,
        }
    }
}

/// Everything the persistent handlers mutate.
pub struct SessionCore {
    pub(crate) state: SessionState,
    pub(crate) transport: Transport,
    pub(crate) graph: GameObjectGraph,
    pub(crate) orders: OrderBook,
    pub(crate) game_name: String,
    pub(crate) game_session: String,
    pub(crate) player_id: Option<GameObjectId>,
    /// Deltas applied since the AI last heard about it.
    pub(crate) updated: bool,
    pub(crate) turns: VecDeque<OrderData>,
    pub(crate) invalid_notices: VecDeque<String>,
    pub(crate) outcome: Option<GameOutcome>,
    pub(crate) failure: Option<ClientError>,
}

impl DispatchContext for SessionCore {
    fn is_closed(&self) -> bool {
        self.state.is_terminal()
    }
}

impl SessionCore {
    fn new(transport: Transport, max_outstanding_orders: usize) -> Self {
        Self {
            state: SessionState::Connecting,
            transport,
            graph: GameObjectGraph::new(TypeRegistry::new("", Fields::new)),
            orders: OrderBook::new(max_outstanding_orders),
            game_name: String::new(),
            game_session: String::new(),
            player_id: None,
            updated: false,
            turns: VecDeque::new(),
            invalid_notices: VecDeque::new(),
            outcome: None,
            failure: None,
        }
    }

    pub(crate) fn game_context(&self) -> GameContext<'_> {
        GameContext::new(
            &self.graph,
            self.player_id.as_ref(),
            &self.game_name,
            &self.game_session,
        )
    }

    pub(crate) fn send(&mut self, envelope: Envelope) -> Result<()> {
        if let Err(e) = self.transport.send(envelope) {
            self.enter_errored(&e);
            return Err(e);
        }
        Ok(())
    }

    fn advance(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(ClientError::InvalidState {
                action: "advance the session",
                state: self.state,
            });
        }
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
        Ok(())
    }

    fn require(&self, state: SessionState, action: &'static str) -> Result<()> {
        if self.state != state {
            return Err(ClientError::InvalidState {
                action,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Move to `Errored` and fail every pending order.
    pub(crate) fn enter_errored(&mut self, err: &ClientError) {
        if self.state.is_terminal() {
            return;
        }
        error!(error = %err, state = %self.state, "session failed");
        self.state = SessionState::Errored;
        self.orders.reject_all(&err.to_string());
    }

    /// Record a fatal error raised where it cannot be returned directly.
    pub(crate) fn record_failure(&mut self, err: ClientError) -> ClientError {
        self.enter_errored(&err);
        let reason = err.to_string();
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        ClientError::session_ended(reason)
    }

    fn take_failure(&mut self) -> ClientError {
        self.failure
            .take()
            .unwrap_or_else(|| ClientError::session_ended("session errored"))
    }

    fn wants_ai(&self) -> bool {
        self.updated
            || !self.turns.is_empty()
            || !self.invalid_notices.is_empty()
            || self.state.is_terminal()
    }
}

// ============== Persistent Handlers ==============

fn on_delta(core: &mut SessionCore, envelope: Envelope) -> Result<()> {
    if matches!(
        core.state,
        SessionState::Connecting | SessionState::Named
    ) {
        warn!(state = %core.state, "ignoring delta before lobby");
        return Ok(());
    }
    match core.graph.apply_delta(protocol::delta_root(&envelope.data)) {
        Ok(_) => core.updated = true,
        Err(e) => warn!(error = %ClientError::from(e), "dropping delta"),
    }
    Ok(())
}

fn on_order(core: &mut SessionCore, envelope: Envelope) -> Result<()> {
    if core.state != SessionState::Started {
        let err = ClientError::UnexpectedEvent {
            event: envelope.event,
            state: core.state,
        };
        warn!(error = %err, "ignoring order");
        return Ok(());
    }
    match envelope.payload::<OrderData>() {
        Ok(order) => {
            debug!(name = %order.name, index = order.index, "order received");
            core.turns.push_back(order);
        }
        Err(e) => warn!(error = %e, "ignoring order"),
    }
    Ok(())
}

fn on_reply(core: &mut SessionCore, envelope: Envelope) -> Result<()> {
    core.orders.resolve(OrderReturn::from_data(&envelope.data));
    Ok(())
}

fn on_invalid(core: &mut SessionCore, envelope: Envelope) -> Result<()> {
    let invalid: InvalidData = envelope.payload().unwrap_or_else(|_| InvalidData {
        message: message_text(&envelope.data),
        order_id: None,
        data: None,
    });
    let rejected = core.orders.reject(invalid.order_id, &invalid.message);
    warn!(order_id = ?rejected, message = %invalid.message, "server rejected a message");
    core.invalid_notices.push_back(invalid.message);
    Ok(())
}

fn on_fatal(_core: &mut SessionCore, envelope: Envelope) -> Result<()> {
    let message = envelope
        .payload::<FatalData>()
        .map(|fatal| fatal.message)
        .unwrap_or_else(|_| message_text(&envelope.data));
    Err(ClientError::ServerFatal(message))
}

fn message_text(data: &serde_json::Value) -> String {
    match data.as_str() {
        Some(text) => text.to_string(),
        None => data.to_string(),
    }
}

fn on_over(core: &mut SessionCore, envelope: Envelope) -> Result<()> {
    if core.state.is_terminal() {
        return Ok(());
    }
    let over: OverData = envelope.payload().unwrap_or_default();
    core.state = SessionState::Over;
    core.orders.reject_all("game is over");
    info!(won = over.won, reason = %over.reason, "game over");
    core.outcome = Some(over.into());
    Ok(())
}

fn on_unexpected(core: &mut SessionCore, envelope: Envelope) -> Result<()> {
    let err = ClientError::UnexpectedEvent {
        event: envelope.event,
        state: core.state,
    };
    warn!(error = %err, "ignoring event");
    Ok(())
}

// ============== Session ==============

/// One connection to a game server, from handshake to game over.
pub struct Session {
    config: ClientConfig,
    dispatcher: Dispatcher<SessionCore>,
    core: SessionCore,
}

impl Session {
    /// Open the TCP connection described by `config`.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let (transport, inbound) = Transport::connect(&config).await?;
        Ok(Self::with_transport(config, transport, inbound))
    }

    /// Build a session over an already running transport.
    pub fn with_transport(config: ClientConfig, transport: Transport, inbound: InboundReceiver) -> Self {
        let mut dispatcher = Dispatcher::new(inbound);
        dispatcher.on(events::DELTA, on_delta);
        dispatcher.on(events::ORDER, on_order);
        dispatcher.on(events::RAN, on_reply);
        dispatcher.on(events::FINISHED, on_reply);
        dispatcher.on(events::INVALID, on_invalid);
        dispatcher.on(events::FATAL, on_fatal);
        dispatcher.on(events::OVER, on_over);
        dispatcher.otherwise(on_unexpected);

        let core = SessionCore::new(transport, config.max_outstanding_orders);
        Self {
            config,
            dispatcher,
            core,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.core.state
    }

    pub fn graph(&self) -> &GameObjectGraph {
        &self.core.graph
    }

    pub fn game_name(&self) -> &str {
        &self.core.game_name
    }

    pub fn game_session(&self) -> &str {
        &self.core.game_session
    }

    pub fn player_id(&self) -> Option<&GameObjectId> {
        self.core.player_id.as_ref()
    }

    pub fn outcome(&self) -> Option<&GameOutcome> {
        self.core.outcome.as_ref()
    }

    /// Resolve the configured game alias to the server's canonical name.
    pub async fn alias(&mut self) -> Result<String> {
        self.core.require(SessionState::Connecting, "send alias")?;
        self.core
            .send(protocol::create_alias(&self.config.game_alias))?;

        let named = self
            .wait_for(events::NAMED, self.config.handshake_timeout)
            .await?;
        let game_name: String = named.payload().map_err(|e| self.abort(e.into()))?;
        self.core.advance(SessionState::Named)?;
        info!(alias = %self.config.game_alias, game = %game_name, "game alias resolved");
        self.core.game_name = game_name.clone();
        Ok(game_name)
    }

    /// Ask to play and wait in the lobby.
    ///
    /// `registry` must describe the game named by [`alias`](Self::alias).
    pub async fn play(&mut self, registry: TypeRegistry, player_name: &str) -> Result<LobbiedData> {
        self.core.require(SessionState::Named, "send play")?;
        if registry.game_name() != self.core.game_name {
            return Err(ClientError::GameNotFound(self.core.game_name.clone()));
        }
        self.core.graph = GameObjectGraph::new(registry);

        let mut play = protocol::create_play(
            player_name,
            &self.core.game_name,
            &self.config.requested_session,
        );
        play.player_index = self.config.player_index;
        play.password = self.config.password.clone();
        play.game_settings = self.config.game_settings.clone();
        let data = serde_json::to_value(play).map_err(DecodeError::from)?;
        self.core.send(Envelope::new(events::PLAY, data))?;

        let lobbied = self
            .wait_for(events::LOBBIED, self.config.handshake_timeout)
            .await?;
        let lobbied: LobbiedData = lobbied.payload().map_err(|e| self.abort(e.into()))?;
        self.core.advance(SessionState::Lobbied)?;
        self.core.game_session = lobbied.game_session.clone();
        self.core
            .graph
            .set_constants(lobbied.constants.clone().into());
        info!(
            game = %lobbied.game_name,
            session = %lobbied.game_session,
            "in lobby, waiting for the game to start"
        );
        Ok(lobbied)
    }

    /// Wait for the game to start and play it to the end.
    pub async fn run<A: Ai>(&mut self, ai: &mut A) -> Result<GameOutcome> {
        if self.core.state == SessionState::Over {
            return self.finish(ai).await;
        }
        self.core.require(SessionState::Lobbied, "start playing")?;

        let start = match self.wait_for(events::START, self.config.start_timeout).await {
            Ok(start) => start,
            // Ended before it started, e.g. the opponent never joined.
            Err(_) if self.core.state == SessionState::Over => return self.finish(ai).await,
            Err(e) => return Err(e),
        };
        let start: StartData = start.payload().map_err(|e| self.abort(e.into()))?;
        self.core.player_id = Some(start.player_id);
        self.core.advance(SessionState::Started)?;
        info!(player = ?self.core.player_id.as_ref().map(GameObjectId::as_str), "game is starting");

        self.core.updated = false;
        let ctx = self.core.game_context();
        let hooks = ai.start(&ctx).and_then(|()| ai.game_updated(&ctx));
        if let Err(e) = hooks {
            return Err(self.ai_failed(e));
        }

        loop {
            match self.core.state {
                SessionState::Over => break,
                SessionState::Errored => {
                    self.core.transport.close().await;
                    return Err(self.core.take_failure());
                }
                _ => {}
            }

            if self.core.updated {
                self.core.updated = false;
                if let Err(e) = ai.game_updated(&self.core.game_context()) {
                    return Err(self.ai_failed(e));
                }
            }
            while let Some(message) = self.core.invalid_notices.pop_front() {
                ai.invalid(&self.core.game_context(), &message);
            }
            if let Some(order) = self.core.turns.pop_front() {
                self.take_turn(ai, order).await?;
                continue;
            }

            let pumped = self
                .dispatcher
                .pump_until(&mut self.core, SessionCore::wants_ai)
                .await;
            if let Err(e) = pumped {
                return Err(self.abort(e));
            }
        }

        self.finish(ai).await
    }

    /// Everything after [`alias`](Self::alias): apply AI settings, lobby,
    /// and play.
    pub async fn play_game<A: Ai>(&mut self, registry: TypeRegistry, ai: &mut A) -> Result<GameOutcome> {
        if let Some(settings) = self.config.ai_settings.as_deref() {
            ai.set_settings(AiSettings::parse(settings));
        }
        let player_name = self
            .config
            .player_name
            .clone()
            .unwrap_or_else(|| ai.name());
        match self.play(registry, &player_name).await {
            Ok(_) => {}
            Err(_) if self.core.state == SessionState::Over => {}
            Err(e) => return Err(e),
        }
        self.run(ai).await
    }

    /// Tell the AI how the game ended and release the connection.
    async fn finish<A: Ai>(&mut self, ai: &mut A) -> Result<GameOutcome> {
        let outcome = self.core.outcome.clone().unwrap_or_default();
        if let Some(message) = outcome.message.as_deref() {
            info!(%message, "server message");
        }
        let ended = ai.ended(&self.core.game_context(), outcome.won, &outcome.reason);
        self.close().await;
        if let Err(e) = ended {
            warn!(error = %format!("{e:#}"), "AI failed while ending");
        }
        Ok(outcome)
    }

    async fn take_turn<A: Ai>(&mut self, ai: &mut A, order: OrderData) -> Result<()> {
        let request = OrderRequest {
            name: order.name,
            index: order.index,
            args: order.args.iter().map(Value::from_json).collect(),
        };
        debug!(name = %request.name, index = request.index, "taking turn");

        let result = {
            let mut turn = TurnContext::new(&mut self.dispatcher, &mut self.core);
            ai.take_turn(&request, &mut turn).await
        };

        match self.core.state {
            // The game ended while the AI was thinking; the reply is moot.
            SessionState::Over => return Ok(()),
            SessionState::Errored => {
                self.core.transport.close().await;
                return Err(self.core.take_failure());
            }
            _ => {}
        }

        let returned = result.map_err(|e| self.ai_failed(e))?;
        let finished =
            protocol::create_finished(request.index, &returned).map_err(DecodeError::from)?;
        self.core.send(finished)
    }

    async fn wait_for(&mut self, event: &str, limit: Option<Duration>) -> Result<Envelope> {
        match self
            .dispatcher
            .wait_for_within(&mut self.core, event, limit)
            .await
        {
            Ok(envelope) => Ok(envelope),
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Fail the session on `err` and hand it back.
    fn abort(&mut self, err: ClientError) -> ClientError {
        if self.core.state == SessionState::Over {
            return err;
        }
        self.core.enter_errored(&err);
        self.core.transport.abort();
        err
    }

    fn ai_failed(&mut self, err: anyhow::Error) -> ClientError {
        self.abort(ClientError::AiErrored(format!("{err:#}")))
    }

    /// Close the connection, flushing queued frames and the wire log.
    ///
    /// Safe to call more than once, and after the session failed.
    pub async fn close(&mut self) {
        self.core.transport.close().await;
        self.core.graph.clear();
        debug!("session closed");
    }
}
