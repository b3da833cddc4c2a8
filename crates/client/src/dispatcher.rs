//! Event dispatcher - one ordered stream of inbound envelopes
//!
//! Two ways to consume events:
//!
//! - [`Dispatcher::on`] registers a persistent handler (`delta`, `ran`, ...)
//! - [`Dispatcher::wait_for`] suspends until the next envelope with a given
//!   name and hands it back instead of to a handler
//!
//! Envelopes are always processed in arrival order. While waiting, every
//! envelope that arrives before the awaited one goes to its persistent
//! handler first, so a wait never skips ahead of earlier deltas. Waits take
//! `&mut self`, so at most one can be outstanding at a time.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{trace, warn};

use crate::error::{ClientError, Result};
use crate::protocol::Envelope;
use crate::transport::{Inbound, InboundReceiver};

/// State the handlers operate on.
pub trait DispatchContext {
    /// Once closed, waits stop instead of blocking forever.
    fn is_closed(&self) -> bool;
}

pub type Handler<C> = Box<dyn FnMut(&mut C, Envelope) -> Result<()>>;

pub struct Dispatcher<C> {
    inbound: InboundReceiver,
    handlers: HashMap<String, Handler<C>>,
    unhandled: Option<Handler<C>>,
    dispatched: u64,
}

impl<C: DispatchContext> Dispatcher<C> {
    pub fn new(inbound: InboundReceiver) -> Self {
        Self {
            inbound,
            handlers: HashMap::new(),
            unhandled: None,
            dispatched: 0,
        }
    }

    /// Register the persistent handler for `event`, replacing any previous one.
    pub fn on<F>(&mut self, event: &str, handler: F)
    where
        F: FnMut(&mut C, Envelope) -> Result<()> + 'static,
    {
        self.handlers.insert(event.to_string(), Box::new(handler));
    }

    /// Handler for events with no persistent handler. Without one they are
    /// logged and dropped.
    pub fn otherwise<F>(&mut self, handler: F)
    where
        F: FnMut(&mut C, Envelope) -> Result<()> + 'static,
    {
        self.unhandled = Some(Box::new(handler));
    }

    pub fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Next well-formed envelope. Malformed frames are logged and dropped;
    /// a closed or failed connection is an error.
    pub async fn next(&mut self) -> Result<Envelope> {
        loop {
            match self.inbound.recv().await {
                Some(Inbound::Envelope(envelope)) => {
                    trace!(event = %envelope.event, "received");
                    return Ok(envelope);
                }
                Some(Inbound::Malformed(e)) => {
                    warn!(error = %e, "dropping malformed message");
                }
                Some(Inbound::Closed) => {
                    return Err(ClientError::Transport(
                        "server closed the connection".to_string(),
                    ));
                }
                Some(Inbound::Failed(reason)) => return Err(ClientError::Transport(reason)),
                None => {
                    return Err(ClientError::Transport("receive path stopped".to_string()));
                }
            }
        }
    }

    /// Hand one envelope to its persistent handler.
    pub fn dispatch(&mut self, ctx: &mut C, envelope: Envelope) -> Result<()> {
        self.dispatched += 1;
        if let Some(handler) = self.handlers.get_mut(&envelope.event) {
            return handler(ctx, envelope);
        }
        match self.unhandled.as_mut() {
            Some(handler) => handler(ctx, envelope),
            None => {
                warn!(event = %envelope.event, "ignoring unhandled event");
                Ok(())
            }
        }
    }

    /// Receive and dispatch exactly one envelope.
    pub async fn pump(&mut self, ctx: &mut C) -> Result<()> {
        let envelope = self.next().await?;
        self.dispatch(ctx, envelope)
    }

    /// Dispatch envelopes until `done` holds or the context closes.
    pub async fn pump_until<F>(&mut self, ctx: &mut C, mut done: F) -> Result<()>
    where
        F: FnMut(&C) -> bool,
    {
        while !done(ctx) {
            if ctx.is_closed() {
                return Err(ClientError::session_ended("session closed"));
            }
            self.pump(ctx).await?;
        }
        Ok(())
    }

    /// Suspend until the next `event` envelope and return it; everything
    /// received before it is dispatched normally.
    pub async fn wait_for(&mut self, ctx: &mut C, event: &str) -> Result<Envelope> {
        loop {
            if ctx.is_closed() {
                return Err(ClientError::session_ended(format!(
                    "session closed while waiting for {event:?}"
                )));
            }
            let envelope = self.next().await?;
            if envelope.event == event {
                self.dispatched += 1;
                return Ok(envelope);
            }
            self.dispatch(ctx, envelope)?;
        }
    }

    /// [`wait_for`](Self::wait_for) bounded by `limit`.
    pub async fn wait_for_within(
        &mut self,
        ctx: &mut C,
        event: &str,
        limit: Option<Duration>,
    ) -> Result<Envelope> {
        let Some(limit) = limit else {
            return self.wait_for(ctx, event).await;
        };
        match tokio::time::timeout(limit, self.wait_for(ctx, event)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::HandshakeTimeout {
                event: event.to_string(),
                waited: limit,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DecodeError;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Log {
        seen: Vec<String>,
        closed: bool,
    }

    impl DispatchContext for Log {
        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    fn env(event: &str) -> Inbound {
        Inbound::Envelope(Envelope::new(event, json!(null)))
    }

    fn dispatcher() -> (mpsc::UnboundedSender<Inbound>, Dispatcher<Log>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new(rx);
        dispatcher.on("delta", |log: &mut Log, e: Envelope| {
            log.seen.push(e.event);
            Ok(())
        });
        (tx, dispatcher)
    }

    #[tokio::test]
    async fn wait_for_delivers_earlier_envelopes_first() {
        let (tx, mut dispatcher) = dispatcher();
        let mut log = Log::default();

        tx.send(env("delta")).unwrap();
        tx.send(env("bogus")).unwrap();
        tx.send(env("delta")).unwrap();
        tx.send(env("start")).unwrap();
        tx.send(env("delta")).unwrap();

        let start = dispatcher.wait_for(&mut log, "start").await.unwrap();
        assert_eq!(start.event, "start");
        assert_eq!(log.seen, vec!["delta", "delta"]);

        dispatcher.pump(&mut log).await.unwrap();
        assert_eq!(log.seen.len(), 3);
        assert_eq!(dispatcher.dispatched(), 5);
    }

    #[tokio::test]
    async fn malformed_messages_are_skipped() {
        let (tx, mut dispatcher) = dispatcher();
        let mut log = Log::default();

        tx.send(Inbound::Malformed(DecodeError::MissingEvent)).unwrap();
        tx.send(env("named")).unwrap();

        let named = dispatcher.wait_for(&mut log, "named").await.unwrap();
        assert_eq!(named.event, "named");
    }

    #[tokio::test]
    async fn connection_loss_is_a_transport_error() {
        let (tx, mut dispatcher) = dispatcher();
        let mut log = Log::default();

        tx.send(env("delta")).unwrap();
        tx.send(Inbound::Closed).unwrap();

        let err = dispatcher.wait_for(&mut log, "named").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(log.seen, vec!["delta"]);

        drop(tx);
        let err = dispatcher.next().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn wait_times_out() {
        let (_tx, mut dispatcher) = dispatcher();
        let mut log = Log::default();

        let err = dispatcher
            .wait_for_within(&mut log, "lobbied", Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::HandshakeTimeout { ref event, .. } if event == "lobbied"));
    }

    #[tokio::test]
    async fn closing_handler_ends_waits() {
        let (tx, mut dispatcher) = dispatcher();
        dispatcher.on("over", |log: &mut Log, _| {
            log.closed = true;
            Ok(())
        });
        let mut log = Log::default();

        tx.send(env("over")).unwrap();
        let err = dispatcher.wait_for(&mut log, "start").await.unwrap_err();
        assert!(matches!(err, ClientError::SessionEnded { .. }));
    }

    #[tokio::test]
    async fn fallback_sees_unhandled_events() {
        let (tx, mut dispatcher) = dispatcher();
        dispatcher.otherwise(|log: &mut Log, e| {
            log.seen.push(format!("unhandled:{}", e.event));
            Ok(())
        });
        let mut log = Log::default();

        tx.send(env("named")).unwrap();
        tx.send(env("delta")).unwrap();
        dispatcher
            .pump_until(&mut log, |log| log.seen.len() == 2)
            .await
            .unwrap();

        assert_eq!(log.seen, vec!["unhandled:named", "delta"]);
    }
}
