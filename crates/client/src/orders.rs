//! Outbound orders (`run`) and their correlation with `ran` replies.

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::Value;
use crate::error::{ClientError, Result};
use crate::protocol::OrderReturn;

type Reply = Result<Value>;

/// Named arguments of one order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderArgs(Map<String, Json>);

impl OrderArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into().to_json());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_map(self) -> Map<String, Json> {
        self.0
    }
}

/// Completion handle for one submitted order.
#[derive(Debug)]
pub struct OrderTicket {
    order_id: u64,
    rx: oneshot::Receiver<Reply>,
}

impl OrderTicket {
    pub fn order_id(&self) -> u64 {
        self.order_id
    }

    /// The reply, if it has arrived.
    pub fn try_take(&mut self) -> Option<Reply> {
        match self.rx.try_recv() {
            Ok(reply) => Some(reply),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ClientError::session_ended(
                "order was dropped without a reply",
            ))),
        }
    }
}

/// Pending orders keyed by order id.
///
/// Ids start at 1 and never repeat within a session. Each pending order is
/// completed exactly once: by its reply, by an `invalid` rejection, or by
/// session end.
#[derive(Debug)]
pub struct OrderBook {
    next_order_id: u64,
    pending: BTreeMap<u64, oneshot::Sender<Reply>>,
    limit: usize,
    closed: Option<String>,
}

impl OrderBook {
    pub fn new(limit: usize) -> Self {
        Self {
            next_order_id: 1,
            pending: BTreeMap::new(),
            limit: limit.max(1),
            closed: None,
        }
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, order_id: u64) -> bool {
        self.pending.contains_key(&order_id)
    }

    /// Allocate an id and a ticket for a new order.
    pub fn register(&mut self) -> Result<OrderTicket> {
        if let Some(reason) = &self.closed {
            return Err(ClientError::session_ended(reason.clone()));
        }
        if self.pending.len() >= self.limit {
            return Err(ClientError::OrderLimit { limit: self.limit });
        }

        let order_id = self.next_order_id;
        self.next_order_id += 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(order_id, tx);
        Ok(OrderTicket { order_id, rx })
    }

    /// Drop a registered order whose `run` never made it out.
    pub fn forget(&mut self, order_id: u64) {
        self.pending.remove(&order_id);
    }

    /// Complete the order a reply belongs to. Returns the order id, or
    /// `None` when the reply matches nothing pending.
    ///
    /// A reply without an id is only accepted while exactly one order is
    /// pending; otherwise it cannot be attributed.
    pub fn resolve(&mut self, reply: OrderReturn) -> Option<u64> {
        let order_id = match reply.order_id {
            Some(id) if self.pending.contains_key(&id) => id,
            Some(id) => {
                warn!(order_id = id, "ignoring reply for unknown order");
                return None;
            }
            None if self.pending.len() == 1 => *self.pending.keys().next()?,
            None => {
                warn!(
                    outstanding = self.pending.len(),
                    "ignoring uncorrelated reply"
                );
                return None;
            }
        };

        let tx = self.pending.remove(&order_id)?;
        debug!(order_id, "order resolved");
        let _ = tx.send(Ok(reply.returned));
        Some(order_id)
    }

    /// Fail the order named by an `invalid` message. Without an id the
    /// rejection applies only when exactly one order is pending.
    pub fn reject(&mut self, order_id: Option<u64>, message: &str) -> Option<u64> {
        let order_id = match order_id {
            Some(id) => id,
            None if self.pending.len() == 1 => *self.pending.keys().next()?,
            None => return None,
        };
        let tx = self.pending.remove(&order_id)?;
        let _ = tx.send(Err(ClientError::RemoteOrderRejected {
            order_id,
            message: message.to_string(),
        }));
        Some(order_id)
    }

    /// Fail every pending order and refuse new ones.
    pub fn reject_all(&mut self, reason: &str) {
        if self.closed.is_none() {
            self.closed = Some(reason.to_string());
        }
        for (order_id, tx) in std::mem::take(&mut self.pending) {
            debug!(order_id, reason, "order abandoned");
            let _ = tx.send(Err(ClientError::session_ended(reason)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn reply(order_id: Option<u64>, returned: impl Into<Value>) -> OrderReturn {
        OrderReturn {
            order_id,
            returned: returned.into(),
        }
    }

    #[test]
    fn ids_are_monotonic_and_limited() {
        let mut book = OrderBook::new(2);
        let a = assert_ok!(book.register());
        let b = assert_ok!(book.register());
        assert_eq!((a.order_id(), b.order_id()), (1, 2));

        let err = assert_err!(book.register());
        assert!(matches!(err, ClientError::OrderLimit { limit: 2 }));

        book.forget(b.order_id());
        let c = assert_ok!(book.register());
        assert_eq!(c.order_id(), 3);
    }

    #[test]
    fn replies_match_by_id_in_any_order() {
        let mut book = OrderBook::new(2);
        let mut first = book.register().unwrap();
        let mut second = book.register().unwrap();

        assert_eq!(book.resolve(reply(Some(2), "b")), Some(2));
        assert!(first.try_take().is_none());
        assert_eq!(second.try_take().unwrap().unwrap(), Value::from("b"));

        assert_eq!(book.resolve(reply(Some(9), "stray")), None);
        assert!(first.try_take().is_none());

        assert_eq!(book.resolve(reply(Some(1), "a")), Some(1));
        assert_eq!(first.try_take().unwrap().unwrap(), Value::from("a"));
        assert_eq!(book.outstanding(), 0);
    }

    #[test]
    fn bare_reply_needs_a_single_pending_order() {
        let mut book = OrderBook::new(2);
        let mut first = book.register().unwrap();
        let _second = book.register().unwrap();
        assert_eq!(book.resolve(reply(None, true)), None);
        assert_eq!(book.outstanding(), 2);

        book.forget(2);
        assert_eq!(book.resolve(reply(None, true)), Some(1));
        assert_eq!(first.try_take().unwrap().unwrap(), Value::Bool(true));
    }

    #[test]
    fn rejection_and_session_end() {
        let mut book = OrderBook::new(2);
        let mut first = book.register().unwrap();
        let mut second = book.register().unwrap();

        assert_eq!(book.reject(Some(1), "not your piece"), Some(1));
        let err = first.try_take().unwrap().unwrap_err();
        assert!(matches!(err, ClientError::RemoteOrderRejected { order_id: 1, .. }));

        book.reject_all("game over");
        let err = second.try_take().unwrap().unwrap_err();
        assert!(matches!(err, ClientError::SessionEnded { ref reason } if reason == "game over"));

        let err = book.register().unwrap_err();
        assert!(matches!(err, ClientError::SessionEnded { .. }));
    }

    #[test]
    fn order_args_build_json() {
        let args = OrderArgs::new()
            .with("message", "hello")
            .with("count", 2i64);
        let map = args.into_map();
        assert_eq!(map["message"], serde_json::json!("hello"));
        assert_eq!(map["count"], serde_json::json!(2));
    }
}
