//! Error kinds of the client runtime.

use std::time::Duration;

use thiserror::Error;

use crate::core::DeltaError;
use crate::protocol::DecodeError;
use crate::types::{ExitCode, SessionState};

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, reset, or closed.
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("delta rejected: {0}")]
    Delta(#[from] DeltaError),
    #[error("unexpected event {event:?} while {state}")]
    UnexpectedEvent { event: String, state: SessionState },
    #[error("server rejected order {order_id}: {message}")]
    RemoteOrderRejected { order_id: u64, message: String },
    #[error("timed out after {waited:?} waiting for {event:?}")]
    HandshakeTimeout { event: String, waited: Duration },
    #[error("session ended: {reason}")]
    SessionEnded { reason: String },
    #[error("server sent a fatal error: {0}")]
    ServerFatal(String),
    #[error("{limit} order(s) already outstanding")]
    OrderLimit { limit: usize },
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
    #[error("AI errored: {0}")]
    AiErrored(String),
    #[error("no game named {0:?} is bundled with this client")]
    GameNotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether this error ends the whole session.
    ///
    /// Per-message and per-order failures are reported to the caller and the
    /// session continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ClientError::Decode(_)
                | ClientError::Delta(_)
                | ClientError::UnexpectedEvent { .. }
                | ClientError::RemoteOrderRejected { .. }
                | ClientError::OrderLimit { .. }
        )
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            ClientError::Transport(_) | ClientError::SessionEnded { .. } => {
                ExitCode::DisconnectedUnexpectedly
            }
            ClientError::Connect { .. } => ExitCode::CouldNotConnect,
            ClientError::Io(_) => ExitCode::CannotReadSocket,
            ClientError::Decode(_) => ExitCode::MalformedJson,
            ClientError::Delta(_) => ExitCode::DeltaMergeFailure,
            ClientError::UnexpectedEvent { .. } | ClientError::InvalidState { .. } => {
                ExitCode::UnknownEventFromServer
            }
            ClientError::HandshakeTimeout { .. } => ExitCode::ServerTimeout,
            ClientError::ServerFatal(_) => ExitCode::FatalEvent,
            ClientError::GameNotFound(_) => ExitCode::GameNotFound,
            ClientError::RemoteOrderRejected { .. }
            | ClientError::OrderLimit { .. }
            | ClientError::AiErrored(_) => ExitCode::AiErrored,
        }
    }

    pub(crate) fn session_ended(reason: impl Into<String>) -> Self {
        ClientError::SessionEnded {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_message_failures_are_recoverable() {
        let rejected = ClientError::RemoteOrderRejected {
            order_id: 1,
            message: "illegal move".to_string(),
        };
        assert!(!rejected.is_fatal());
        assert!(!ClientError::UnexpectedEvent {
            event: "named".to_string(),
            state: SessionState::Started,
        }
        .is_fatal());
        assert!(!ClientError::Decode(DecodeError::MissingEvent).is_fatal());
    }

    #[test]
    fn transport_and_handshake_failures_are_fatal() {
        assert!(ClientError::Transport("reset".to_string()).is_fatal());
        let timeout = ClientError::HandshakeTimeout {
            event: "named".to_string(),
            waited: Duration::from_secs(1),
        };
        assert!(timeout.is_fatal());
        assert_eq!(timeout.exit_code(), ExitCode::ServerTimeout);
        assert_eq!(
            ClientError::ServerFatal("boom".to_string()).exit_code(),
            ExitCode::FatalEvent
        );
    }
}
