//! Protocol module - envelope framing and message shapes
//!
//! Every message on the wire is a JSON envelope followed by one EOT (`0x04`)
//! byte. All envelopes have: event, data, sentTime (timestamp in ms).

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::core::{DeltaConstants, Value};
use crate::types::{GameObjectId, CLIENT_TYPE, DELTA_LIST_LENGTH, DELTA_REMOVED, FRAME_TERMINATOR};

/// Event names understood by the session protocol.
pub mod events {
    pub const ALIAS: &str = "alias";
    pub const NAMED: &str = "named";
    pub const PLAY: &str = "play";
    pub const LOBBIED: &str = "lobbied";
    pub const START: &str = "start";
    pub const DELTA: &str = "delta";
    pub const ORDER: &str = "order";
    pub const FINISHED: &str = "finished";
    pub const RUN: &str = "run";
    pub const RAN: &str = "ran";
    pub const INVALID: &str = "invalid";
    pub const FATAL: &str = "fatal";
    pub const OVER: &str = "over";
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope has an empty event name")]
    MissingEvent,
    #[error("invalid {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

// ============== Envelope ==============

/// One protocol message, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Json,
    #[serde(rename = "sentTime", default, skip_serializing_if = "Option::is_none")]
    pub sent_time: Option<u64>,
}

impl Envelope {
    /// Outbound envelope stamped with the current time.
    pub fn new(event: impl Into<String>, data: Json) -> Self {
        Self {
            event: event.into(),
            data,
            sent_time: Some(current_timestamp_ms()),
        }
    }

    /// Decode `data` into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        T::deserialize(&self.data).map_err(|source| DecodeError::Payload {
            event: self.event.clone(),
            source,
        })
    }

    pub fn is(&self, event: &str) -> bool {
        self.event == event
    }
}

/// Serialize an envelope into one terminated frame.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, serde_json::Error> {
    let mut frame = serde_json::to_vec(envelope)?;
    frame.push(FRAME_TERMINATOR);
    Ok(frame)
}

/// Parse one frame; a trailing terminator is optional.
pub fn decode(frame: &[u8]) -> Result<Envelope, DecodeError> {
    let body = frame.strip_suffix(&[FRAME_TERMINATOR]).unwrap_or(frame);
    let envelope: Envelope = serde_json::from_slice(body)?;
    if envelope.event.is_empty() {
        return Err(DecodeError::MissingEvent);
    }
    Ok(envelope)
}

// ============== Client -> Server Messages ==============

/// Body of the `play` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub client_type: String,
    pub player_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_index: Option<i64>,
    pub game_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_settings: Option<String>,
    pub requested_session: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallerRef {
    pub id: String,
}

/// Body of the `run` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub caller: CallerRef,
    pub function_name: String,
    pub args: Map<String, Json>,
    pub order_id: u64,
}

/// Body of the `finished` message answering a server order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedReply {
    pub order_index: i64,
    pub returned: Json,
}

// ============== Server -> Client Messages ==============

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbiedData {
    pub game_name: String,
    pub game_session: String,
    #[serde(default)]
    pub constants: LobbyConstants,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LobbyConstants {
    #[serde(rename = "DELTA_REMOVED", default = "default_removed")]
    pub delta_removed: String,
    #[serde(rename = "DELTA_LIST_LENGTH", default = "default_list_length")]
    pub delta_list_length: String,
}

impl Default for LobbyConstants {
    fn default() -> Self {
        Self {
            delta_removed: default_removed(),
            delta_list_length: default_list_length(),
        }
    }
}

impl From<LobbyConstants> for DeltaConstants {
    fn from(value: LobbyConstants) -> Self {
        DeltaConstants {
            removed: value.delta_removed,
            list_length: value.delta_list_length,
        }
    }
}

fn default_removed() -> String {
    DELTA_REMOVED.to_string()
}

fn default_list_length() -> String {
    DELTA_LIST_LENGTH.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartData {
    #[serde(rename = "playerID", deserialize_with = "deserialize_id")]
    pub player_id: GameObjectId,
}

/// A server order: the server asks the AI to run `name` (e.g. "it's your turn").
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderData {
    pub name: String,
    pub index: i64,
    #[serde(default)]
    pub args: Vec<Json>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidData {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub order_id: Option<u64>,
    #[serde(default)]
    pub data: Option<Json>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FatalData {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct OverData {
    #[serde(default)]
    pub won: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of a `run`, carried by `ran` or `finished`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReturn {
    pub order_id: Option<u64>,
    pub returned: Value,
}

impl OrderReturn {
    /// Correlated form `{orderId, returned}`; anything else is a bare
    /// return value from a server that does not echo order ids.
    pub fn from_data(data: &Json) -> Self {
        if let Some(order_id) = data.get("orderId").and_then(Json::as_u64) {
            let returned = data.get("returned").map(Value::from_json).unwrap_or_default();
            return Self {
                order_id: Some(order_id),
                returned,
            };
        }
        Self {
            order_id: None,
            returned: Value::from_json(data),
        }
    }
}

/// The state tree inside a `delta`: either the data itself or `{game: ..}`.
pub fn delta_root(data: &Json) -> &Json {
    match data {
        Json::Object(map) if map.len() == 1 => map.get("game").unwrap_or(data),
        _ => data,
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<GameObjectId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => GameObjectId::from(s),
        RawId::Number(n) => GameObjectId::from(n),
    })
}

// ============== Utility Functions ==============

/// Create the `alias` message resolving a game alias to its canonical name
pub fn create_alias(game_alias: &str) -> Envelope {
    Envelope::new(events::ALIAS, Json::String(game_alias.to_string()))
}

/// Create a `play` request
pub fn create_play(
    player_name: &str,
    game_name: &str,
    requested_session: &str,
) -> PlayRequest {
    PlayRequest {
        client_type: CLIENT_TYPE.to_string(),
        player_name: player_name.to_string(),
        player_index: None,
        game_name: game_name.to_string(),
        password: None,
        game_settings: None,
        requested_session: requested_session.to_string(),
    }
}

/// Create a `run` message invoking `function_name` on `caller`
pub fn create_run(
    order_id: u64,
    caller: &GameObjectId,
    function_name: &str,
    args: Map<String, Json>,
) -> Result<Envelope, serde_json::Error> {
    let run = RunRequest {
        caller: CallerRef {
            id: caller.as_str().to_string(),
        },
        function_name: function_name.to_string(),
        args,
        order_id,
    };
    Ok(Envelope::new(events::RUN, serde_json::to_value(run)?))
}

/// Create a `finished` reply for server order `order_index`
pub fn create_finished(order_index: i64, returned: &Value) -> Result<Envelope, serde_json::Error> {
    let reply = FinishedReply {
        order_index,
        returned: returned.to_json(),
    };
    Ok(Envelope::new(events::FINISHED, serde_json::to_value(reply)?))
}

/// Get current timestamp in milliseconds
fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
