//! Frame types exchanged with clients and producers.
//!
//! Client frames arrive as JSON text on the WebSocket; pushes leave as one
//! JSON envelope per logical broadcast; ingestion requests arrive as HTTP
//! bodies with the same event vocabulary.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::events::EventKind;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding error.
    #[error("encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Client-supplied profile attached to a subscribe frame.
///
/// Advisory only; the verified identity from the bearer credential is what
/// the server trusts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Name shown next to messages and typing indicators.
    pub display_name: String,

    /// Avatar reference, if the client has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Inbound frames read from a client socket.
///
/// Only `subscribe` carries meaning. Every other `type` value parses to
/// [`ClientFrame::Unknown`] and is dropped without a reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Join a channel under a claimed user id.
    #[serde(rename = "subscribe", rename_all = "camelCase")]
    Subscribe {
        /// Channel to join.
        channel_name: String,
        /// Claimed user id; checked against the verified identity.
        user_id: String,
        /// Optional profile data.
        #[serde(default)]
        user_info: Option<UserInfo>,
    },

    /// Any unrecognized frame type.
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    /// Decode a client frame from socket text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON for any frame shape.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

/// Envelope for every server-to-client push: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    /// Event kind, serialized under its wire name.
    pub event: EventKind,
    /// Event-specific payload.
    pub data: Value,
}

impl PushFrame {
    /// Create a new push frame.
    #[must_use]
    pub fn new(event: EventKind, data: Value) -> Self {
        Self { event, data }
    }

    /// Encode to the JSON bytes sent on the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(ProtocolError::Encode)
    }
}

/// Encode a push envelope around any serializable payload.
///
/// Produces the same bytes as building a [`PushFrame`] through
/// `serde_json::Value`, without the intermediate tree.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_push<T: serde::Serialize>(
    event: EventKind,
    data: &T,
) -> Result<Bytes, ProtocolError> {
    #[derive(Serialize)]
    struct Envelope<'a, T> {
        event: EventKind,
        data: &'a T,
    }

    serde_json::to_vec(&Envelope { event, data })
        .map(Bytes::from)
        .map_err(ProtocolError::Encode)
}

/// Body of an ingestion request from the producer service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    /// Event kind; unknown kinds fail deserialization at the boundary.
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Target channel.
    pub channel_name: String,

    /// Event payload, forwarded verbatim for message events and mined for
    /// typing signal fields for typing events.
    pub message: Value,
}
