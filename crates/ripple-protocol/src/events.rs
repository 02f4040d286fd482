//! Event kinds carried on the wire.
//!
//! The serialized names are load-bearing: deployed clients switch on the
//! exact strings, so they are part of the public contract.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The vocabulary of broadcast events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Channel join request. Client → server only; never pushed outbound.
    #[serde(rename = "subscribe")]
    Subscribe,

    /// A new chat message was posted.
    #[serde(rename = "new-message")]
    NewMessage,

    /// An existing message was edited.
    #[serde(rename = "message-update")]
    MessageUpdate,

    /// A message was deleted.
    #[serde(rename = "message-delete")]
    MessageDelete,

    /// A member started (or refreshed) typing.
    #[serde(rename = "member-typing")]
    MemberTyping,

    /// A member stopped typing, explicitly or by idle expiry.
    #[serde(rename = "member-stop-typing")]
    MemberStopTyping,

    /// Online/offline presence transition. The screaming-snake name predates
    /// the kebab-case siblings and clients match on it verbatim.
    #[serde(rename = "MEMBER_STATUS_UPDATE")]
    MemberStatusUpdate,
}

impl EventKind {
    /// Get the wire name of this event kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Subscribe => "subscribe",
            EventKind::NewMessage => "new-message",
            EventKind::MessageUpdate => "message-update",
            EventKind::MessageDelete => "message-delete",
            EventKind::MemberTyping => "member-typing",
            EventKind::MemberStopTyping => "member-stop-typing",
            EventKind::MemberStatusUpdate => "MEMBER_STATUS_UPDATE",
        }
    }

    /// Whether this kind is a typing signal routed through the typing
    /// tracker rather than broadcast verbatim.
    #[must_use]
    pub fn is_typing_signal(&self) -> bool {
        matches!(self, EventKind::MemberTyping | EventKind::MemberStopTyping)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
