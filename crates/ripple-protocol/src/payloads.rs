//! Typed payloads for server-originated pushes.
//!
//! These are the `data` halves of [`PushFrame`](crate::PushFrame) envelopes
//! built by the core itself (presence and typing). Message events carry
//! producer-supplied payloads and have no fixed shape here.

use serde::{Deserialize, Serialize};

/// Payload of a `MEMBER_STATUS_UPDATE` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    /// User whose status changed.
    pub user_id: String,
    /// The transition being signaled.
    pub is_online: bool,
    /// Online set for the channel, after the mutation.
    pub online_users: Vec<String>,
}

/// One member of a channel's typing roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUser {
    pub user_id: String,
    pub display_name: String,
}

/// Payload of a `member-typing` push: the full roster after the refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRoster {
    pub typing_users: Vec<TypingUser>,
}

/// Payload of a `member-stop-typing` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTyping {
    /// User who stopped typing.
    pub user_id: String,
    pub display_name: String,
    /// Roster remaining after the removal.
    pub remaining_typing_users: Vec<TypingUser>,
}

/// Typing signal fields expected inside an ingestion message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub user_id: String,
    pub display_name: String,
}
