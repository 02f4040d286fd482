//! Channel state: the subscriber set with its co-located presence.
//!
//! A channel is nothing more than its subscribers. It is created implicitly
//! by the first subscribe and reaped by the registry once the last
//! subscriber is gone.

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::presence::Presence;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("channel name too long");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("channel name contains invalid characters");
    }
    Ok(())
}

/// One connection's membership in a channel.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Send handle for the subscribed connection.
    pub conn: Arc<ConnectionHandle>,
    /// User the subscription belongs to.
    pub user_id: String,
}

/// A named broadcast group.
#[derive(Debug)]
pub struct Channel {
    name: String,
    subscribers: HashMap<ConnectionId, Subscription>,
    presence: Presence,
}

impl Channel {
    /// Create a new, empty channel.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: HashMap::new(),
            presence: Presence::new(),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if a connection is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, connection_id: &ConnectionId) -> bool {
        self.subscribers.contains_key(connection_id)
    }

    /// Get a connection's subscription, if any.
    #[must_use]
    pub fn subscription(&self, connection_id: &ConnectionId) -> Option<&Subscription> {
        self.subscribers.get(connection_id)
    }

    /// Insert a subscription for a connection.
    pub fn insert(&mut self, conn: Arc<ConnectionHandle>, user_id: impl Into<String>) {
        let conn_id = conn.id().clone();
        self.subscribers.insert(
            conn_id,
            Subscription {
                conn,
                user_id: user_id.into(),
            },
        );
    }

    /// Remove a connection's subscription.
    ///
    /// Returns the removed subscription, if the connection was subscribed.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Subscription> {
        self.subscribers.remove(connection_id)
    }

    /// Snapshot of all current subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscribers.values().cloned().collect()
    }

    /// The channel's presence set.
    #[must_use]
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Mutable access to the channel's presence set.
    pub fn presence_mut(&mut self) -> &mut Presence {
        &mut self.presence
    }

    /// Check if the channel has no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> Arc<ConnectionHandle> {
        ConnectionHandle::channel(id.into(), 4).0
    }

    #[test]
    fn test_channel_creation() {
        let channel = Channel::new("general");
        assert_eq!(channel.name(), "general");
        assert_eq!(channel.subscriber_count(), 0);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_insert_remove() {
        let mut channel = Channel::new("general");
        let c1 = conn("c1");

        channel.insert(Arc::clone(&c1), "u1");
        assert_eq!(channel.subscriber_count(), 1);
        assert!(channel.is_subscribed(c1.id()));
        assert_eq!(channel.subscription(c1.id()).unwrap().user_id, "u1");

        let removed = channel.remove(c1.id()).unwrap();
        assert_eq!(removed.user_id, "u1");
        assert!(channel.is_empty());

        // Removing again is a no-op.
        assert!(channel.remove(c1.id()).is_none());
    }

    #[test]
    fn test_insert_same_connection_overwrites() {
        let mut channel = Channel::new("general");
        let c1 = conn("c1");

        channel.insert(Arc::clone(&c1), "u1");
        channel.insert(Arc::clone(&c1), "u2");

        assert_eq!(channel.subscriber_count(), 1);
        assert_eq!(channel.subscription(c1.id()).unwrap().user_id, "u2");
    }

    #[test]
    fn test_channel_name_validation() {
        assert!(validate_channel_name("general").is_ok());
        assert!(validate_channel_name("chat:lobby").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("bad\ncontrol").is_err());

        let long_name = "a".repeat(MAX_CHANNEL_NAME_LENGTH + 1);
        assert!(validate_channel_name(&long_name).is_err());
    }
}
