//! The subscription registry and broadcast engine.
//!
//! The registry owns every piece of shared state: the channel table, the
//! connection→channels index, presence, and typing. Connections themselves
//! are owned by their transport tasks; the registry holds send handles only
//! and never blocks on I/O while a table guard is held: every push is a
//! non-blocking enqueue onto the target connection's outbound buffer.

use crate::channel::{validate_channel_name, Channel, Subscription};
use crate::connection::{ConnectionHandle, ConnectionId, Identity};
use crate::typing::{TypingTracker, DEFAULT_TYPING_IDLE};
use dashmap::DashMap;
use ripple_protocol::{
    encode_push, EventKind, StatusUpdate, StopTyping, TypingRoster, TypingUser,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Idle window after which a typing entry expires.
    pub typing_idle: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            typing_idle: DEFAULT_TYPING_IDLE,
        }
    }
}

/// What a subscribe call did.
///
/// Rejections are silent from the client's point of view; the outcome
/// exists so glue code and metrics can tell the cases apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// New subscription; a presence broadcast went out.
    Subscribed,
    /// Same connection+user already subscribed; nothing changed.
    Duplicate,
    /// Claimed user did not match the verified identity; nothing changed.
    IdentityMismatch,
    /// Channel name failed validation; nothing changed.
    InvalidChannel,
}

/// Per-connection bookkeeping, mirrored against the channel table.
#[derive(Debug)]
struct ConnectionEntry {
    handle: Arc<ConnectionHandle>,
    user_id: String,
    channels: HashSet<String>,
}

/// Per-channel subscriber count for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    /// Channel name.
    pub name: String,
    /// Number of subscribed connections.
    pub subscribers: usize,
}

/// Read-only registry snapshot.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of active channels.
    pub channel_count: usize,
    /// Number of connections holding at least one subscription.
    pub connection_count: usize,
    /// Total number of subscriptions.
    pub total_subscriptions: usize,
    /// Per-channel subscriber counts, sorted by name.
    pub channels: Vec<ChannelStats>,
}

/// The central registry.
pub struct Registry {
    /// Channels indexed by name.
    channels: DashMap<String, Channel>,
    /// Connection index (connection id -> subscribed channels).
    connections: DashMap<ConnectionId, ConnectionEntry>,
    /// Typing state; broadcasts through this registry.
    typing: TypingTracker,
    /// Configuration.
    config: RegistryConfig,
}

impl Registry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating registry with config: {:?}", config);
        Self {
            channels: DashMap::new(),
            connections: DashMap::new(),
            typing: TypingTracker::new(),
            config,
        }
    }

    /// Subscribe a connection to a channel under a claimed user id.
    ///
    /// If the connection carries a verified identity whose user differs
    /// from the claim, the call changes nothing and only leaves an audit
    /// log; the client is never told. Duplicate subscriptions are a
    /// no-op. A new subscription triggers exactly one presence broadcast,
    /// carrying the online set as of after the update.
    pub fn subscribe(
        &self,
        channel_name: &str,
        conn: &Arc<ConnectionHandle>,
        user_id: &str,
        identity: Option<&Identity>,
    ) -> SubscribeOutcome {
        if let Some(identity) = identity {
            if identity.user_id != user_id {
                warn!(
                    connection = %conn.id(),
                    claimed = %user_id,
                    verified = %identity.user_id,
                    "Subscribe rejected: claimed user does not match credential"
                );
                return SubscribeOutcome::IdentityMismatch;
            }
        }

        if let Err(reason) = validate_channel_name(channel_name) {
            warn!(connection = %conn.id(), channel = %channel_name, %reason, "Subscribe rejected");
            return SubscribeOutcome::InvalidChannel;
        }

        let conn_id = conn.id().clone();
        let online_users;
        {
            let mut channel = self
                .channels
                .entry(channel_name.to_string())
                .or_insert_with(|| {
                    debug!(channel = %channel_name, "Creating channel");
                    Channel::new(channel_name)
                });

            if let Some(existing) = channel.subscription(&conn_id) {
                if existing.user_id == user_id {
                    trace!(
                        connection = %conn_id,
                        channel = %channel_name,
                        "Duplicate subscribe ignored"
                    );
                    return SubscribeOutcome::Duplicate;
                }
                // Same socket re-subscribing under a new user id; only
                // reachable on transports without a verified identity.
                // Drop the old binding before counting the new one.
                let previous = existing.user_id.clone();
                channel.remove(&conn_id);
                channel.presence_mut().leave(&previous);
            }

            channel.insert(Arc::clone(conn), user_id);
            channel.presence_mut().join(user_id);
            online_users = channel.presence().snapshot();
        }

        let mut entry = self
            .connections
            .entry(conn_id.clone())
            .or_insert_with(|| ConnectionEntry {
                handle: Arc::clone(conn),
                user_id: user_id.to_string(),
                channels: HashSet::new(),
            });
        entry.user_id = user_id.to_string();
        entry.channels.insert(channel_name.to_string());
        drop(entry);

        debug!(
            channel = %channel_name,
            connection = %conn_id,
            user = %user_id,
            "Subscribed"
        );

        self.push_to_channel(
            channel_name,
            EventKind::MemberStatusUpdate,
            &StatusUpdate {
                user_id: user_id.to_string(),
                is_online: true,
                online_users,
            },
            None,
        );

        SubscribeOutcome::Subscribed
    }

    /// Unsubscribe a connection from a single channel.
    ///
    /// Idempotent: unsubscribing an absent pair is a no-op. The presence
    /// set is updated so it keeps mirroring live subscriptions, but no
    /// presence-offline broadcast goes out here; only teardown emits
    /// offline transitions.
    pub fn unsubscribe(&self, channel_name: &str, connection_id: &ConnectionId) {
        let removed;
        {
            let Some(mut channel) = self.channels.get_mut(channel_name) else {
                debug!(channel = %channel_name, "Unsubscribe from unknown channel");
                return;
            };
            removed = channel.remove(connection_id);
            if let Some(sub) = &removed {
                channel.presence_mut().leave(&sub.user_id);
            }
        }

        if removed.is_none() {
            debug!(
                channel = %channel_name,
                connection = %connection_id,
                "Unsubscribe for absent subscription"
            );
            return;
        }

        self.reap_if_empty(channel_name);

        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.channels.remove(channel_name);
            if entry.channels.is_empty() {
                drop(entry);
                self.connections.remove(connection_id);
                debug!(connection = %connection_id, "Connection index purged");
            }
        }

        debug!(channel = %channel_name, connection = %connection_id, "Unsubscribed");
    }

    /// Tear down everything a closed connection left behind.
    ///
    /// For every channel the connection was subscribed to this emits a
    /// presence-offline broadcast, evicts the user's typing entry (with a
    /// stop-typing broadcast if one existed), and removes the
    /// subscription. Calling it for an unknown connection (including a
    /// second time) is a no-op.
    pub fn teardown(&self, connection_id: &ConnectionId) {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            debug!(connection = %connection_id, "Teardown for unknown connection");
            return;
        };

        debug!(
            connection = %connection_id,
            user = %entry.user_id,
            channels = entry.channels.len(),
            "Tearing down connection"
        );

        for channel_name in &entry.channels {
            let mut offline = None;
            if let Some(mut channel) = self.channels.get_mut(channel_name) {
                if let Some(sub) = channel.remove(connection_id) {
                    channel.presence_mut().leave(&sub.user_id);
                    offline = Some((sub.user_id, channel.presence().snapshot()));
                }
            }

            let Some((user_id, online_users)) = offline else {
                continue;
            };

            self.push_to_channel(
                channel_name,
                EventKind::MemberStatusUpdate,
                &StatusUpdate {
                    user_id: user_id.clone(),
                    is_online: false,
                    online_users,
                },
                None,
            );

            let (removed, remaining) = self.typing.stop(channel_name, &user_id);
            if let Some(removed) = removed {
                self.push_to_channel(
                    channel_name,
                    EventKind::MemberStopTyping,
                    &StopTyping {
                        user_id: removed.user_id,
                        display_name: removed.display_name,
                        remaining_typing_users: remaining,
                    },
                    None,
                );
            }

            self.reap_if_empty(channel_name);
        }
    }

    /// Broadcast a pre-validated event payload to a channel.
    ///
    /// An absent channel is a logged no-op, not an error. The payload is
    /// serialized once; every open subscriber gets the identical bytes. A
    /// subscriber that is not open, or whose buffer rejects the frame, is
    /// skipped without affecting the rest of the sweep.
    ///
    /// Returns the number of subscribers the frame was handed to.
    pub fn broadcast(
        &self,
        channel_name: &str,
        event: EventKind,
        data: &serde_json::Value,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        self.push_to_channel(channel_name, event, data, exclude)
    }

    /// Record a typing transition and broadcast it.
    ///
    /// Start signals insert or refresh the entry and broadcast the full
    /// roster; stop signals are idempotent, so an absent entry still
    /// produces a stop broadcast.
    ///
    /// Returns the number of subscribers reached.
    pub fn set_typing(
        &self,
        channel_name: &str,
        user_id: &str,
        display_name: &str,
        is_typing: bool,
    ) -> usize {
        if is_typing {
            let typing_users = self
                .typing
                .start(channel_name, user_id, display_name, Instant::now());
            self.push_to_channel(
                channel_name,
                EventKind::MemberTyping,
                &TypingRoster { typing_users },
                None,
            )
        } else {
            let (removed, remaining_typing_users) = self.typing.stop(channel_name, user_id);
            let display_name = removed
                .map(|e| e.display_name)
                .unwrap_or_else(|| display_name.to_string());
            self.push_to_channel(
                channel_name,
                EventKind::MemberStopTyping,
                &StopTyping {
                    user_id: user_id.to_string(),
                    display_name,
                    remaining_typing_users,
                },
                None,
            )
        }
    }

    /// Evict typing entries idle past the configured window, broadcasting
    /// one stop-typing per eviction.
    ///
    /// Returns the number of evictions.
    pub fn sweep_typing(&self, now: Instant) -> usize {
        let evictions = self.typing.evict_idle(now, self.config.typing_idle);
        let count = evictions.len();

        for eviction in evictions {
            debug!(
                channel = %eviction.channel,
                user = %eviction.user_id,
                "Typing entry expired"
            );
            self.push_to_channel(
                &eviction.channel,
                EventKind::MemberStopTyping,
                &StopTyping {
                    user_id: eviction.user_id,
                    display_name: eviction.display_name,
                    remaining_typing_users: eviction.remaining,
                },
                None,
            );
        }

        count
    }

    /// Tear down connections whose handle is no longer open, then sweep
    /// channels for subscriptions left behind by handles that died without
    /// ever reaching the connection index.
    ///
    /// Returns the number of connections reaped.
    pub fn reap_stale(&self) -> usize {
        let stale: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| !entry.handle.is_open())
            .map(|entry| entry.key().clone())
            .collect();

        for connection_id in &stale {
            debug!(connection = %connection_id, "Reaping stale connection");
            self.teardown(connection_id);
        }

        let names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        for name in names {
            {
                let Some(mut channel) = self.channels.get_mut(&name) else {
                    continue;
                };
                let dead: Vec<ConnectionId> = channel
                    .subscriptions()
                    .iter()
                    .filter(|sub| !sub.conn.is_open())
                    .map(|sub| sub.conn.id().clone())
                    .collect();
                for connection_id in dead {
                    debug!(channel = %name, connection = %connection_id, "Dropping orphaned subscription");
                    if let Some(sub) = channel.remove(&connection_id) {
                        channel.presence_mut().leave(&sub.user_id);
                    }
                }
            }
            self.reap_if_empty(&name);
        }

        stale.len()
    }

    /// Read-only snapshot for health reporting.
    ///
    /// Only copies counts; never blocks writers beyond the per-shard reads.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut channels: Vec<ChannelStats> = self
            .channels
            .iter()
            .map(|entry| ChannelStats {
                name: entry.key().clone(),
                subscribers: entry.subscriber_count(),
            })
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));

        RegistryStats {
            channel_count: channels.len(),
            connection_count: self.connections.len(),
            total_subscriptions: channels.iter().map(|c| c.subscribers).sum(),
            channels,
        }
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn channel_exists(&self, channel_name: &str) -> bool {
        self.channels.contains_key(channel_name)
    }

    /// Get the channels a connection is subscribed to.
    #[must_use]
    pub fn connection_channels(&self, connection_id: &ConnectionId) -> Vec<String> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.channels.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Check if a connection is subscribed to a channel.
    #[must_use]
    pub fn is_subscribed(&self, channel_name: &str, connection_id: &ConnectionId) -> bool {
        self.channels
            .get(channel_name)
            .map(|channel| channel.is_subscribed(connection_id))
            .unwrap_or(false)
    }

    /// Current presence snapshot for a channel.
    #[must_use]
    pub fn online_users(&self, channel_name: &str) -> Vec<String> {
        self.channels
            .get(channel_name)
            .map(|channel| channel.presence().snapshot())
            .unwrap_or_default()
    }

    /// Current typing roster for a channel.
    #[must_use]
    pub fn typing_users(&self, channel_name: &str) -> Vec<TypingUser> {
        self.typing.roster(channel_name)
    }

    fn reap_if_empty(&self, channel_name: &str) {
        if self
            .channels
            .remove_if(channel_name, |_, channel| channel.is_empty())
            .is_some()
        {
            debug!(channel = %channel_name, "Deleted empty channel");
        }
    }

    fn push_to_channel<T: Serialize>(
        &self,
        channel_name: &str,
        event: EventKind,
        data: &T,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let targets: Vec<Subscription> = match self.channels.get(channel_name) {
            Some(channel) => channel.subscriptions(),
            None => {
                warn!(channel = %channel_name, event = %event, "Broadcast to non-existent channel");
                return 0;
            }
        };

        let frame = match encode_push(event, data) {
            Ok(frame) => frame,
            Err(e) => {
                error!(channel = %channel_name, event = %event, error = %e, "Failed to encode push");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut skipped = 0;
        for sub in &targets {
            if let Some(excluded) = exclude {
                if sub.conn.id() == excluded {
                    continue;
                }
            }
            if !sub.conn.is_open() {
                skipped += 1;
                continue;
            }
            match sub.conn.enqueue(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    skipped += 1;
                    warn!(
                        connection = %sub.conn.id(),
                        channel = %channel_name,
                        error = %e,
                        "Dropped push"
                    );
                }
            }
        }

        trace!(
            channel = %channel_name,
            event = %event,
            delivered,
            skipped,
            "Broadcast"
        );
        delivered
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
