//! Typing indicator state with idle expiry.
//!
//! The tracker holds its own per-channel maps, independent of the
//! subscription tables; all broadcasts triggered by typing transitions go
//! out through the registry. Mutators take an explicit `Instant` where
//! timing matters, so expiry is testable without sleeping.

use dashmap::DashMap;
use ripple_protocol::TypingUser;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Idle window after which a typing entry expires without a refresh.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(3);

/// One user currently typing in a channel.
#[derive(Debug, Clone)]
pub struct TypingEntry {
    /// User the entry belongs to.
    pub user_id: String,
    /// Name shown in the client's typing indicator.
    pub display_name: String,
    /// Last start/refresh signal.
    pub last_seen: Instant,
}

/// A typing entry evicted by the idle sweep.
#[derive(Debug, Clone)]
pub struct Eviction {
    /// Channel the entry lived in.
    pub channel: String,
    /// User whose entry expired.
    pub user_id: String,
    /// Display name from the expired entry.
    pub display_name: String,
    /// Roster remaining in the channel after this eviction.
    pub remaining: Vec<TypingUser>,
}

/// Tracks who is typing in which channel.
#[derive(Debug, Default)]
pub struct TypingTracker {
    channels: DashMap<String, HashMap<String, TypingEntry>>,
}

fn roster_of(entries: &HashMap<String, TypingEntry>) -> Vec<TypingUser> {
    let mut roster: Vec<TypingUser> = entries
        .values()
        .map(|e| TypingUser {
            user_id: e.user_id.clone(),
            display_name: e.display_name.clone(),
        })
        .collect();
    roster.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    roster
}

impl TypingTracker {
    /// Create a new tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a typing entry.
    ///
    /// Returns the channel's roster after the update.
    pub fn start(
        &self,
        channel: &str,
        user_id: &str,
        display_name: &str,
        now: Instant,
    ) -> Vec<TypingUser> {
        let mut entries = self.channels.entry(channel.to_string()).or_default();
        entries.insert(
            user_id.to_string(),
            TypingEntry {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                last_seen: now,
            },
        );
        roster_of(&entries)
    }

    /// Remove a user's typing entry, if present.
    ///
    /// Returns the removed entry (if any) and the roster remaining after
    /// the removal. A channel whose map empties is dropped entirely.
    pub fn stop(&self, channel: &str, user_id: &str) -> (Option<TypingEntry>, Vec<TypingUser>) {
        let result = match self.channels.get_mut(channel) {
            Some(mut entries) => {
                let removed = entries.remove(user_id);
                (removed, roster_of(&entries))
            }
            None => (None, Vec::new()),
        };

        self.channels.remove_if(channel, |_, entries| entries.is_empty());
        result
    }

    /// Evict entries idle past `idle` as of `now`.
    ///
    /// Lock scope is one channel's map per iteration; each eviction carries
    /// the roster remaining at the moment it was taken.
    pub fn evict_idle(&self, now: Instant, idle: Duration) -> Vec<Eviction> {
        let names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        let mut evictions = Vec::new();

        for name in names {
            if let Some(mut entries) = self.channels.get_mut(&name) {
                let expired: Vec<String> = entries
                    .values()
                    .filter(|e| now.duration_since(e.last_seen) > idle)
                    .map(|e| e.user_id.clone())
                    .collect();

                for user_id in expired {
                    if let Some(removed) = entries.remove(&user_id) {
                        evictions.push(Eviction {
                            channel: name.clone(),
                            user_id: removed.user_id,
                            display_name: removed.display_name,
                            remaining: roster_of(&entries),
                        });
                    }
                }
            }

            if self
                .channels
                .remove_if(&name, |_, entries| entries.is_empty())
                .is_some()
            {
                debug!(channel = %name, "Dropped empty typing map");
            }
        }

        evictions
    }

    /// Current roster for a channel.
    #[must_use]
    pub fn roster(&self, channel: &str) -> Vec<TypingUser> {
        self.channels
            .get(channel)
            .map(|entries| roster_of(&entries))
            .unwrap_or_default()
    }

    /// Number of channels with at least one typing entry.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(3);

    #[test]
    fn test_start_and_refresh() {
        let tracker = TypingTracker::new();
        let t0 = Instant::now();

        let roster = tracker.start("general", "u1", "Alice", t0);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_id, "u1");

        // Refresh keeps one entry per user.
        let roster = tracker.start("general", "u1", "Alice", t0 + Duration::from_secs(1));
        assert_eq!(roster.len(), 1);

        let roster = tracker.start("general", "u2", "Bob", t0);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_stop() {
        let tracker = TypingTracker::new();
        tracker.start("general", "u1", "Alice", Instant::now());
        tracker.start("general", "u2", "Bob", Instant::now());

        let (removed, remaining) = tracker.stop("general", "u1");
        assert_eq!(removed.unwrap().display_name, "Alice");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "u2");
    }

    #[test]
    fn test_stop_absent_entry() {
        let tracker = TypingTracker::new();
        tracker.start("general", "u1", "Alice", Instant::now());

        let (removed, remaining) = tracker.stop("general", "ghost");
        assert!(removed.is_none());
        assert_eq!(remaining.len(), 1);

        let (removed, remaining) = tracker.stop("empty-channel", "u1");
        assert!(removed.is_none());
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_channel_dropped_when_last_entry_stops() {
        let tracker = TypingTracker::new();
        tracker.start("general", "u1", "Alice", Instant::now());
        assert_eq!(tracker.channel_count(), 1);

        tracker.stop("general", "u1");
        assert_eq!(tracker.channel_count(), 0);
    }

    #[test]
    fn test_evict_idle() {
        let tracker = TypingTracker::new();
        let t0 = Instant::now();

        tracker.start("general", "u1", "Alice", t0);
        tracker.start("general", "u2", "Bob", t0 + Duration::from_secs(2));

        // At t=4, only u1 has been idle longer than the threshold.
        let evictions = tracker.evict_idle(t0 + Duration::from_secs(4), IDLE);
        assert_eq!(evictions.len(), 1);
        assert_eq!(evictions[0].user_id, "u1");
        assert_eq!(evictions[0].remaining.len(), 1);
        assert_eq!(evictions[0].remaining[0].user_id, "u2");

        // Nothing further to evict until u2 ages out too.
        assert!(tracker.evict_idle(t0 + Duration::from_secs(4), IDLE).is_empty());

        let evictions = tracker.evict_idle(t0 + Duration::from_secs(10), IDLE);
        assert_eq!(evictions.len(), 1);
        assert_eq!(evictions[0].user_id, "u2");
        assert!(evictions[0].remaining.is_empty());
        assert_eq!(tracker.channel_count(), 0);
    }

    #[test]
    fn test_refresh_defers_eviction() {
        let tracker = TypingTracker::new();
        let t0 = Instant::now();

        tracker.start("general", "u1", "Alice", t0);
        tracker.start("general", "u1", "Alice", t0 + Duration::from_secs(3));

        assert!(tracker.evict_idle(t0 + Duration::from_secs(4), IDLE).is_empty());
        assert_eq!(tracker.roster("general").len(), 1);
    }
}
