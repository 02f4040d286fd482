//! Per-channel presence tracking.
//!
//! Presence is derived state: a user is online in a channel iff the channel
//! holds at least one live subscription for them. The set is reference
//! counted so a user with several connections (multiple tabs) stays present
//! until the last one goes away.

use std::collections::HashMap;

/// Reference-counted online set for one channel.
///
/// Lives inside the channel entry and shares its locking; the registry is
/// the only mutator.
#[derive(Debug, Default)]
pub struct Presence {
    members: HashMap<String, usize>,
}

impl Presence {
    /// Create a new presence set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of online users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Check if a user is present.
    #[must_use]
    pub fn is_present(&self, user_id: &str) -> bool {
        self.members.contains_key(user_id)
    }

    /// Count one live subscription for a user.
    ///
    /// Returns `true` if the user was not previously present.
    pub fn join(&mut self, user_id: impl Into<String>) -> bool {
        let count = self.members.entry(user_id.into()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Release one live subscription for a user.
    ///
    /// Returns `true` if this removed the user's last reference.
    pub fn leave(&mut self, user_id: &str) -> bool {
        match self.members.get_mut(user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.members.remove(user_id);
                true
            }
            None => false,
        }
    }

    /// Sorted snapshot of online user ids.
    ///
    /// Sorted so payloads built from it are deterministic.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self.members.keys().cloned().collect();
        users.sort();
        users
    }

    /// Check if nobody is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
