//! Connection handles and identities.
//!
//! The transport task owns the socket and the receiving half of the
//! outbound buffer; everything else holds an [`Arc<ConnectionHandle>`] and
//! can only enqueue frames and observe liveness.

use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(format!("conn_{:x}", timestamp))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Liveness of a connection as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Accepting frames.
    Open = 0,
    /// Server-initiated close in progress; no more pushes.
    Closing = 1,
    /// Gone. Waiting to be reaped.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Verified identity attached to a connection at accept time.
///
/// Immutable for the connection's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Stable user id from the credential's subject.
    pub user_id: String,
    /// Name shown next to messages.
    pub display_name: String,
    /// Avatar reference, if any.
    pub avatar_url: Option<String>,
}

/// Errors from enqueueing an outbound frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Connection is closing or closed.
    #[error("connection is not open")]
    NotOpen,

    /// The peer stopped draining its buffer.
    #[error("outbound buffer full")]
    BufferFull,
}

/// Send-side handle for one client connection.
///
/// Enqueueing never blocks: frames go onto a bounded buffer drained by the
/// connection's writer task, so one stalled peer fills its own buffer and
/// starts losing frames without holding anyone else up.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Bytes>,
    state: AtomicU8,
}

impl ConnectionHandle {
    /// Create a handle and the receiving half of its outbound buffer.
    ///
    /// The receiver goes to the writer task that owns the socket.
    #[must_use]
    pub fn channel(id: ConnectionId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Arc::new(Self {
            id,
            outbound: tx,
            state: AtomicU8::new(ConnectionState::Open as u8),
        });
        (handle, rx)
    }

    /// Get the connection's unique identifier.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Current liveness state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Check if the connection accepts pushes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Mark a server-initiated close as in progress.
    pub fn begin_close(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Open as u8,
            ConnectionState::Closing as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Mark the connection as gone.
    pub fn mark_closed(&self) {
        let previous = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::SeqCst);
        if previous != ConnectionState::Closed as u8 {
            debug!(connection = %self.id, "Connection closed");
        }
    }

    /// Enqueue a frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not open or its buffer is full.
    /// Either way the frame is dropped; there is no retry.
    pub fn enqueue(&self, frame: Bytes) -> Result<(), DeliveryError> {
        if !self.is_open() {
            return Err(DeliveryError::NotOpen);
        }

        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(DeliveryError::BufferFull),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                Err(DeliveryError::NotOpen)
            }
        }
    }
}
