//! # ripple-protocol
//!
//! Wire protocol definitions for the Ripple realtime fan-out relay.
//!
//! Everything on the wire is JSON. Clients send newline-free text frames,
//! the server pushes one `{"event": ..., "data": ...}` envelope per logical
//! broadcast, and the producer service submits broadcasts over HTTP with
//! the same event vocabulary.
//!
//! ## Frame directions
//!
//! - [`ClientFrame`] - client → server (only `subscribe` is meaningful)
//! - [`PushFrame`] - server → client push envelope
//! - [`BroadcastRequest`] - producer → server ingestion body
//!
//! ## Example
//!
//! ```rust
//! use ripple_protocol::{EventKind, PushFrame};
//! use serde_json::json;
//!
//! let frame = PushFrame::new(EventKind::NewMessage, json!({"body": "hi"}));
//! let encoded = frame.to_bytes().unwrap();
//! assert!(std::str::from_utf8(&encoded).unwrap().contains("new-message"));
//! ```

pub mod events;
pub mod frames;
pub mod payloads;

pub use events::EventKind;
pub use frames::{encode_push, BroadcastRequest, ClientFrame, ProtocolError, PushFrame, UserInfo};
pub use payloads::{StatusUpdate, StopTyping, TypingRoster, TypingSignal, TypingUser};
