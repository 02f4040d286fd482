//! # ripple-core
//!
//! Subscription registry and broadcast engine for the Ripple fan-out relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - Channel subscriptions, broadcast fan-out, cleanup
//! - **Channel** - Subscriber set with co-located presence
//! - **Presence** - Reference-counted per-channel online sets
//! - **TypingTracker** - Ephemeral typing state with idle expiry
//! - **ConnectionHandle** - Non-owning, non-blocking send handle
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│  Registry   │────▶│  Channel    │
//! └─────────────┘     └─────────────┘     │ + Presence  │
//!                            │            └─────────────┘
//!                            ▼
//!                     ┌─────────────┐
//!                     │   Typing    │
//!                     └─────────────┘
//! ```
//!
//! The registry is the sole owner of subscription, presence, and typing
//! state. Connections are owned by their transport tasks; the registry
//! holds send handles only and reclaims a connection's footprint exactly
//! once, through [`Registry::teardown`].

pub mod channel;
pub mod connection;
pub mod presence;
pub mod registry;
pub mod sweep;
pub mod typing;

pub use channel::{validate_channel_name, Channel, Subscription};
pub use connection::{ConnectionHandle, ConnectionId, ConnectionState, DeliveryError, Identity};
pub use presence::Presence;
pub use registry::{ChannelStats, Registry, RegistryConfig, RegistryStats, SubscribeOutcome};
pub use sweep::{spawn_sweepers, SweepConfig};
pub use typing::{TypingEntry, TypingTracker};
