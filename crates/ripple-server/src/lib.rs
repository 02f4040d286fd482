//! # ripple-server
//!
//! Thin glue around [`ripple_core`]: WebSocket acceptance with bearer
//! credential verification, the producer-facing ingestion endpoint, health
//! reporting, configuration, and metrics. The registry and everything with
//! real invariants lives in `ripple-core`; this crate only wires it to the
//! outside world.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod metrics;

pub use auth::{AuthError, AuthVerifier};
pub use config::Config;
pub use handlers::{run_server, serve, AppState};
