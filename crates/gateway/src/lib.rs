//! Gateway: HTTP/WebSocket front end for the host registry.
//!
//! Lifecycle:
//! 1. Load + validate config
//! 2. Build the registry and the ICE provider
//! 3. Start the HTTP server (host, user, health, ICE routes)
//! 4. Attach the signaling relay upgrade handler
//! 5. Run the reaper until shutdown
//!
//! Registry semantics live in `lobby-registry`; handlers here only translate
//! between JSON and registry calls.

pub mod api;
pub mod error;
pub mod relay;
pub mod server;
pub mod state;
pub mod ws;

pub use {
    error::{ApiError, ApiResult},
    server::{build_gateway_app, serve, start_gateway},
    state::GatewayState,
};
