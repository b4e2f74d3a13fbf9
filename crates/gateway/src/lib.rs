//! HTTP front door: WhatsApp webhook, health and metrics endpoints.
//!
//! The gateway owns no conversation logic. It verifies subscriptions,
//! acknowledges webhook deliveries immediately and hands extracted messages
//! to the auto-reply pipeline on a background task.

pub mod metrics_routes;
pub mod server;
pub mod state;
pub mod webhook_routes;

pub use {
    server::{AppState, build_gateway_app, start_gateway},
    state::GatewayState,
};
