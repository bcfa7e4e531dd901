//! Passgate server: axum HTTP and WebSocket surface over the passgate core.
//!
//! Every gated entry point, request or realtime event, funnels through the
//! same [`passgate_core::AuthorizationGate`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod realtime;
pub mod router;
pub mod selection;
pub mod state;
pub mod sweeper;
