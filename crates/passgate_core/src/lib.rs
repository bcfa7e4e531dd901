//! Passgate core: the access-pass lifecycle and the authorization gate for a
//! single gated group.
//!
//! Pure domain types and port traits. Storage lives behind [`ports::PassStore`];
//! transports (HTTP, WebSocket) call [`gate::AuthorizationGate::authorize`] and
//! never re-implement any part of the decision.

pub mod admin;
pub mod clock;
pub mod error;
pub mod gate;
pub mod memory;
pub mod policy;
pub mod ports;
pub mod sweep;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use error::PassGateError;
pub use gate::{Admission, AuthorizationGate, DenyReason, Verdict};
