//! Shared application state, handed to handlers as an axum `Extension`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use passgate_core::admin::AdminService;
use passgate_core::clock::Clock;
use passgate_core::ports::{PassStore, SessionStore};
use passgate_core::AuthorizationGate;
use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::realtime::RelayMessage;

/// Buffered realtime messages per subscriber before a slow socket lags.
const RELAY_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AuthorizationGate>,
    pub admin: Arc<AdminService>,
    pub sessions: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ServerConfig>,
    pub relay: broadcast::Sender<RelayMessage>,
    message_seq: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PassStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Self {
        let (relay, _) = broadcast::channel(RELAY_CAPACITY);
        Self {
            gate: Arc::new(AuthorizationGate::new(store.clone(), clock.clone())),
            admin: Arc::new(AdminService::new(store, clock.clone())),
            sessions,
            clock,
            config: Arc::new(config),
            relay,
            message_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn next_message_id(&self) -> u64 {
        self.message_seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}
