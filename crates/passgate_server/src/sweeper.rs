//! ExpirationSweeper: background task that persists pass expiry.
//!
//! Each tick runs [`sweep_expired`] and purges expired group sessions. A failed
//! tick is logged and the loop carries on; the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use passgate_core::clock::Clock;
use passgate_core::ports::{PassStore, SessionStore};
use passgate_core::sweep::{sweep_expired, SweepReport};

pub struct ExpirationSweeper {
    store: Arc<dyn PassStore>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(
        store: Arc<dyn PassStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            sessions,
            clock,
            interval,
        }
    }

    /// Run the sweep loop. Never returns; spawn it with `tokio::spawn`.
    pub async fn run(&self) {
        tracing::info!(interval = ?self.interval, "expiration sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One pass: sweep passes, then sessions. Returns the pass report when the
    /// sweep itself succeeded.
    pub async fn tick(&self) -> Option<SweepReport> {
        let now = self.clock.now();
        let report = match sweep_expired(self.store.as_ref(), now).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "expiration sweep failed (non-fatal)");
                None
            }
        };

        match self.sessions.purge_expired_sessions(now).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "expired group sessions purged"),
            Err(e) => tracing::warn!(error = %e, "session purge failed (non-fatal)"),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use passgate_core::clock::ManualClock;
    use passgate_core::memory::InMemoryPassStore;
    use passgate_core::types::*;

    #[tokio::test]
    async fn tick_revokes_and_purges() {
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let store = Arc::new(InMemoryPassStore::new());
        let clock = Arc::new(ManualClock::new(t0));
        let x = store
            .create_identity(
                &NewIdentity {
                    display_name: "Xan".into(),
                    role: Role::Temporary,
                    is_master: false,
                    email: None,
                    phone: None,
                },
                t0,
            )
            .await
            .unwrap()
            .id;
        let (pass, _) = store
            .issue_pending_pass(&NewPass {
                identity_id: x,
                category: PassCategory::Hours24,
                issued_by: IdentityId(1),
                created_at: t0,
            })
            .await
            .unwrap();
        store
            .activate_pass_if_still_pending(pass.id, t0, t0 + chrono::Duration::hours(24))
            .await
            .unwrap();
        store
            .create_session(&GroupSession {
                token: "stale".into(),
                created_at: t0,
                expires_at: t0 + chrono::Duration::hours(1),
            })
            .await
            .unwrap();

        let sweeper = ExpirationSweeper::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            Duration::from_secs(60),
        );
        clock.advance(chrono::Duration::days(2));
        let report = sweeper.tick().await.unwrap();

        assert_eq!(report.revoked_passes, 1);
        assert_eq!(report.deactivated_identities, vec![x]);
        assert!(store.get_session("stale").await.unwrap().is_none());
    }
}
