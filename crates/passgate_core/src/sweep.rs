//! Expiration sweep.
//!
//! Persists what the clock already implies:
//! - every non-revoked pass past its expiry is revoked
//! - every active TEMPORARY identity left without a pending or active pass is
//!   deactivated
//!
//! Rows are transitioned one at a time with conditional updates. A row that
//! fails is logged and counted; the sweep carries on with the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::{PassStore, Result};
use crate::types::IdentityId;

/// Result of a sweep run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    /// Passes this run moved to revoked.
    pub revoked_passes: u32,
    /// Identities this run deactivated.
    pub deactivated_identities: Vec<IdentityId>,
    /// Row-level updates that failed and will be retried next run.
    pub failures: u32,
    pub swept_at: DateTime<Utc>,
}

/// Run one sweep at `now`. Only the two listing queries can fail the run.
pub async fn sweep_expired(store: &dyn PassStore, now: DateTime<Utc>) -> Result<SweepReport> {
    let mut report = SweepReport {
        revoked_passes: 0,
        deactivated_identities: Vec::new(),
        failures: 0,
        swept_at: now,
    };

    for pass in store.list_expired_passes(now).await? {
        match store.revoke_pass(pass.id).await {
            Ok(true) => report.revoked_passes += 1,
            // The gate revoked it first.
            Ok(false) => {}
            Err(e) => {
                report.failures += 1;
                tracing::warn!(pass = %pass.id, error = %e, "sweep: failed to revoke expired pass");
            }
        }
    }

    // Listed after revocation so the unexpired-pass predicate sees this run's writes.
    for identity_id in store.list_passless_temporaries(now).await? {
        match store.deactivate_if_passless(identity_id, now).await {
            Ok(true) => report.deactivated_identities.push(identity_id),
            Ok(false) => {}
            Err(e) => {
                report.failures += 1;
                tracing::warn!(identity = %identity_id, error = %e, "sweep: failed to deactivate identity");
            }
        }
    }

    tracing::info!(
        target: "passgate.sweep",
        revoked_passes = report.revoked_passes,
        deactivated_identities = report.deactivated_identities.len(),
        failures = report.failures,
        "expiration sweep complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::gate::{AuthorizationGate, DenyReason};
    use crate::memory::InMemoryPassStore;
    use crate::testing::FlakyStore;
    use crate::types::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 14, 18, 0, 0).unwrap()
    }

    async fn identity(store: &InMemoryPassStore, name: &str, role: Role) -> IdentityId {
        store
            .create_identity(
                &NewIdentity {
                    display_name: name.into(),
                    role,
                    is_master: false,
                    email: None,
                    phone: None,
                },
                t0(),
            )
            .await
            .unwrap()
            .id
    }

    async fn issue(store: &InMemoryPassStore, who: IdentityId, category: PassCategory) -> PassId {
        store
            .issue_pending_pass(&NewPass {
                identity_id: who,
                category,
                issued_by: IdentityId(1),
                created_at: t0(),
            })
            .await
            .unwrap()
            .0
            .id
    }

    #[tokio::test]
    async fn three_day_pass_lifecycle() {
        let store = Arc::new(InMemoryPassStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        identity(&store, "Root", Role::Privileged).await;
        let x = identity(&store, "Xan", Role::Temporary).await;
        let pass_id = issue(&store, x, PassCategory::Days3).await;
        let gate = AuthorizationGate::new(store.clone(), clock.clone());

        let t1 = t0() + Duration::hours(2);
        clock.set(t1);
        assert!(gate.authorize(x).await.is_allowed());
        let active = store.get_pass(pass_id).await.unwrap().unwrap();
        assert_eq!(active.expires_at(), Some(t1 + Duration::days(3)));

        let t2 = t1 + Duration::days(3) + Duration::seconds(1);
        clock.set(t2);
        assert_eq!(
            gate.authorize(x).await.deny_reason(),
            Some(DenyReason::NoValidPass)
        );

        let report = sweep_expired(store.as_ref(), clock.now()).await.unwrap();
        assert_eq!(report.deactivated_identities, vec![x]);
        assert!(store.get_pass(pass_id).await.unwrap().unwrap().is_revoked);
        assert!(!store.get_identity(x).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn sweep_revokes_without_traffic() {
        let store = InMemoryPassStore::new();
        let x = identity(&store, "Xan", Role::Temporary).await;
        let pass_id = issue(&store, x, PassCategory::Hours24).await;
        store
            .activate_pass_if_still_pending(pass_id, t0(), t0() + Duration::hours(24))
            .await
            .unwrap();

        let early = sweep_expired(&store, t0() + Duration::hours(23)).await.unwrap();
        assert_eq!(early.revoked_passes, 0);
        assert!(early.deactivated_identities.is_empty());

        let late = sweep_expired(&store, t0() + Duration::hours(24)).await.unwrap();
        assert_eq!(late.revoked_passes, 1);
        assert_eq!(late.deactivated_identities, vec![x]);
        assert_eq!(late.failures, 0);
    }

    #[tokio::test]
    async fn pending_pass_keeps_identity_active() {
        let store = InMemoryPassStore::new();
        let x = identity(&store, "Xan", Role::Temporary).await;
        issue(&store, x, PassCategory::Days30).await;

        let report = sweep_expired(&store, t0() + Duration::days(365)).await.unwrap();
        assert!(report.deactivated_identities.is_empty());
        assert!(store.get_identity(x).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn other_roles_are_never_deactivated() {
        let store = InMemoryPassStore::new();
        let g = identity(&store, "Gil", Role::Guest).await;
        let a = identity(&store, "Ada", Role::Privileged).await;

        let report = sweep_expired(&store, t0()).await.unwrap();
        assert!(report.deactivated_identities.is_empty());
        for id in [g, a] {
            assert!(store.get_identity(id).await.unwrap().unwrap().is_active);
        }
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let store = InMemoryPassStore::new();
        let x = identity(&store, "Xan", Role::Temporary).await;
        let pass_id = issue(&store, x, PassCategory::Hours24).await;
        store
            .activate_pass_if_still_pending(pass_id, t0(), t0() + Duration::hours(24))
            .await
            .unwrap();

        let later = t0() + Duration::days(2);
        let first = sweep_expired(&store, later).await.unwrap();
        let second = sweep_expired(&store, later).await.unwrap();
        assert_eq!(first.revoked_passes, 1);
        assert_eq!(second.revoked_passes, 0);
        assert!(second.deactivated_identities.is_empty());
    }

    async fn activated(store: &InMemoryPassStore, who: IdentityId) -> PassId {
        let pass_id = issue(store, who, PassCategory::Hours24).await;
        store
            .activate_pass_if_still_pending(pass_id, t0(), t0() + Duration::hours(24))
            .await
            .unwrap();
        pass_id
    }

    #[tokio::test]
    async fn failed_revoke_does_not_stop_the_run() {
        let flaky = FlakyStore::new(InMemoryPassStore::new());
        let x = identity(&flaky.inner, "Xan", Role::Temporary).await;
        let y = identity(&flaky.inner, "Yul", Role::Temporary).await;
        let stuck = activated(&flaky.inner, x).await;
        let fine = activated(&flaky.inner, y).await;
        flaky.fail_revoke(stuck);

        let report = sweep_expired(&flaky, t0() + Duration::days(2)).await.unwrap();
        assert_eq!(report.revoked_passes, 1);
        assert_eq!(report.failures, 1);
        assert!(!flaky.inner.get_pass(stuck).await.unwrap().unwrap().is_revoked);
        assert!(flaky.inner.get_pass(fine).await.unwrap().unwrap().is_revoked);
        // An expired pass is not unexpired whether or not the revoke landed.
        assert_eq!(report.deactivated_identities, vec![x, y]);
    }

    #[tokio::test]
    async fn failed_deactivation_is_counted_and_retried() {
        let flaky = FlakyStore::new(InMemoryPassStore::new());
        let x = identity(&flaky.inner, "Xan", Role::Temporary).await;
        let y = identity(&flaky.inner, "Yul", Role::Temporary).await;
        activated(&flaky.inner, x).await;
        activated(&flaky.inner, y).await;
        flaky.fail_deactivate(x);

        let later = t0() + Duration::days(2);
        let report = sweep_expired(&flaky, later).await.unwrap();
        assert_eq!(report.revoked_passes, 2);
        assert_eq!(report.failures, 1);
        assert_eq!(report.deactivated_identities, vec![y]);
        assert!(flaky.inner.get_identity(x).await.unwrap().unwrap().is_active);

        // The next run picks the identity up once the store recovers.
        let retry = sweep_expired(&flaky.inner, later).await.unwrap();
        assert_eq!(retry.deactivated_identities, vec![x]);
    }
}
