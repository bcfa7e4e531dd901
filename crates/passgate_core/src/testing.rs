//! Store double that fails on chosen rows, for exercising error paths.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PassGateError;
use crate::memory::InMemoryPassStore;
use crate::ports::{PassStore, Result};
use crate::types::*;

/// Wraps [`InMemoryPassStore`] and returns `Internal` errors for the
/// configured passes, identities or lookups. Everything else passes through.
#[derive(Default)]
pub(crate) struct FlakyStore {
    pub inner: InMemoryPassStore,
    failing_revokes: Mutex<HashSet<PassId>>,
    failing_deactivations: Mutex<HashSet<IdentityId>>,
    failing_lookups: Mutex<bool>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryPassStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_revoke(&self, id: PassId) {
        self.failing_revokes.lock().unwrap().insert(id);
    }

    pub fn fail_deactivate(&self, id: IdentityId) {
        self.failing_deactivations.lock().unwrap().insert(id);
    }

    pub fn fail_lookups(&self) {
        *self.failing_lookups.lock().unwrap() = true;
    }

    fn outage(what: &str) -> PassGateError {
        PassGateError::Internal(anyhow::anyhow!("simulated outage: {what}"))
    }
}

#[async_trait]
impl PassStore for FlakyStore {
    async fn get_identity(&self, id: IdentityId) -> Result<Option<Identity>> {
        if *self.failing_lookups.lock().unwrap() {
            return Err(Self::outage("get_identity"));
        }
        self.inner.get_identity(id).await
    }

    async fn list_identities(&self) -> Result<Vec<Identity>> {
        self.inner.list_identities().await
    }

    async fn list_active_identities(&self) -> Result<Vec<Identity>> {
        self.inner.list_active_identities().await
    }

    async fn create_identity(
        &self,
        new: &NewIdentity,
        created_at: DateTime<Utc>,
    ) -> Result<Identity> {
        self.inner.create_identity(new, created_at).await
    }

    async fn create_identity_within(
        &self,
        new: &NewIdentity,
        created_at: DateTime<Utc>,
        limits: RosterLimits,
    ) -> Result<CreateOutcome> {
        self.inner.create_identity_within(new, created_at, limits).await
    }

    async fn update_identity(
        &self,
        id: IdentityId,
        patch: &IdentityPatch,
    ) -> Result<Option<Identity>> {
        self.inner.update_identity(id, patch).await
    }

    async fn set_identity_active(&self, id: IdentityId, active: bool) -> Result<bool> {
        self.inner.set_identity_active(id, active).await
    }

    async fn count_active_identities(&self) -> Result<u64> {
        self.inner.count_active_identities().await
    }

    async fn count_active_masters(&self, excluding: Option<IdentityId>) -> Result<u64> {
        self.inner.count_active_masters(excluding).await
    }

    async fn get_pass(&self, id: PassId) -> Result<Option<AccessPass>> {
        self.inner.get_pass(id).await
    }

    async fn list_non_revoked_passes(&self, identity_id: IdentityId) -> Result<Vec<AccessPass>> {
        self.inner.list_non_revoked_passes(identity_id).await
    }

    async fn revoke_pass(&self, id: PassId) -> Result<bool> {
        if self.failing_revokes.lock().unwrap().contains(&id) {
            return Err(Self::outage("revoke_pass"));
        }
        self.inner.revoke_pass(id).await
    }

    async fn activate_pass_if_still_pending(
        &self,
        id: PassId,
        activated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner
            .activate_pass_if_still_pending(id, activated_at, expires_at)
            .await
    }

    async fn issue_pending_pass(&self, new: &NewPass) -> Result<(AccessPass, u64)> {
        self.inner.issue_pending_pass(new).await
    }

    async fn list_expired_passes(&self, now: DateTime<Utc>) -> Result<Vec<AccessPass>> {
        self.inner.list_expired_passes(now).await
    }

    async fn list_passless_temporaries(&self, now: DateTime<Utc>) -> Result<Vec<IdentityId>> {
        self.inner.list_passless_temporaries(now).await
    }

    async fn deactivate_if_passless(&self, id: IdentityId, now: DateTime<Utc>) -> Result<bool> {
        if self.failing_deactivations.lock().unwrap().contains(&id) {
            return Err(Self::outage("deactivate_if_passless"));
        }
        self.inner.deactivate_if_passless(id, now).await
    }

    async fn count_unexpired_passes_by_category(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(PassCategory, u64)>> {
        self.inner.count_unexpired_passes_by_category(now).await
    }

    async fn get_settings(&self) -> Result<Option<GlobalSettings>> {
        self.inner.get_settings().await
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> Result<Option<GlobalSettings>> {
        self.inner.update_settings(patch).await
    }
}
