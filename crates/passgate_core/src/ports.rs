//! Storage port traits.
//! Implemented by passgate_postgres and by `memory::InMemoryPassStore`;
//! the gate, sweep and admin service depend only on these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PassGateError;
use crate::types::*;

pub type Result<T> = std::result::Result<T, PassGateError>;

/// Identities, passes and the settings singleton.
///
/// Every state transition on a pass is conditional on the pass still being
/// in the state the caller expects. The boolean results report whether this
/// call performed the transition; `false` means another caller got there
/// first, which is not an error.
#[async_trait]
pub trait PassStore: Send + Sync {
    // ── Identities ─────────────────────────────────────────────

    async fn get_identity(&self, id: IdentityId) -> Result<Option<Identity>>;

    async fn list_identities(&self) -> Result<Vec<Identity>>;

    async fn list_active_identities(&self) -> Result<Vec<Identity>>;

    /// Insert a new, active identity. Display names are unique (`Conflict`).
    async fn create_identity(
        &self,
        new: &NewIdentity,
        created_at: DateTime<Utc>,
    ) -> Result<Identity>;

    /// Insert a new, active identity only if the active roster (and, for a
    /// master, the active master count) is still below `limits`. The counts
    /// and the insert are one atomic step, so concurrent creations cannot
    /// overshoot.
    async fn create_identity_within(
        &self,
        new: &NewIdentity,
        created_at: DateTime<Utc>,
        limits: RosterLimits,
    ) -> Result<CreateOutcome>;

    /// Apply a partial update. Returns `None` when the identity does not exist.
    async fn update_identity(
        &self,
        id: IdentityId,
        patch: &IdentityPatch,
    ) -> Result<Option<Identity>>;

    /// Returns whether the flag changed.
    async fn set_identity_active(&self, id: IdentityId, active: bool) -> Result<bool>;

    async fn count_active_identities(&self) -> Result<u64>;

    /// Active PRIVILEGED masters, optionally not counting `excluding`.
    async fn count_active_masters(&self, excluding: Option<IdentityId>) -> Result<u64>;

    // ── Passes ─────────────────────────────────────────────────

    async fn get_pass(&self, id: PassId) -> Result<Option<AccessPass>>;

    /// Non-revoked passes of one identity, newest first (ties by id, descending).
    async fn list_non_revoked_passes(&self, identity_id: IdentityId) -> Result<Vec<AccessPass>>;

    /// Idempotent. Returns whether this call flipped the flag.
    async fn revoke_pass(&self, id: PassId) -> Result<bool>;

    /// Stamp an activation window onto a pass only if it is still pending and
    /// not revoked. Returns whether this call won.
    async fn activate_pass_if_still_pending(
        &self,
        id: PassId,
        activated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Atomically revoke every non-revoked pending pass of the identity and
    /// insert `new` as a pending pass. Returns the new pass and how many
    /// pending passes were revoked.
    async fn issue_pending_pass(&self, new: &NewPass) -> Result<(AccessPass, u64)>;

    /// Non-revoked, activated passes whose expiry is at or before `now`.
    async fn list_expired_passes(&self, now: DateTime<Utc>) -> Result<Vec<AccessPass>>;

    /// Active TEMPORARY identities owning no unexpired pass at `now`.
    async fn list_passless_temporaries(&self, now: DateTime<Utc>) -> Result<Vec<IdentityId>>;

    /// Deactivate a TEMPORARY identity only if it is still active and still
    /// owns no unexpired pass at `now`. Returns whether this call deactivated it.
    async fn deactivate_if_passless(&self, id: IdentityId, now: DateTime<Utc>) -> Result<bool>;

    /// Non-revoked passes not yet expired at `now`, counted per category.
    /// Pending passes count as unexpired.
    async fn count_unexpired_passes_by_category(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(PassCategory, u64)>>;

    // ── Settings ───────────────────────────────────────────────

    async fn get_settings(&self) -> Result<Option<GlobalSettings>>;

    /// Returns the updated settings, or `None` when the singleton is missing.
    async fn update_settings(&self, patch: &SettingsPatch) -> Result<Option<GlobalSettings>>;
}

/// Group sessions created by the shared login.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &GroupSession) -> Result<()>;

    async fn get_session(&self, token: &str) -> Result<Option<GroupSession>>;

    /// Returns how many sessions were removed.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}
