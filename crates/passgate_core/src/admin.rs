//! Administrative operations: roster management, pass issuance and
//! revocation, global settings.
//!
//! Every call takes the acting identity explicitly. Callers are expected to
//! have passed the authorization gate already; this service only checks the
//! actor's role.

use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::error::PassGateError;
use crate::ports::{PassStore, Result};
use crate::types::*;

/// An identity with its non-revoked passes, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityWithPasses {
    #[serde(flatten)]
    pub identity: Identity,
    pub passes: Vec<PassView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: PassCategory,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsStats {
    pub active_identities: u64,
    pub active_temporaries: u64,
    pub unexpired_passes: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsOverview {
    pub settings: GlobalSettings,
    pub stats: SettingsStats,
}

/// Result of issuing a pass.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedPass {
    pub pass: AccessPass,
    /// Pending passes of the same identity revoked to make room.
    pub replaced_pending: u64,
}

fn master_cap_reached() -> PassGateError {
    PassGateError::PolicyViolation(format!(
        "Maximum of {MAX_ACTIVE_MASTERS} active Master Admins allowed"
    ))
}

pub struct AdminService {
    store: Arc<dyn PassStore>,
    clock: Arc<dyn Clock>,
}

impl AdminService {
    pub fn new(store: Arc<dyn PassStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn settings(&self) -> Result<GlobalSettings> {
        self.store.get_settings().await?.ok_or_else(|| {
            tracing::error!("global settings row missing");
            PassGateError::SettingsUnavailable
        })
    }

    /// Active identities, as shown on the identity picker.
    pub async fn active_roster(&self) -> Result<Vec<RosterEntry>> {
        let identities = self.store.list_active_identities().await?;
        Ok(identities.iter().map(RosterEntry::from).collect())
    }

    pub async fn list_identities(&self, actor: &Identity) -> Result<Vec<IdentityWithPasses>> {
        actor.require_privileged()?;
        let now = self.clock.now();
        let mut out = Vec::new();
        for identity in self.store.list_identities().await? {
            let passes = self
                .store
                .list_non_revoked_passes(identity.id)
                .await?
                .iter()
                .map(|p| p.view(now))
                .collect();
            out.push(IdentityWithPasses { identity, passes });
        }
        Ok(out)
    }

    pub async fn create_identity(&self, actor: &Identity, new: NewIdentity) -> Result<Identity> {
        actor.require_privileged()?;

        let display_name = new.display_name.trim();
        if display_name.is_empty() {
            return Err(PassGateError::InvalidInput("displayName is required".into()));
        }
        if new.role == Role::Unknown {
            return Err(PassGateError::InvalidInput("Invalid role".into()));
        }

        let settings = self.settings().await?;
        if new.role == Role::Temporary && !settings.allow_new_temporary {
            return Err(PassGateError::PolicyViolation(
                "New TEMPORARY users not allowed".into(),
            ));
        }
        if new.is_master && new.role != Role::Privileged {
            return Err(PassGateError::PolicyViolation(
                "Only PRIVILEGED users can be Master Admins".into(),
            ));
        }

        let new = NewIdentity {
            display_name: display_name.to_string(),
            ..new
        };
        let limits = RosterLimits {
            max_active: u64::from(settings.max_active_identities),
            max_masters: MAX_ACTIVE_MASTERS,
        };
        let identity = match self
            .store
            .create_identity_within(&new, self.clock.now(), limits)
            .await?
        {
            CreateOutcome::Created(identity) => identity,
            CreateOutcome::AtCapacity => {
                return Err(PassGateError::PolicyViolation("Max users reached".into()))
            }
            CreateOutcome::MasterCapReached => return Err(master_cap_reached()),
        };
        tracing::info!(
            actor = %actor.id,
            identity = %identity.id,
            role = %identity.role,
            master = identity.is_master,
            "identity created"
        );
        Ok(identity)
    }

    pub async fn update_identity(
        &self,
        actor: &Identity,
        id: IdentityId,
        patch: IdentityPatch,
    ) -> Result<Identity> {
        actor.require_privileged()?;

        let existing = self
            .store
            .get_identity(id)
            .await?
            .ok_or_else(|| PassGateError::NotFound("User".into()))?;

        if patch.role == Some(Role::Unknown) {
            return Err(PassGateError::InvalidInput("Invalid role".into()));
        }
        if let Some(name) = &patch.display_name {
            if name.trim().is_empty() {
                return Err(PassGateError::InvalidInput("displayName is required".into()));
            }
        }

        let next_role = patch.role.unwrap_or(existing.role);
        let next_active = patch.is_active.unwrap_or(existing.is_active);
        let next_master = patch.is_master.unwrap_or(existing.is_master);

        if next_master && next_role != Role::Privileged {
            return Err(PassGateError::PolicyViolation(
                "Only PRIVILEGED users can be Master Admins".into(),
            ));
        }

        let consuming_master_slot =
            next_master && next_active && !(existing.is_master && existing.is_active);
        if consuming_master_slot {
            self.ensure_master_slot(Some(id)).await?;
        }

        if next_active && !existing.is_active {
            let settings = self.settings().await?;
            let active = self.store.count_active_identities().await?;
            if active >= u64::from(settings.max_active_identities) {
                return Err(PassGateError::PolicyViolation("Max users reached".into()));
            }
        }

        let patch = IdentityPatch {
            display_name: patch.display_name.map(|n| n.trim().to_string()),
            ..patch
        };
        let updated = self
            .store
            .update_identity(id, &patch)
            .await?
            .ok_or_else(|| PassGateError::NotFound("User".into()))?;
        tracing::info!(actor = %actor.id, identity = %id, "identity updated");
        Ok(updated)
    }

    async fn ensure_master_slot(&self, excluding: Option<IdentityId>) -> Result<()> {
        let masters = self.store.count_active_masters(excluding).await?;
        if masters >= MAX_ACTIVE_MASTERS {
            return Err(master_cap_reached());
        }
        Ok(())
    }

    /// Issue a pending pass. Any pending pass the identity already holds is
    /// revoked in the same store operation.
    pub async fn issue_pass(
        &self,
        actor: &Identity,
        identity_id: IdentityId,
        category: PassCategory,
    ) -> Result<IssuedPass> {
        actor.require_privileged()?;

        let target = self
            .store
            .get_identity(identity_id)
            .await?
            .ok_or_else(|| PassGateError::NotFound("User".into()))?;
        if target.role != Role::Temporary {
            return Err(PassGateError::PolicyViolation(
                "Passes can only be issued to TEMPORARY users".into(),
            ));
        }

        let settings = self.settings().await?;
        if !settings.allows(category) {
            return Err(PassGateError::PolicyViolation("Pass type not enabled".into()));
        }

        let (pass, replaced_pending) = self
            .store
            .issue_pending_pass(&NewPass {
                identity_id,
                category,
                issued_by: actor.id,
                created_at: self.clock.now(),
            })
            .await?;

        tracing::info!(
            actor = %actor.id,
            identity = %identity_id,
            pass = %pass.id,
            %category,
            replaced_pending,
            "access pass issued"
        );
        Ok(IssuedPass {
            pass,
            replaced_pending,
        })
    }

    /// Revoke a pass. Revoking an already revoked pass is a no-op.
    pub async fn revoke_pass(&self, actor: &Identity, pass_id: PassId) -> Result<AccessPass> {
        actor.require_privileged()?;

        if self.store.revoke_pass(pass_id).await? {
            tracing::info!(actor = %actor.id, pass = %pass_id, "access pass revoked");
        }
        self.store
            .get_pass(pass_id)
            .await?
            .ok_or_else(|| PassGateError::NotFound("Pass".into()))
    }

    pub async fn settings_overview(&self, actor: &Identity) -> Result<SettingsOverview> {
        actor.require_master()?;

        let now = self.clock.now();
        let settings = self.settings().await?;
        let active = self.store.list_active_identities().await?;
        let unexpired_passes = self
            .store
            .count_unexpired_passes_by_category(now)
            .await?
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();

        Ok(SettingsOverview {
            settings,
            stats: SettingsStats {
                active_identities: active.len() as u64,
                active_temporaries: active.iter().filter(|i| i.role == Role::Temporary).count()
                    as u64,
                unexpired_passes,
            },
        })
    }

    pub async fn update_settings(
        &self,
        actor: &Identity,
        patch: SettingsPatch,
    ) -> Result<GlobalSettings> {
        actor.require_master()?;

        if patch.max_active_identities == Some(0) {
            return Err(PassGateError::InvalidInput(
                "max_active_identities must be at least 1".into(),
            ));
        }

        let updated = self.store.update_settings(&patch).await?.ok_or_else(|| {
            tracing::error!("global settings row missing");
            PassGateError::SettingsUnavailable
        })?;
        tracing::info!(actor = %actor.id, settings = ?updated, "global settings updated");
        Ok(updated)
    }
}
