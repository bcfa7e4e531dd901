//! In-memory implementation of the store ports.
//!
//! All state sits behind one async mutex, so every trait method is atomic
//! with respect to every other. Used by tests and by the server when it runs
//! without a database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::PassGateError;
use crate::ports::{PassStore, Result, SessionStore};
use crate::types::*;

#[derive(Default)]
struct Inner {
    identities: BTreeMap<IdentityId, Identity>,
    passes: BTreeMap<PassId, AccessPass>,
    settings: Option<GlobalSettings>,
    sessions: HashMap<String, GroupSession>,
    next_identity: i64,
    next_pass: i64,
}

impl Inner {
    fn has_unexpired_pass(&self, id: IdentityId, now: DateTime<Utc>) -> bool {
        self.passes
            .values()
            .any(|p| p.identity_id == id && p.is_unexpired(now))
    }

    fn insert_identity(&mut self, new: &NewIdentity, created_at: DateTime<Utc>) -> Result<Identity> {
        if self.name_taken(&new.display_name, None) {
            return Err(PassGateError::Conflict(format!(
                "display name '{}' already in use",
                new.display_name
            )));
        }
        self.next_identity += 1;
        let identity = Identity {
            id: IdentityId(self.next_identity),
            display_name: new.display_name.clone(),
            role: new.role,
            is_master: new.is_master,
            is_active: true,
            email: new.email.clone(),
            phone: new.phone.clone(),
            created_at,
        };
        self.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    fn name_taken(&self, name: &str, except: Option<IdentityId>) -> bool {
        self.identities
            .values()
            .any(|i| i.display_name == name && Some(i.id) != except)
    }
}

pub struct InMemoryPassStore {
    inner: Mutex<Inner>,
}

impl InMemoryPassStore {
    /// Empty roster with default settings.
    pub fn new() -> Self {
        Self::with_settings(GlobalSettings::default())
    }

    pub fn with_settings(settings: GlobalSettings) -> Self {
        Self {
            inner: Mutex::new(Inner {
                settings: Some(settings),
                ..Default::default()
            }),
        }
    }

    /// Drop the settings singleton, as a broken deployment would.
    pub async fn clear_settings(&self) {
        self.inner.lock().await.settings = None;
    }
}

impl Default for InMemoryPassStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PassStore for InMemoryPassStore {
    async fn get_identity(&self, id: IdentityId) -> Result<Option<Identity>> {
        Ok(self.inner.lock().await.identities.get(&id).cloned())
    }

    async fn list_identities(&self) -> Result<Vec<Identity>> {
        Ok(self.inner.lock().await.identities.values().cloned().collect())
    }

    async fn list_active_identities(&self) -> Result<Vec<Identity>> {
        Ok(self
            .inner
            .lock()
            .await
            .identities
            .values()
            .filter(|i| i.is_active)
            .cloned()
            .collect())
    }

    async fn create_identity(
        &self,
        new: &NewIdentity,
        created_at: DateTime<Utc>,
    ) -> Result<Identity> {
        self.inner.lock().await.insert_identity(new, created_at)
    }

    async fn create_identity_within(
        &self,
        new: &NewIdentity,
        created_at: DateTime<Utc>,
        limits: RosterLimits,
    ) -> Result<CreateOutcome> {
        let mut inner = self.inner.lock().await;
        let active: Vec<&Identity> = inner.identities.values().filter(|i| i.is_active).collect();
        if active.len() as u64 >= limits.max_active {
            return Ok(CreateOutcome::AtCapacity);
        }
        let masters = active
            .iter()
            .filter(|i| i.is_master && i.role == Role::Privileged)
            .count() as u64;
        if new.is_master && masters >= limits.max_masters {
            return Ok(CreateOutcome::MasterCapReached);
        }
        inner.insert_identity(new, created_at).map(CreateOutcome::Created)
    }

    async fn update_identity(
        &self,
        id: IdentityId,
        patch: &IdentityPatch,
    ) -> Result<Option<Identity>> {
        let mut inner = self.inner.lock().await;
        if let Some(name) = &patch.display_name {
            if inner.name_taken(name, Some(id)) {
                return Err(PassGateError::Conflict(format!(
                    "display name '{name}' already in use"
                )));
            }
        }
        let Some(identity) = inner.identities.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = &patch.display_name {
            identity.display_name = v.clone();
        }
        if let Some(v) = patch.role {
            identity.role = v;
        }
        if let Some(v) = patch.is_master {
            identity.is_master = v;
        }
        if let Some(v) = patch.is_active {
            identity.is_active = v;
        }
        if let Some(v) = &patch.email {
            identity.email = Some(v.clone());
        }
        if let Some(v) = &patch.phone {
            identity.phone = Some(v.clone());
        }
        Ok(Some(identity.clone()))
    }

    async fn set_identity_active(&self, id: IdentityId, active: bool) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.identities.get_mut(&id) {
            Some(identity) if identity.is_active != active => {
                identity.is_active = active;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_active_identities(&self) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.identities.values().filter(|i| i.is_active).count() as u64)
    }

    async fn count_active_masters(&self, excluding: Option<IdentityId>) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .identities
            .values()
            .filter(|i| {
                i.role == Role::Privileged && i.is_master && i.is_active && Some(i.id) != excluding
            })
            .count() as u64)
    }

    async fn get_pass(&self, id: PassId) -> Result<Option<AccessPass>> {
        Ok(self.inner.lock().await.passes.get(&id).cloned())
    }

    async fn list_non_revoked_passes(&self, identity_id: IdentityId) -> Result<Vec<AccessPass>> {
        let inner = self.inner.lock().await;
        let mut passes: Vec<_> = inner
            .passes
            .values()
            .filter(|p| p.identity_id == identity_id && !p.is_revoked)
            .cloned()
            .collect();
        passes.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(passes)
    }

    async fn revoke_pass(&self, id: PassId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.passes.get_mut(&id) {
            Some(pass) if !pass.is_revoked => {
                pass.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn activate_pass_if_still_pending(
        &self,
        id: PassId,
        activated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.passes.get_mut(&id) {
            Some(pass) if !pass.is_revoked && pass.window == PassWindow::Pending => {
                pass.window = PassWindow::Activated {
                    activated_at,
                    expires_at,
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn issue_pending_pass(&self, new: &NewPass) -> Result<(AccessPass, u64)> {
        let mut inner = self.inner.lock().await;
        if !inner.identities.contains_key(&new.identity_id) {
            return Err(PassGateError::NotFound(format!("identity {}", new.identity_id)));
        }
        let mut revoked = 0;
        for pass in inner.passes.values_mut().filter(|p| {
            p.identity_id == new.identity_id && !p.is_revoked && p.window == PassWindow::Pending
        }) {
            pass.is_revoked = true;
            revoked += 1;
        }
        inner.next_pass += 1;
        let pass = AccessPass {
            id: PassId(inner.next_pass),
            identity_id: new.identity_id,
            category: new.category,
            window: PassWindow::Pending,
            is_revoked: false,
            created_at: new.created_at,
            issued_by: new.issued_by,
        };
        inner.passes.insert(pass.id, pass.clone());
        Ok((pass, revoked))
    }

    async fn list_expired_passes(&self, now: DateTime<Utc>) -> Result<Vec<AccessPass>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .passes
            .values()
            .filter(|p| p.state(now) == PassState::Expired)
            .cloned()
            .collect())
    }

    async fn list_passless_temporaries(&self, now: DateTime<Utc>) -> Result<Vec<IdentityId>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .identities
            .values()
            .filter(|i| i.role == Role::Temporary && i.is_active)
            .filter(|i| !inner.has_unexpired_pass(i.id, now))
            .map(|i| i.id)
            .collect())
    }

    async fn deactivate_if_passless(&self, id: IdentityId, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.has_unexpired_pass(id, now) {
            return Ok(false);
        }
        match inner.identities.get_mut(&id) {
            Some(identity) if identity.role == Role::Temporary && identity.is_active => {
                identity.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_unexpired_passes_by_category(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(PassCategory, u64)>> {
        let inner = self.inner.lock().await;
        Ok(PassCategory::ALL
            .into_iter()
            .map(|category| {
                let n = inner
                    .passes
                    .values()
                    .filter(|p| p.category == category && p.is_unexpired(now))
                    .count() as u64;
                (category, n)
            })
            .filter(|(_, n)| *n > 0)
            .collect())
    }

    async fn get_settings(&self) -> Result<Option<GlobalSettings>> {
        Ok(self.inner.lock().await.settings.clone())
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> Result<Option<GlobalSettings>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.settings.as_mut().map(|s| {
            s.apply(patch);
            s.clone()
        }))
    }
}

#[async_trait]
impl SessionStore for InMemoryPassStore {
    async fn create_session(&self, session: &GroupSession) -> Result<()> {
        self.inner
            .lock()
            .await
            .sessions
            .insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<GroupSession>> {
        Ok(self.inner.lock().await.sessions.get(token).cloned())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.is_live(now));
        Ok((before - inner.sessions.len()) as u64)
    }
}
