//! Authorization gate.
//!
//! One decision procedure shared by the request entry point and the realtime
//! entry point. For TEMPORARY identities the decision has side effects:
//! expired passes are revoked and the newest pending pass is activated on
//! first use. Both writes are conditional store updates, so concurrent calls
//! for the same identity converge on a single activation.
//!
//! The gate never returns an error to its caller. Store failures deny with
//! `store_unavailable`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::policy;
use crate::ports::{PassStore, Result};
use crate::types::*;

/// Attempts at activating a pending pass before giving up. Losing an
/// activation race means the pass is now active, so the second pass through
/// normally finds it.
const MAX_ACTIVATION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotFound,
    NoValidPass,
    PassNotAllowed,
    AccessDenied,
    SettingsUnavailable,
    StoreUnavailable,
}

impl DenyReason {
    /// Stable code shared by every transport.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NoValidPass => "no_valid_pass",
            Self::PassNotAllowed => "pass_not_allowed",
            Self::AccessDenied => "access_denied",
            Self::SettingsUnavailable => "settings_unavailable",
            Self::StoreUnavailable => "store_unavailable",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "User not found or inactive",
            Self::NoValidPass | Self::PassNotAllowed => {
                "Your access pass has expired or is not allowed."
            }
            Self::AccessDenied => "Access denied",
            Self::SettingsUnavailable => "Settings not found",
            Self::StoreUnavailable => "Access check unavailable",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound | Self::NoValidPass | Self::PassNotAllowed | Self::AccessDenied => 403,
            Self::SettingsUnavailable | Self::StoreUnavailable => 500,
        }
    }
}

/// What an allowed caller is acting as.
#[derive(Debug, Clone, Serialize)]
pub struct Admission {
    pub identity: Identity,
    /// The pass that admitted a TEMPORARY identity. `None` for other roles.
    pub pass: Option<AccessPass>,
}

#[derive(Debug, Clone)]
pub enum Verdict {
    Allow(Admission),
    Deny(DenyReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow(_) => None,
            Self::Deny(reason) => Some(*reason),
        }
    }
}

pub struct AuthorizationGate {
    store: Arc<dyn PassStore>,
    clock: Arc<dyn Clock>,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn PassStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn authorize(&self, identity_id: IdentityId) -> Verdict {
        match self.decide(identity_id).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(identity = %identity_id, error = %e, "access check failed against store");
                Verdict::Deny(DenyReason::StoreUnavailable)
            }
        }
    }

    async fn decide(&self, identity_id: IdentityId) -> Result<Verdict> {
        let identity = match self.store.get_identity(identity_id).await? {
            Some(identity) if identity.is_active => identity,
            _ => return Ok(Verdict::Deny(DenyReason::NotFound)),
        };

        match identity.role {
            Role::Privileged | Role::Guest => Ok(Verdict::Allow(Admission {
                identity,
                pass: None,
            })),
            Role::Temporary => self.decide_temporary(identity).await,
            Role::Unknown => Ok(Verdict::Deny(DenyReason::AccessDenied)),
        }
    }

    async fn decide_temporary(&self, identity: Identity) -> Result<Verdict> {
        // Read fresh on every call: a category disabled a moment ago must
        // stop authorizing immediately.
        let Some(settings) = self.store.get_settings().await? else {
            tracing::error!(
                identity = %identity.id,
                "global settings row missing; denying temporary identity"
            );
            return Ok(Verdict::Deny(DenyReason::SettingsUnavailable));
        };

        let Some(pass) = self.usable_pass(identity.id).await? else {
            return Ok(Verdict::Deny(DenyReason::NoValidPass));
        };

        if !settings.allows(pass.category) {
            tracing::debug!(
                identity = %identity.id,
                pass = %pass.id,
                category = %pass.category,
                "pass category disabled"
            );
            return Ok(Verdict::Deny(DenyReason::PassNotAllowed));
        }

        Ok(Verdict::Allow(Admission {
            identity,
            pass: Some(pass),
        }))
    }

    /// Newest active pass, else the newest pending pass activated in place.
    async fn usable_pass(&self, identity_id: IdentityId) -> Result<Option<AccessPass>> {
        for attempt in 1..=MAX_ACTIVATION_ATTEMPTS {
            let now = self.clock.now();
            let passes = self.store.list_non_revoked_passes(identity_id).await?;

            self.revoke_expired(&passes, now).await;

            if let Some(active) = passes
                .iter()
                .find(|p| p.state(now) == PassState::Active)
            {
                return Ok(Some(active.clone()));
            }

            let Some(pending) = passes.iter().find(|p| p.state(now) == PassState::Pending) else {
                return Ok(None);
            };

            let activated_at = now;
            let expires_at = policy::expiry_of(pending.category, activated_at);

            if self
                .store
                .activate_pass_if_still_pending(pending.id, activated_at, expires_at)
                .await?
            {
                tracing::info!(
                    identity = %identity_id,
                    pass = %pending.id,
                    category = %pending.category,
                    %expires_at,
                    "access pass activated"
                );
                let mut activated = pending.clone();
                activated.window = PassWindow::Activated {
                    activated_at,
                    expires_at,
                };
                return Ok(Some(activated));
            }

            tracing::debug!(
                identity = %identity_id,
                pass = %pending.id,
                attempt,
                "lost activation race; re-reading passes"
            );
        }

        tracing::warn!(
            identity = %identity_id,
            "no stable pass after {MAX_ACTIVATION_ATTEMPTS} activation attempts"
        );
        Ok(None)
    }

    /// Opportunistic revocation. Best effort: a failed write is logged and
    /// the sweeper will retry it.
    async fn revoke_expired(&self, passes: &[AccessPass], now: DateTime<Utc>) {
        for pass in passes.iter().filter(|p| p.state(now) == PassState::Expired) {
            match self.store.revoke_pass(pass.id).await {
                Ok(true) => tracing::debug!(pass = %pass.id, "revoked expired pass"),
                Ok(false) => {}
                Err(e) => tracing::warn!(pass = %pass.id, error = %e, "failed to revoke expired pass"),
            }
        }
    }
}
