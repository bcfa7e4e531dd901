//! Domain types for the roster: identities, access passes and the global
//! settings singleton.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PassGateError;

/// Upper bound on concurrently active master administrators.
pub const MAX_ACTIVE_MASTERS: u64 = 5;

// ── Ids ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub i64);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassId(pub i64);

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Identity ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Full-trust administrator.
    Privileged,
    /// Trusted member, unconditional access while active.
    Guest,
    /// Access gated by an access pass.
    Temporary,
    /// A role this build does not recognise. Always denied.
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Privileged => "PRIVILEGED",
            Self::Guest => "GUEST",
            Self::Temporary => "TEMPORARY",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse the stored representation. Unrecognised values map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "PRIVILEGED" => Self::Privileged,
            "GUEST" => Self::Guest,
            "TEMPORARY" => Self::Temporary,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: String,
    pub role: Role,
    pub is_master: bool,
    pub is_active: bool,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn is_privileged(&self) -> bool {
        self.role == Role::Privileged
    }

    pub fn require_privileged(&self) -> Result<(), PassGateError> {
        if self.is_privileged() {
            Ok(())
        } else {
            Err(PassGateError::Forbidden("Admin required".into()))
        }
    }

    pub fn require_master(&self) -> Result<(), PassGateError> {
        if self.is_privileged() && self.is_master {
            Ok(())
        } else {
            Err(PassGateError::Forbidden("Master Admin required".into()))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdentity {
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub is_master: bool,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Partial identity update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityPatch {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub is_master: Option<bool>,
    pub is_active: Option<bool>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Roster bounds checked together with an identity insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterLimits {
    pub max_active: u64,
    /// Only consulted when the new identity is a master.
    pub max_masters: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Identity),
    AtCapacity,
    MasterCapReached,
}

/// Public roster entry shown before an identity is picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub id: IdentityId,
    pub display_name: String,
    pub role: Role,
}

impl From<&Identity> for RosterEntry {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            display_name: identity.display_name.clone(),
            role: identity.role,
        }
    }
}

// ── Access passes ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassCategory {
    #[serde(rename = "HOURS_24")]
    Hours24,
    #[serde(rename = "DAYS_3")]
    Days3,
    #[serde(rename = "DAYS_7")]
    Days7,
    #[serde(rename = "DAYS_30")]
    Days30,
}

impl PassCategory {
    pub const ALL: [PassCategory; 4] = [Self::Hours24, Self::Days3, Self::Days7, Self::Days30];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hours24 => "HOURS_24",
            Self::Days3 => "DAYS_3",
            Self::Days7 => "DAYS_7",
            Self::Days30 => "DAYS_30",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for PassCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activation window of a pass. A pass is issued `Pending` and is stamped
/// with a window exactly once, on first successful authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassWindow {
    Pending,
    Activated {
        activated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
}

/// Logical state of a pass. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    Pending,
    Active,
    /// Activated with a window that starts after `now`. Only reachable when
    /// nodes sharing a store disagree on the time. Denied by the gate, never
    /// revoked, and still counts as unexpired for the sweep.
    Scheduled,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPass {
    pub id: PassId,
    pub identity_id: IdentityId,
    pub category: PassCategory,
    pub window: PassWindow,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub issued_by: IdentityId,
}

impl AccessPass {
    pub fn state(&self, now: DateTime<Utc>) -> PassState {
        if self.is_revoked {
            return PassState::Revoked;
        }
        match self.window {
            PassWindow::Pending => PassState::Pending,
            PassWindow::Activated { expires_at, .. } if expires_at <= now => PassState::Expired,
            PassWindow::Activated { activated_at, .. } if now < activated_at => {
                PassState::Scheduled
            }
            PassWindow::Activated { .. } => PassState::Active,
        }
    }

    /// Pending or Active: a pass the gate would still honour.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state(now), PassState::Pending | PassState::Active)
    }

    /// Not revoked and not past its expiry. This is what keeps a TEMPORARY
    /// identity from being swept, and matches the Postgres predicate.
    pub fn is_unexpired(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.state(now),
            PassState::Pending | PassState::Active | PassState::Scheduled
        )
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.window {
            PassWindow::Pending => None,
            PassWindow::Activated { expires_at, .. } => Some(expires_at),
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> PassView {
        PassView {
            state: self.state(now),
            pass: self.clone(),
        }
    }
}

/// A pass together with its state at the instant it was read.
#[derive(Debug, Clone, Serialize)]
pub struct PassView {
    #[serde(flatten)]
    pub pass: AccessPass,
    pub state: PassState,
}

#[derive(Debug, Clone)]
pub struct NewPass {
    pub identity_id: IdentityId,
    pub category: PassCategory,
    pub issued_by: IdentityId,
    pub created_at: DateTime<Utc>,
}

// ── Settings ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub max_active_identities: u32,
    pub allow_new_temporary: bool,
    pub enable_hours_24: bool,
    pub enable_days_3: bool,
    pub enable_days_7: bool,
    pub enable_days_30: bool,
}

impl GlobalSettings {
    pub fn allows(&self, category: PassCategory) -> bool {
        match category {
            PassCategory::Hours24 => self.enable_hours_24,
            PassCategory::Days3 => self.enable_days_3,
            PassCategory::Days7 => self.enable_days_7,
            PassCategory::Days30 => self.enable_days_30,
        }
    }

    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(v) = patch.max_active_identities {
            self.max_active_identities = v;
        }
        if let Some(v) = patch.allow_new_temporary {
            self.allow_new_temporary = v;
        }
        if let Some(v) = patch.enable_hours_24 {
            self.enable_hours_24 = v;
        }
        if let Some(v) = patch.enable_days_3 {
            self.enable_days_3 = v;
        }
        if let Some(v) = patch.enable_days_7 {
            self.enable_days_7 = v;
        }
        if let Some(v) = patch.enable_days_30 {
            self.enable_days_30 = v;
        }
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            max_active_identities: 15,
            allow_new_temporary: true,
            enable_hours_24: true,
            enable_days_3: true,
            enable_days_7: true,
            enable_days_30: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub max_active_identities: Option<u32>,
    pub allow_new_temporary: Option<bool>,
    pub enable_hours_24: Option<bool>,
    pub enable_days_3: Option<bool>,
    pub enable_days_7: Option<bool>,
    pub enable_days_30: Option<bool>,
}

// ── Group session ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSession {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl GroupSession {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn pass(window: PassWindow, revoked: bool) -> AccessPass {
        AccessPass {
            id: PassId(1),
            identity_id: IdentityId(1),
            category: PassCategory::Days3,
            window,
            is_revoked: revoked,
            created_at: t0(),
            issued_by: IdentityId(99),
        }
    }

    fn activated(from: DateTime<Utc>, hours: i64) -> PassWindow {
        PassWindow::Activated {
            activated_at: from,
            expires_at: from + Duration::hours(hours),
        }
    }

    #[test]
    fn pending_pass_is_pending_at_any_instant() {
        let p = pass(PassWindow::Pending, false);
        assert_eq!(p.state(t0()), PassState::Pending);
        assert_eq!(p.state(t0() + Duration::days(400)), PassState::Pending);
        assert!(p.is_usable(t0()));
    }

    #[test]
    fn activated_pass_is_active_until_expiry_exclusive() {
        let p = pass(activated(t0(), 24), false);
        assert_eq!(p.state(t0()), PassState::Active);
        assert_eq!(
            p.state(t0() + Duration::hours(24) - Duration::seconds(1)),
            PassState::Active
        );
        assert_eq!(p.state(t0() + Duration::hours(24)), PassState::Expired);
        assert!(!p.is_usable(t0() + Duration::hours(24)));
    }

    #[test]
    fn revoked_wins_over_any_window() {
        for window in [PassWindow::Pending, activated(t0(), 24)] {
            let p = pass(window, true);
            assert_eq!(p.state(t0()), PassState::Revoked);
            assert_eq!(p.state(t0() + Duration::days(90)), PassState::Revoked);
            assert!(!p.is_usable(t0()));
        }
    }

    #[test]
    fn exactly_one_state_holds() {
        let instants = [
            t0() - Duration::hours(1),
            t0(),
            t0() + Duration::hours(23),
            t0() + Duration::hours(24),
            t0() + Duration::days(5),
        ];
        for window in [PassWindow::Pending, activated(t0(), 24)] {
            for revoked in [false, true] {
                let p = pass(window, revoked);
                for now in instants {
                    let s = p.state(now);
                    let hits = [
                        PassState::Pending,
                        PassState::Active,
                        PassState::Scheduled,
                        PassState::Expired,
                        PassState::Revoked,
                    ]
                    .iter()
                    .filter(|c| **c == s)
                    .count();
                    assert_eq!(hits, 1);
                }
            }
        }
    }

    #[test]
    fn window_starting_later_is_not_active() {
        let now = t0();
        let p = pass(
            PassWindow::Activated {
                activated_at: now + Duration::hours(1),
                expires_at: now + Duration::hours(73),
            },
            false,
        );
        assert_eq!(p.state(now), PassState::Scheduled);
        assert!(!p.is_usable(now));
        assert!(p.is_unexpired(now));
        assert_eq!(p.state(now + Duration::hours(1)), PassState::Active);
        assert_eq!(p.state(now + Duration::hours(73)), PassState::Expired);
    }

    #[test]
    fn role_parse_falls_back_to_unknown() {
        assert_eq!(Role::parse("GUEST"), Role::Guest);
        assert_eq!(Role::parse("ADMIN"), Role::Unknown);
        let r: Role = serde_json::from_str("\"SUPERUSER\"").unwrap();
        assert_eq!(r, Role::Unknown);
    }

    #[test]
    fn category_wire_names() {
        assert_eq!(
            serde_json::to_string(&PassCategory::Hours24).unwrap(),
            "\"HOURS_24\""
        );
        assert_eq!(PassCategory::parse("DAYS_30"), Some(PassCategory::Days30));
        assert_eq!(PassCategory::parse("DAYS_2"), None);
    }

    #[test]
    fn settings_patch_only_touches_given_fields() {
        let mut s = GlobalSettings::default();
        s.apply(&SettingsPatch {
            enable_hours_24: Some(false),
            max_active_identities: Some(3),
            ..Default::default()
        });
        assert!(!s.allows(PassCategory::Hours24));
        assert!(s.allows(PassCategory::Days3));
        assert_eq!(s.max_active_identities, 3);
        assert!(s.allow_new_temporary);
    }

    #[test]
    fn master_requires_privileged_role() {
        let mut id = Identity {
            id: IdentityId(1),
            display_name: "Ada".into(),
            role: Role::Guest,
            is_master: true,
            is_active: true,
            email: None,
            phone: None,
            created_at: t0(),
        };
        assert!(id.require_master().is_err());
        assert!(id.require_privileged().is_err());
        id.role = Role::Privileged;
        assert!(id.require_master().is_ok());
        id.is_master = false;
        assert!(matches!(
            id.require_master(),
            Err(PassGateError::Forbidden(_))
        ));
    }
}
