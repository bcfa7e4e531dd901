//! Row shapes returned by the passgate queries and their conversion into
//! core domain types.

use chrono::{DateTime, Utc};
use passgate_core::types::*;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct IdentityRow {
    pub id: i64,
    pub display_name: String,
    pub role: String,
    pub is_master: bool,
    pub is_active: bool,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<IdentityRow> for Identity {
    fn from(r: IdentityRow) -> Self {
        Self {
            id: IdentityId(r.id),
            display_name: r.display_name,
            role: Role::parse(&r.role),
            is_master: r.is_master,
            is_active: r.is_active,
            email: r.email,
            phone: r.phone,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PassRow {
    pub id: i64,
    pub identity_id: i64,
    pub category: String,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub issued_by: i64,
}

impl TryFrom<PassRow> for AccessPass {
    type Error = String;

    fn try_from(r: PassRow) -> Result<Self, Self::Error> {
        let category = PassCategory::parse(&r.category)
            .ok_or_else(|| format!("pass {}: unknown category '{}'", r.id, r.category))?;
        let window = match (r.activated_at, r.expires_at) {
            (None, None) => PassWindow::Pending,
            (Some(activated_at), Some(expires_at)) => PassWindow::Activated {
                activated_at,
                expires_at,
            },
            _ => return Err(format!("pass {}: half-set activation window", r.id)),
        };
        Ok(Self {
            id: PassId(r.id),
            identity_id: IdentityId(r.identity_id),
            category,
            window,
            is_revoked: r.is_revoked,
            created_at: r.created_at,
            issued_by: IdentityId(r.issued_by),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SettingsRow {
    pub max_active_identities: i32,
    pub allow_new_temporary: bool,
    pub enable_hours_24: bool,
    pub enable_days_3: bool,
    pub enable_days_7: bool,
    pub enable_days_30: bool,
}

impl From<SettingsRow> for GlobalSettings {
    fn from(r: SettingsRow) -> Self {
        Self {
            max_active_identities: u32::try_from(r.max_active_identities).unwrap_or(0),
            allow_new_temporary: r.allow_new_temporary,
            enable_hours_24: r.enable_hours_24,
            enable_days_3: r.enable_days_3,
            enable_days_7: r.enable_days_7,
            enable_days_30: r.enable_days_30,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SessionRow {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionRow> for GroupSession {
    fn from(r: SessionRow) -> Self {
        Self {
            token: r.token,
            created_at: r.created_at,
            expires_at: r.expires_at,
        }
    }
}
