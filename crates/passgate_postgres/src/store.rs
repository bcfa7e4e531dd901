//! Postgres-backed pass store.
//!
//! All SQL is runtime-checked (sqlx::query, not sqlx::query!) to avoid a
//! compile-time DB requirement. Every pass transition is a single UPDATE
//! whose WHERE clause restates the expected prior state; `rows_affected()`
//! tells the caller whether it won.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use passgate_core::error::PassGateError;
use passgate_core::ports::{PassStore, Result, SessionStore};
use passgate_core::types::*;

use crate::rows::{IdentityRow, PassRow, SessionRow, SettingsRow};

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_passgate.sql",
    include_str!("../migrations/0001_passgate.sql"),
)];

/// Apply the bundled schema. Every statement is idempotent.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    for (name, sql) in MIGRATIONS {
        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|e| anyhow!("migration {name} failed: {e}"))?;
        tracing::debug!(migration = name, "applied");
    }
    Ok(())
}

const IDENTITY_COLUMNS: &str =
    "id, display_name, role, is_master, is_active, email, phone, created_at";

const PASS_COLUMNS: &str =
    "id, identity_id, category, activated_at, expires_at, is_revoked, created_at, issued_by";

const SETTINGS_COLUMNS: &str = "max_active_identities, allow_new_temporary, \
     enable_hours_24, enable_days_3, enable_days_7, enable_days_30";

/// Unexpired-pass predicate (pending, or expiry still ahead), shared by the
/// passless listing and the conditional deactivation. `$1` is `now`; `i` aliases the identities row.
const HAS_UNEXPIRED_PASS: &str = r#"
    EXISTS (
        SELECT 1 FROM access_passes p
        WHERE p.identity_id = i.id
          AND NOT p.is_revoked
          AND (p.activated_at IS NULL OR p.expires_at > $1)
    )
"#;

/// Advisory lock key serialising capacity-checked identity inserts.
const ROSTER_LOCK_KEY: i64 = 0x7061_7373_6761_7465;

fn db_err(e: sqlx::Error) -> PassGateError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return PassGateError::Conflict("display name already in use".into());
        }
    }
    PassGateError::Internal(anyhow!(e))
}

fn pass_from_row(row: PassRow) -> Result<AccessPass> {
    row.try_into()
        .map_err(|e: String| PassGateError::Internal(anyhow!(e)))
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

pub struct PgPassStore {
    pool: PgPool,
}

impl PgPassStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PassStore for PgPassStore {
    async fn get_identity(&self, id: IdentityId) -> Result<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(Identity::from))
    }

    async fn list_identities(&self) -> Result<Vec<Identity>> {
        let rows = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Identity::from).collect())
    }

    async fn list_active_identities(&self) -> Result<Vec<Identity>> {
        let rows = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE is_active ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Identity::from).collect())
    }

    async fn create_identity(
        &self,
        new: &NewIdentity,
        created_at: DateTime<Utc>,
    ) -> Result<Identity> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            INSERT INTO identities (display_name, role, is_master, is_active, email, phone, created_at)
            VALUES ($1, $2, $3, TRUE, $4, $5, $6)
            RETURNING {IDENTITY_COLUMNS}
            "#
        ))
        .bind(&new.display_name)
        .bind(new.role.as_str())
        .bind(new.is_master)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn create_identity_within(
        &self,
        new: &NewIdentity,
        created_at: DateTime<Utc>,
        limits: RosterLimits,
    ) -> Result<CreateOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        // Held until commit, so no other capacity-checked insert can count
        // in between our count and our insert.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ROSTER_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;

        let (active, masters): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE role = 'PRIVILEGED' AND is_master)
            FROM identities WHERE is_active
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;

        if to_count(active) >= limits.max_active {
            return Ok(CreateOutcome::AtCapacity);
        }
        if new.is_master && to_count(masters) >= limits.max_masters {
            return Ok(CreateOutcome::MasterCapReached);
        }

        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            INSERT INTO identities (display_name, role, is_master, is_active, email, phone, created_at)
            VALUES ($1, $2, $3, TRUE, $4, $5, $6)
            RETURNING {IDENTITY_COLUMNS}
            "#
        ))
        .bind(&new.display_name)
        .bind(new.role.as_str())
        .bind(new.is_master)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(CreateOutcome::Created(row.into()))
    }

    async fn update_identity(
        &self,
        id: IdentityId,
        patch: &IdentityPatch,
    ) -> Result<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            UPDATE identities SET
                display_name = COALESCE($2, display_name),
                role         = COALESCE($3, role),
                is_master    = COALESCE($4, is_master),
                is_active    = COALESCE($5, is_active),
                email        = COALESCE($6, email),
                phone        = COALESCE($7, phone)
            WHERE id = $1
            RETURNING {IDENTITY_COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(&patch.display_name)
        .bind(patch.role.map(|r| r.as_str()))
        .bind(patch.is_master)
        .bind(patch.is_active)
        .bind(&patch.email)
        .bind(&patch.phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Identity::from))
    }

    async fn set_identity_active(&self, id: IdentityId, active: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE identities SET is_active = $2 WHERE id = $1 AND is_active <> $2",
        )
        .bind(id.0)
        .bind(active)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_active_identities(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM identities WHERE is_active")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(to_count(n))
    }

    async fn count_active_masters(&self, excluding: Option<IdentityId>) -> Result<u64> {
        let n: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM identities
            WHERE role = 'PRIVILEGED' AND is_master AND is_active
              AND ($1::BIGINT IS NULL OR id <> $1)
            "#,
        )
        .bind(excluding.map(|id| id.0))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(to_count(n))
    }

    async fn get_pass(&self, id: PassId) -> Result<Option<AccessPass>> {
        let row = sqlx::query_as::<_, PassRow>(&format!(
            "SELECT {PASS_COLUMNS} FROM access_passes WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        row.map(pass_from_row).transpose()
    }

    async fn list_non_revoked_passes(&self, identity_id: IdentityId) -> Result<Vec<AccessPass>> {
        let rows = sqlx::query_as::<_, PassRow>(&format!(
            r#"
            SELECT {PASS_COLUMNS} FROM access_passes
            WHERE identity_id = $1 AND NOT is_revoked
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(identity_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        rows.into_iter().map(pass_from_row).collect()
    }

    async fn revoke_pass(&self, id: PassId) -> Result<bool> {
        let result =
            sqlx::query("UPDATE access_passes SET is_revoked = TRUE WHERE id = $1 AND NOT is_revoked")
                .bind(id.0)
                .execute(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn activate_pass_if_still_pending(
        &self,
        id: PassId,
        activated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE access_passes
            SET activated_at = $2, expires_at = $3
            WHERE id = $1 AND NOT is_revoked AND activated_at IS NULL
            "#,
        )
        .bind(id.0)
        .bind(activated_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn issue_pending_pass(&self, new: &NewPass) -> Result<(AccessPass, u64)> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        // Serialise issuance per identity.
        let locked: Option<i64> =
            sqlx::query_scalar("SELECT id FROM identities WHERE id = $1 FOR UPDATE")
                .bind(new.identity_id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| anyhow!(e))?;
        if locked.is_none() {
            return Err(PassGateError::NotFound(format!("identity {}", new.identity_id)));
        }

        let revoked = sqlx::query(
            r#"
            UPDATE access_passes SET is_revoked = TRUE
            WHERE identity_id = $1 AND NOT is_revoked AND activated_at IS NULL
            "#,
        )
        .bind(new.identity_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?
        .rows_affected();

        let row = sqlx::query_as::<_, PassRow>(&format!(
            r#"
            INSERT INTO access_passes (identity_id, category, is_revoked, created_at, issued_by)
            VALUES ($1, $2, FALSE, $3, $4)
            RETURNING {PASS_COLUMNS}
            "#
        ))
        .bind(new.identity_id.0)
        .bind(new.category.as_str())
        .bind(new.created_at)
        .bind(new.issued_by.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;

        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok((pass_from_row(row)?, revoked))
    }

    async fn list_expired_passes(&self, now: DateTime<Utc>) -> Result<Vec<AccessPass>> {
        let rows = sqlx::query_as::<_, PassRow>(&format!(
            r#"
            SELECT {PASS_COLUMNS} FROM access_passes
            WHERE NOT is_revoked AND expires_at IS NOT NULL AND expires_at <= $1
            ORDER BY id
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        rows.into_iter().map(pass_from_row).collect()
    }

    async fn list_passless_temporaries(&self, now: DateTime<Utc>) -> Result<Vec<IdentityId>> {
        let ids: Vec<i64> = sqlx::query_scalar(&format!(
            r#"
            SELECT i.id FROM identities i
            WHERE i.role = 'TEMPORARY' AND i.is_active AND NOT {HAS_UNEXPIRED_PASS}
            ORDER BY i.id
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(ids.into_iter().map(IdentityId).collect())
    }

    async fn deactivate_if_passless(&self, id: IdentityId, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        // Same lock issuance takes, so a pass issued concurrently is either
        // visible to the check below or issued after the deactivation.
        let locked: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM identities WHERE id = $1 AND role = 'TEMPORARY' AND is_active FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;
        if locked.is_none() {
            return Ok(false);
        }

        let result = sqlx::query(&format!(
            r#"
            UPDATE identities i SET is_active = FALSE
            WHERE i.id = $2 AND NOT {HAS_UNEXPIRED_PASS}
            "#
        ))
        .bind(now)
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;

        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_unexpired_passes_by_category(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(PassCategory, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT category, COUNT(*) FROM access_passes
            WHERE NOT is_revoked AND (expires_at IS NULL OR expires_at > $1)
            GROUP BY category
            ORDER BY category
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        rows.into_iter()
            .map(|(category, n)| {
                PassCategory::parse(&category)
                    .map(|c| (c, to_count(n)))
                    .ok_or_else(|| PassGateError::Internal(anyhow!("unknown category '{category}'")))
            })
            .collect()
    }

    async fn get_settings(&self) -> Result<Option<GlobalSettings>> {
        let row = sqlx::query_as::<_, SettingsRow>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM global_settings WHERE id = 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(GlobalSettings::from))
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> Result<Option<GlobalSettings>> {
        let max = patch
            .max_active_identities
            .map(i32::try_from)
            .transpose()
            .map_err(|_| PassGateError::InvalidInput("max_active_identities out of range".into()))?;
        let row = sqlx::query_as::<_, SettingsRow>(&format!(
            r#"
            UPDATE global_settings SET
                max_active_identities = COALESCE($1, max_active_identities),
                allow_new_temporary   = COALESCE($2, allow_new_temporary),
                enable_hours_24       = COALESCE($3, enable_hours_24),
                enable_days_3         = COALESCE($4, enable_days_3),
                enable_days_7         = COALESCE($5, enable_days_7),
                enable_days_30        = COALESCE($6, enable_days_30)
            WHERE id = 1
            RETURNING {SETTINGS_COLUMNS}
            "#
        ))
        .bind(max)
        .bind(patch.allow_new_temporary)
        .bind(patch.enable_hours_24)
        .bind(patch.enable_days_3)
        .bind(patch.enable_days_7)
        .bind(patch.enable_days_30)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(GlobalSettings::from))
    }
}

#[async_trait]
impl SessionStore for PgPassStore {
    async fn create_session(&self, session: &GroupSession) -> Result<()> {
        sqlx::query("INSERT INTO group_sessions (token, created_at, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.token)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<GroupSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token, created_at, expires_at FROM group_sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(GroupSession::from))
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM group_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected())
    }
}
