use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool};
use uuid::Uuid;

use crate::auth::principal::{NewPrincipal, PrincipalId, PrincipalRecord, PrincipalUpdate};
use crate::auth::store::CredentialStore;
use crate::auth::{AuthError, AuthResult};

const PRINCIPAL_COLUMNS: &str = "id, handle, email, display_name, password_hash, refresh_token_fingerprint, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct PrincipalRow {
    id: Uuid,
    handle: String,
    email: String,
    display_name: String,
    password_hash: String,
    refresh_token_fingerprint: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PrincipalRow> for PrincipalRecord {
    fn from(row: PrincipalRow) -> Self {
        PrincipalRecord {
            id: PrincipalId(row.id),
            handle: row.handle,
            email: row.email,
            display_name: row.display_name,
            password_hash: row.password_hash,
            refresh_token_fingerprint: row.refresh_token_fingerprint,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// `users` table backed credential store.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[rocket::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_handle_or_email(
        &self,
        handle: Option<&str>,
        email: Option<&str>,
    ) -> AuthResult<Option<PrincipalRecord>> {
        if handle.is_none() && email.is_none() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM users \
             WHERE lower(handle) = lower($1) OR lower(email) = lower($2) \
             ORDER BY (lower(handle) = lower($1)) IS TRUE DESC \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(handle)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(PrincipalRecord::from))
    }

    async fn find_by_id(&self, id: PrincipalId) -> AuthResult<Option<PrincipalRecord>> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(PrincipalRecord::from))
    }

    async fn create(&self, principal: NewPrincipal) -> AuthResult<PrincipalRecord> {
        let sql = format!(
            "INSERT INTO users (id, handle, email, display_name, password_hash) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(PrincipalId::new().as_uuid())
            .bind(&principal.handle)
            .bind(&principal.email)
            .bind(&principal.display_name)
            .bind(&principal.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?;

        Ok(row.into())
    }

    async fn update_fields(
        &self,
        id: PrincipalId,
        update: PrincipalUpdate,
    ) -> AuthResult<Option<PrincipalRecord>> {
        let sql = format!(
            "UPDATE users SET \
                 email = COALESCE($2, email), \
                 display_name = COALESCE($3, display_name), \
                 password_hash = COALESCE($4, password_hash), \
                 updated_at = now() \
             WHERE id = $1 RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id.as_uuid())
            .bind(update.email)
            .bind(update.display_name)
            .bind(update.password_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)?;

        Ok(row.map(PrincipalRecord::from))
    }

    async fn set_refresh_token(
        &self,
        id: PrincipalId,
        fingerprint: Option<&str>,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token_fingerprint = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn swap_refresh_token(
        &self,
        id: PrincipalId,
        expected: &str,
        replacement: &str,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token_fingerprint = $3, updated_at = now() \
             WHERE id = $1 AND refresh_token_fingerprint = $2",
        )
        .bind(id.as_uuid())
        .bind(expected)
        .bind(replacement)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> AuthResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn map_write_error(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or_default();
            let field = if constraint.contains("email") {
                "email"
            } else {
                "userName"
            };
            return AuthError::Conflict(format!("{field} already registered"));
        }
    }
    AuthError::from(err)
}
