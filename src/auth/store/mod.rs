//! Credential store boundary: one principal record at a time, looked up by
//! id or by unique handle/email. Never scans.

use crate::auth::AuthResult;
use crate::auth::principal::{NewPrincipal, PrincipalId, PrincipalRecord, PrincipalUpdate};

pub mod memory;
pub mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

#[rocket::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up by handle or email. A handle match wins when both are given.
    async fn find_by_handle_or_email(
        &self,
        handle: Option<&str>,
        email: Option<&str>,
    ) -> AuthResult<Option<PrincipalRecord>>;

    async fn find_by_id(&self, id: PrincipalId) -> AuthResult<Option<PrincipalRecord>>;

    /// Insert a principal. Duplicate handle or email fails with `AuthError::Conflict`.
    async fn create(&self, principal: NewPrincipal) -> AuthResult<PrincipalRecord>;

    /// Apply a partial update. Returns `None` if the record is gone.
    async fn update_fields(
        &self,
        id: PrincipalId,
        update: PrincipalUpdate,
    ) -> AuthResult<Option<PrincipalRecord>>;

    /// Unconditionally overwrite (or clear) the live refresh fingerprint.
    /// Returns `false` if the record does not exist.
    async fn set_refresh_token(&self, id: PrincipalId, fingerprint: Option<&str>)
    -> AuthResult<bool>;

    /// Replace the live refresh fingerprint only if it still equals `expected`.
    /// This is the single atomic step that makes refresh tokens single-use.
    async fn swap_refresh_token(
        &self,
        id: PrincipalId,
        expected: &str,
        replacement: &str,
    ) -> AuthResult<bool>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> AuthResult<()>;
}
