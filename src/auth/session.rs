use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha512};

use crate::auth::jwt::{JwtService, KindedClaims, SignedToken};
use crate::auth::principal::{Principal, PrincipalId};
use crate::auth::store::CredentialStore;
use crate::auth::{AuthError, AuthResult};

/// Access/refresh pair handed to the client after login or rotation.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub access: SignedToken,
    pub refresh: SignedToken,
}

/// Binds exactly one live refresh token to each principal.
///
/// The store keeps a fingerprint of the live token. Rotation commits the
/// replacement with a compare-and-swap against the presented token's
/// fingerprint, so a refresh token can be exchanged at most once and a
/// replayed or stale token is rejected.
#[derive(Clone)]
pub struct SessionBinder {
    store: Arc<dyn CredentialStore>,
    jwt_service: Arc<JwtService>,
}

impl SessionBinder {
    pub fn new(store: Arc<dyn CredentialStore>, jwt_service: Arc<JwtService>) -> Self {
        Self { store, jwt_service }
    }

    /// Start a new session, replacing whatever session was live before.
    pub async fn login(&self, principal: &Principal, now: DateTime<Utc>) -> AuthResult<IssuedSession> {
        let session = self.issue(principal, now)?;
        let fingerprint = fingerprint(&session.refresh.token);

        if !self
            .store
            .set_refresh_token(principal.id, Some(&fingerprint))
            .await?
        {
            return Err(AuthError::SessionInvalid);
        }

        log::info!("session started for principal {}", principal.id);
        Ok(session)
    }

    /// Exchange a live refresh token for a fresh pair.
    pub async fn rotate(
        &self,
        presented: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<(Principal, IssuedSession)> {
        let claims = self.jwt_service.verify_refresh_token(presented)?;
        let principal_id = claims.principal_id()?;

        let Some(record) = self.store.find_by_id(principal_id).await? else {
            log::warn!("refresh token presented for missing principal {}", principal_id);
            return Err(AuthError::SessionInvalid);
        };

        let presented_fingerprint = fingerprint(presented);
        let live = record
            .refresh_token_fingerprint
            .as_deref()
            .is_some_and(|stored| {
                constant_time_eq::constant_time_eq(stored.as_bytes(), presented_fingerprint.as_bytes())
            });
        if !live {
            log::warn!(
                "stale or replayed refresh token rejected for principal {}",
                principal_id
            );
            return Err(AuthError::SessionInvalid);
        }

        let principal = record.into_principal();
        let session = self.issue(&principal, now)?;
        let swapped = self
            .store
            .swap_refresh_token(
                principal_id,
                &presented_fingerprint,
                &fingerprint(&session.refresh.token),
            )
            .await?;
        if !swapped {
            log::warn!(
                "concurrent refresh lost the race for principal {}",
                principal_id
            );
            return Err(AuthError::SessionInvalid);
        }

        log::info!("session rotated for principal {}", principal_id);
        Ok((principal, session))
    }

    /// Drop the live refresh token. Safe to call repeatedly.
    pub async fn logout(&self, principal_id: PrincipalId) -> AuthResult<()> {
        self.store.set_refresh_token(principal_id, None).await?;
        log::info!("session cleared for principal {}", principal_id);
        Ok(())
    }

    fn issue(&self, principal: &Principal, now: DateTime<Utc>) -> AuthResult<IssuedSession> {
        let access = self.jwt_service.issue_access_token(principal, now)?;
        let refresh = self.jwt_service.issue_refresh_token(principal.id, now)?;
        Ok(IssuedSession { access, refresh })
    }
}

/// Stored form of a refresh token: base64 SHA-512 digest.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(token.as_bytes());
    STANDARD_NO_PAD.encode(hasher.finalize())
}

mod constant_time_eq {
    /// Constant-time comparison to avoid timing side-channels.
    pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }

        let mut result: u8 = 0;
        for (&x, &y) in a.iter().zip(b.iter()) {
            result |= x ^ y;
        }

        result == 0
    }
}
