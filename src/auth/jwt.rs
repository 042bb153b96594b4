use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::principal::{Principal, PrincipalId};
use crate::auth::{AuthConfig, AuthError, AuthResult};

/// Which of the two bearer token classes a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub typ: TokenKind,
    #[serde(rename = "userName")]
    pub handle: String,
    #[serde(rename = "fullName")]
    pub display_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub typ: TokenKind,
}

pub(crate) trait KindedClaims: DeserializeOwned {
    fn kind(&self) -> TokenKind;
    fn subject(&self) -> &str;

    fn principal_id(&self) -> AuthResult<PrincipalId> {
        self.subject().parse().map_err(|_| AuthError::TokenInvalid)
    }
}

impl KindedClaims for AccessTokenClaims {
    fn kind(&self) -> TokenKind {
        self.typ
    }

    fn subject(&self) -> &str {
        &self.sub
    }
}

impl KindedClaims for RefreshTokenClaims {
    fn kind(&self) -> TokenKind {
        self.typ
    }

    fn subject(&self) -> &str {
        &self.sub
    }
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token policy published on the health endpoint. Never carries secrets.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JwtMetadata {
    pub algorithm: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and verifies HS256 access and refresh tokens.
///
/// The two kinds are signed with separate secrets and carry a `typ` claim,
/// so neither can stand in for the other.
pub struct JwtService {
    access_keys: SigningKeys,
    refresh_keys: SigningKeys,
    validation: Validation,
    issuer: String,
    audience: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[config.audience.clone()]);
        validation.set_issuer(&[config.issuer.clone()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.leeway = config.token_leeway_secs;

        Ok(Self {
            access_keys: SigningKeys::from_secret(&config.access_token_secret),
            refresh_keys: SigningKeys::from_secret(&config.refresh_token_secret),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        })
    }

    pub fn issue_access_token(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> AuthResult<SignedToken> {
        let expires_at = now + self.access_token_ttl;
        let claims = AccessTokenClaims {
            sub: principal.id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            typ: TokenKind::Access,
            handle: principal.handle.clone(),
            display_name: principal.display_name.clone(),
            email: principal.email.clone(),
        };

        let token = self.sign(&claims, &self.access_keys)?;
        Ok(SignedToken { token, expires_at })
    }

    pub fn issue_refresh_token(
        &self,
        principal_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> AuthResult<SignedToken> {
        let expires_at = now + self.refresh_token_ttl;
        let claims = RefreshTokenClaims {
            sub: principal_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            typ: TokenKind::Refresh,
        };

        let token = self.sign(&claims, &self.refresh_keys)?;
        Ok(SignedToken { token, expires_at })
    }

    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        self.verify(token, TokenKind::Access, &self.access_keys)
    }

    pub fn verify_refresh_token(&self, token: &str) -> AuthResult<RefreshTokenClaims> {
        self.verify(token, TokenKind::Refresh, &self.refresh_keys)
    }

    pub fn metadata(&self) -> JwtMetadata {
        JwtMetadata {
            algorithm: "HS256".to_string(),
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            access_token_ttl_secs: self.access_token_ttl.num_seconds(),
            refresh_token_ttl_secs: self.refresh_token_ttl.num_seconds(),
        }
    }

    fn sign<C: Serialize>(&self, claims: &C, keys: &SigningKeys) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &keys.encoding)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }

    fn verify<C: KindedClaims>(
        &self,
        token: &str,
        expected: TokenKind,
        keys: &SigningKeys,
    ) -> AuthResult<C> {
        let data = decode::<C>(token, &keys.decoding, &self.validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            }
        })?;

        if data.claims.kind() != expected {
            return Err(AuthError::TokenInvalid);
        }
        data.claims.principal_id()?;

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_auth_config;

    fn principal() -> Principal {
        let now = Utc::now();
        Principal {
            id: PrincipalId::new(),
            handle: "alice".into(),
            email: "alice@x.com".into(),
            display_name: "Alice Liddell".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn service() -> JwtService {
        JwtService::from_config(&test_auth_config()).expect("jwt service")
    }

    #[test]
    fn issues_and_decodes_access_tokens() {
        let service = service();
        let principal = principal();

        let token = service
            .issue_access_token(&principal, Utc::now())
            .expect("issue token");
        let claims = service
            .verify_access_token(&token.token)
            .expect("decode token");

        assert_eq!(claims.principal_id().expect("id"), principal.id);
        assert_eq!(claims.handle, "alice");
        assert_eq!(claims.display_name, "Alice Liddell");
        assert_eq!(claims.email, "alice@x.com");
        assert_eq!(claims.typ, TokenKind::Access);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_tokens_outlive_access_tokens() {
        let service = service();
        let principal = principal();
        let now = Utc::now();

        let access = service.issue_access_token(&principal, now).expect("access");
        let refresh = service.issue_refresh_token(principal.id, now).expect("refresh");
        assert!(refresh.expires_at > access.expires_at);

        let claims = service
            .verify_refresh_token(&refresh.token)
            .expect("verify refresh");
        assert_eq!(claims.principal_id().expect("id"), principal.id);
    }

    #[test]
    fn tokens_issued_together_are_distinct() {
        let service = service();
        let principal = principal();
        let now = Utc::now();
        let first = service.issue_refresh_token(principal.id, now).expect("first");
        let second = service.issue_refresh_token(principal.id, now).expect("second");
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let service = service();
        let principal = principal();
        let now = Utc::now();
        let access = service.issue_access_token(&principal, now).expect("access");
        let refresh = service.issue_refresh_token(principal.id, now).expect("refresh");

        assert!(matches!(
            service.verify_refresh_token(&access.token),
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(
            service.verify_access_token(&refresh.token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn kind_claim_is_checked_even_with_a_shared_secret() {
        let mut config = test_auth_config();
        config.refresh_token_secret = config.access_token_secret.clone();
        let service = JwtService::from_config(&config).expect("jwt service");
        let principal = principal();

        let access = service
            .issue_access_token(&principal, Utc::now())
            .expect("access");
        assert!(matches!(
            service.verify_refresh_token(&access.token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn expired_tokens_are_reported_as_expired() {
        let service = service();
        let principal = principal();
        let issued_at = Utc::now() - Duration::hours(2);

        let access = service
            .issue_access_token(&principal, issued_at)
            .expect("access");
        assert!(matches!(
            service.verify_access_token(&access.token),
            Err(AuthError::TokenExpired)
        ));

        let refresh_issued_at = Utc::now() - Duration::days(30);
        let refresh = service
            .issue_refresh_token(principal.id, refresh_issued_at)
            .expect("refresh");
        assert!(matches!(
            service.verify_refresh_token(&refresh.token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn tampered_and_foreign_tokens_are_invalid() {
        let service = service();
        let principal = principal();
        let token = service
            .issue_access_token(&principal, Utc::now())
            .expect("access")
            .token;

        let (unsigned, signature) = token.rsplit_once('.').expect("jwt has a signature");
        let flipped = if signature.starts_with('A') { 'B' } else { 'A' };
        let tampered = format!("{unsigned}.{flipped}{}", &signature[1..]);
        assert!(matches!(
            service.verify_access_token(&tampered),
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(
            service.verify_access_token("not-a-jwt"),
            Err(AuthError::TokenInvalid)
        ));

        let mut other = test_auth_config();
        other.access_token_secret = "a-rotated-signing-secret".into();
        let rotated = JwtService::from_config(&other).expect("jwt service");
        assert!(matches!(
            rotated.verify_access_token(&token),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn metadata_reports_policy_without_secrets() {
        let config = test_auth_config();
        let meta = service().metadata();
        assert_eq!(meta.algorithm, "HS256");
        assert_eq!(meta.access_token_ttl_secs, config.access_token_ttl_secs);
        assert_eq!(meta.refresh_token_ttl_secs, config.refresh_token_ttl_secs);
    }
}
