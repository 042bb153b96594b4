use std::sync::Arc;

use rocket::Request;
use rocket::State;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::jwt::{JwtService, KindedClaims};
use crate::auth::principal::{Principal, PrincipalId};
use crate::auth::store::CredentialStore;
use crate::auth::{AuthError, AuthResult, AuthState};

/// Request-scoped view of the caller, with credential fields stripped.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthenticatedPrincipal(pub Principal);

impl AuthenticatedPrincipal {
    pub fn id(&self) -> PrincipalId {
        self.0.id
    }

    pub fn principal(&self) -> &Principal {
        &self.0
    }

    pub fn into_principal(self) -> Principal {
        self.0
    }
}

/// Raw bearer material found on a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerCredentials<'a> {
    pub cookie: Option<&'a str>,
    pub authorization: Option<&'a str>,
}

impl<'a> BearerCredentials<'a> {
    /// The cookie wins when both sources are present.
    pub fn token(&self) -> AuthResult<&'a str> {
        if let Some(cookie) = self.cookie.filter(|value| !value.is_empty()) {
            return Ok(cookie);
        }

        let header = self.authorization.ok_or(AuthError::Unauthorized)?;
        let mut parts = header.splitn(2, ' ');
        let scheme = parts.next().unwrap_or_default();
        let token = parts.next().unwrap_or_default().trim();
        if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
            Ok(token)
        } else {
            Err(AuthError::Unauthorized)
        }
    }
}

/// Turns bearer credentials into an authenticated principal.
#[derive(Clone)]
pub struct RequestAuthenticator {
    jwt_service: Arc<JwtService>,
    store: Arc<dyn CredentialStore>,
}

impl RequestAuthenticator {
    pub fn new(jwt_service: Arc<JwtService>, store: Arc<dyn CredentialStore>) -> Self {
        Self { jwt_service, store }
    }

    /// Never rotates: expired access tokens go back to the client, which
    /// must call the refresh endpoint itself.
    pub async fn authenticate(
        &self,
        credentials: BearerCredentials<'_>,
    ) -> AuthResult<AuthenticatedPrincipal> {
        let token = credentials.token()?;
        let claims = self.jwt_service.verify_access_token(token)?;
        let principal_id = claims.principal_id()?;

        let record = self
            .store
            .find_by_id(principal_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        Ok(AuthenticatedPrincipal(record.into_principal()))
    }
}

/// Error recorded by the guard so the catchers can render it.
#[derive(Debug, Default)]
pub(crate) struct GuardFailure(pub Option<(u16, &'static str, String)>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedPrincipal {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match extract_principal(request).await {
            Ok(principal) => Outcome::Success(principal),
            Err(err) => {
                log::debug!("request authentication failed: {}", err);
                request.local_cache(|| {
                    GuardFailure(Some((err.status().code, err.code(), err.public_message())))
                });
                Outcome::Error((err.status(), err))
            }
        }
    }
}

async fn extract_principal(request: &Request<'_>) -> AuthResult<AuthenticatedPrincipal> {
    let auth_state = request
        .guard::<&State<AuthState>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))?;

    let cookie = request
        .cookies()
        .get(&auth_state.config.access_cookie_name)
        .map(|cookie| cookie.value());
    let credentials = BearerCredentials {
        cookie,
        authorization: request.headers().get_one("Authorization"),
    };

    auth_state.authenticator.authenticate(credentials).await
}
