//! Authentication module: configuration, credential handling, token minting,
//! session binding, Rocket request guards, and HTTP route handlers.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod ownership;
pub mod passwords;
pub mod principal;
pub mod responses;
pub mod routes;
pub mod service;
pub mod session;
pub mod store;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult, FieldError};
pub use guards::{AuthenticatedPrincipal, BearerCredentials, RequestAuthenticator};
pub use jwt::JwtService;
pub use ownership::{Owned, require_owner};
pub use passwords::PasswordService;
pub use principal::{Principal, PrincipalId};
pub use service::AccountService;
pub use session::SessionBinder;
pub use store::{CredentialStore, MemoryCredentialStore, PgCredentialStore};

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub jwt_service: Arc<JwtService>,
    pub store: Arc<dyn CredentialStore>,
    pub authenticator: RequestAuthenticator,
    pub accounts: AccountService,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: PasswordService,
        jwt_service: JwtService,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let password_service = Arc::new(password_service);
        let jwt_service = Arc::new(jwt_service);
        let sessions = SessionBinder::new(store.clone(), jwt_service.clone());
        let authenticator = RequestAuthenticator::new(jwt_service.clone(), store.clone());
        let accounts = AccountService::new(store.clone(), password_service, sessions);

        Self {
            config,
            jwt_service,
            store,
            authenticator,
            accounts,
        }
    }

    pub fn from_config(config: AuthConfig, store: Arc<dyn CredentialStore>) -> AuthResult<Self> {
        let password_service = PasswordService::from_config(&config)?;
        let jwt_service = JwtService::from_config(&config)?;
        Ok(Self::new(config, password_service, jwt_service, store))
    }
}
