//! Account flows built on the credential verifier, the credential store and
//! the session binder. Route handlers stay thin wrappers around these.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::auth::passwords::PasswordService;
use crate::auth::principal::{NewPrincipal, Principal, PrincipalId, PrincipalUpdate, normalize_identity};
use crate::auth::session::{IssuedSession, SessionBinder};
use crate::auth::store::CredentialStore;
use crate::auth::{AuthError, AuthResult, FieldError};

static HANDLE_REGEX: OnceLock<Regex> = OnceLock::new();
static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn handle_regex() -> &'static Regex {
    HANDLE_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_.-]{0,31}$").expect("Invalid handle regex")
    })
}

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex")
    })
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoginCredentials {
    pub handle: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub principal: Principal,
    pub session: IssuedSession,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    password_service: Arc<PasswordService>,
    sessions: SessionBinder,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        password_service: Arc<PasswordService>,
        sessions: SessionBinder,
    ) -> Self {
        Self {
            store,
            password_service,
            sessions,
        }
    }

    pub async fn register(&self, registration: Registration) -> AuthResult<Principal> {
        let handle = normalize_identity(&registration.handle);
        let email = normalize_identity(&registration.email);
        let display_name = registration.display_name.trim().to_string();

        let mut errors = Vec::new();
        validate_handle(&handle, &mut errors);
        validate_email(&email, &mut errors);
        if display_name.is_empty() {
            errors.push(FieldError::new("fullName", "full name is required"));
        }
        validate_password("password", &registration.password, &mut errors);
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        if self
            .store
            .find_by_handle_or_email(Some(&handle), Some(&email))
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict(
                "a user with this userName or email already exists".into(),
            ));
        }

        let password_hash = self.password_service.hash_password(&registration.password)?;
        let record = self
            .store
            .create(NewPrincipal {
                handle,
                email,
                display_name,
                password_hash,
            })
            .await?;

        log::info!("registered principal {} ({})", record.id, record.handle);
        Ok(record.into_principal())
    }

    /// Unknown identities and wrong passwords both end in `InvalidCredentials`.
    pub async fn login(
        &self,
        credentials: LoginCredentials,
        now: DateTime<Utc>,
    ) -> AuthResult<LoginOutcome> {
        let handle = credentials
            .handle
            .as_deref()
            .map(normalize_identity)
            .filter(|value| !value.is_empty());
        let email = credentials
            .email
            .as_deref()
            .map(normalize_identity)
            .filter(|value| !value.is_empty());

        let mut errors = Vec::new();
        if handle.is_none() && email.is_none() {
            errors.push(FieldError::new("userName", "userName or email is required"));
        }
        if credentials.password.is_empty() {
            errors.push(FieldError::new("password", "password is required"));
        }
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let record = self
            .store
            .find_by_handle_or_email(handle.as_deref(), email.as_deref())
            .await?;

        let Some(record) = record else {
            self.password_service
                .verify_against_dummy(&credentials.password);
            log::debug!("login rejected: unknown identity");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .password_service
            .verify_password(&credentials.password, &record.password_hash)?
        {
            log::debug!("login rejected: bad password for principal {}", record.id);
            return Err(AuthError::InvalidCredentials);
        }

        let principal = record.into_principal();
        let session = self.sessions.login(&principal, now).await?;
        Ok(LoginOutcome { principal, session })
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<(Principal, IssuedSession)> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::Unauthorized);
        }
        self.sessions.rotate(refresh_token, now).await
    }

    pub async fn logout(&self, principal_id: PrincipalId) -> AuthResult<()> {
        self.sessions.logout(principal_id).await
    }

    /// The old password must verify before the new one is accepted.
    pub async fn change_password(
        &self,
        principal_id: PrincipalId,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let mut errors = Vec::new();
        if old_password.is_empty() {
            errors.push(FieldError::new("oldPassword", "old password is required"));
        }
        validate_password("newPassword", new_password, &mut errors);
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let record = self
            .store
            .find_by_id(principal_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !self
            .password_service
            .verify_password(old_password, &record.password_hash)?
        {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self.password_service.hash_password(new_password)?;
        self.store
            .update_fields(
                principal_id,
                PrincipalUpdate {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(AuthError::Unauthorized)?;

        log::info!("password changed for principal {}", principal_id);
        Ok(())
    }

    pub async fn update_account(
        &self,
        principal_id: PrincipalId,
        update: AccountUpdate,
    ) -> AuthResult<Principal> {
        let display_name = update
            .display_name
            .map(|name| name.trim().to_string());
        let email = update.email.as_deref().map(normalize_identity);

        let changes = PrincipalUpdate {
            email,
            display_name,
            password_hash: None,
        };

        let mut errors = Vec::new();
        if changes.is_empty() {
            errors.push(FieldError::new("fullName", "nothing to update"));
        }
        if changes.display_name.as_deref() == Some("") {
            errors.push(FieldError::new("fullName", "full name must not be empty"));
        }
        if let Some(email) = &changes.email {
            validate_email(email, &mut errors);
        }
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let record = self
            .store
            .update_fields(principal_id, changes)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        Ok(record.into_principal())
    }
}

fn validate_handle(handle: &str, errors: &mut Vec<FieldError>) {
    if handle.is_empty() {
        errors.push(FieldError::new("userName", "userName is required"));
    } else if !handle_regex().is_match(handle) {
        errors.push(FieldError::new(
            "userName",
            "userName may only contain letters, digits, '.', '_' and '-' (max 32)",
        ));
    }
}

fn validate_email(email: &str, errors: &mut Vec<FieldError>) {
    if email.is_empty() {
        errors.push(FieldError::new("email", "email is required"));
    } else if !email_regex().is_match(email) {
        errors.push(FieldError::new("email", "email is not a valid address"));
    }
}

fn validate_password(field: &str, password: &str, errors: &mut Vec<FieldError>) {
    if password.trim().is_empty() {
        errors.push(FieldError::new(field, "password is required"));
    }
}
