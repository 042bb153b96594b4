use crate::auth::{AuthError, AuthResult};

/// Authentication configuration loaded from environment variables.
#[derive(Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub token_leeway_secs: u64,
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub password_memory_kib: u32,
    pub password_iterations: u32,
    pub password_parallelism: u32,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let issuer =
            std::env::var("VIDTUBE_JWT_ISSUER").unwrap_or_else(|_| "http://localhost".into());
        let audience =
            std::env::var("VIDTUBE_JWT_AUDIENCE").unwrap_or_else(|_| "vidtube-api".into());
        let access_token_secret = std::env::var("VIDTUBE_ACCESS_TOKEN_SECRET")
            .map_err(|_| AuthError::Config("VIDTUBE_ACCESS_TOKEN_SECRET is required".into()))?;
        let refresh_token_secret = std::env::var("VIDTUBE_REFRESH_TOKEN_SECRET")
            .map_err(|_| AuthError::Config("VIDTUBE_REFRESH_TOKEN_SECRET is required".into()))?;
        let access_token_ttl_secs = env_number("VIDTUBE_ACCESS_TOKEN_TTL_SECS").unwrap_or(900);
        let refresh_token_ttl_secs =
            env_number("VIDTUBE_REFRESH_TOKEN_TTL_SECS").unwrap_or(10 * 24 * 60 * 60);
        let token_leeway_secs = env_number("VIDTUBE_TOKEN_LEEWAY_SECS").unwrap_or(0);
        let access_cookie_name = std::env::var("VIDTUBE_ACCESS_COOKIE_NAME")
            .unwrap_or_else(|_| "accessToken".into());
        let refresh_cookie_name = std::env::var("VIDTUBE_REFRESH_COOKIE_NAME")
            .unwrap_or_else(|_| "refreshToken".into());
        let cookie_domain = std::env::var("VIDTUBE_COOKIE_DOMAIN").ok();
        let cookie_secure = std::env::var("VIDTUBE_COOKIE_SECURE")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(true);
        let password_memory_kib = env_number("VIDTUBE_PASSWORD_MEMORY_KIB").unwrap_or(19 * 1024);
        let password_iterations = env_number("VIDTUBE_PASSWORD_ITERATIONS").unwrap_or(2);
        let password_parallelism = env_number("VIDTUBE_PASSWORD_PARALLELISM").unwrap_or(1);

        let config = Self {
            issuer,
            audience,
            access_token_secret,
            refresh_token_secret,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            token_leeway_secs,
            access_cookie_name,
            refresh_cookie_name,
            cookie_domain,
            cookie_secure,
            password_memory_kib,
            password_iterations,
            password_parallelism,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the token lifecycle.
    pub fn validate(&self) -> AuthResult<()> {
        if self.access_token_secret.is_empty() || self.refresh_token_secret.is_empty() {
            return Err(AuthError::Config("token secrets must not be empty".into()));
        }
        if self.access_token_ttl_secs <= 0 {
            return Err(AuthError::Config(
                "access token ttl must be positive".into(),
            ));
        }
        if self.refresh_token_ttl_secs <= self.access_token_ttl_secs {
            return Err(AuthError::Config(
                "refresh token ttl must exceed access token ttl".into(),
            ));
        }
        if self.access_cookie_name == self.refresh_cookie_name {
            return Err(AuthError::Config(
                "access and refresh cookies need distinct names".into(),
            ));
        }
        Ok(())
    }
}

// Secrets stay out of Debug output.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("token_leeway_secs", &self.token_leeway_secs)
            .field("access_cookie_name", &self.access_cookie_name)
            .field("refresh_cookie_name", &self.refresh_cookie_name)
            .field("cookie_domain", &self.cookie_domain)
            .field("cookie_secure", &self.cookie_secure)
            .finish_non_exhaustive()
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    parse_number(key, std::env::var(key).ok())
}

// A value that is set but unparsable falls back to the default with a warning.
fn parse_number<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a number, using the default", key, raw);
            None
        }
    }
}
