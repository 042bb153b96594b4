use chrono::{DateTime, Utc};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Catcher, Request, Route, State, catch, catchers, get, patch, post};
use rocket_okapi::openapi;
use time::Duration as TimeDuration;

use crate::auth::guards::{AuthenticatedPrincipal, GuardFailure};
use crate::auth::principal::Principal;
use crate::auth::responses::{
    AuthErrorResponse, ChangePasswordRequest, LoginRequest, LoginResponse, MessageResponse,
    RefreshRequest, RefreshResponse, RegisterRequest, UpdateAccountRequest,
};
use crate::auth::service::{AccountUpdate, LoginCredentials, Registration};
use crate::auth::session::IssuedSession;
use crate::auth::{AuthConfig, AuthError, AuthState};

type AuthRouteResult<T> = Result<Json<T>, status::Custom<Json<AuthErrorResponse>>>;

#[openapi(tag = "Auth")]
#[post("/users/register", data = "<payload>")]
pub async fn register(
    state: &State<AuthState>,
    payload: Json<RegisterRequest>,
) -> Result<status::Custom<Json<Principal>>, status::Custom<Json<AuthErrorResponse>>> {
    let payload = payload.into_inner();
    let principal = state
        .accounts
        .register(Registration {
            handle: payload.user_name,
            email: payload.email,
            display_name: payload.full_name,
            password: payload.password,
        })
        .await
        .map_err(respond_error)?;

    Ok(status::Custom(Status::Created, Json(principal)))
}

#[openapi(tag = "Auth")]
#[post("/users/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
    payload: Json<LoginRequest>,
) -> AuthRouteResult<LoginResponse> {
    let payload = payload.into_inner();
    let outcome = state
        .accounts
        .login(
            LoginCredentials {
                handle: payload.user_name,
                email: payload.email,
                password: payload.password,
            },
            Utc::now(),
        )
        .await
        .map_err(respond_error)?;

    set_session_cookies(cookies, &state.config, &outcome.session);

    let IssuedSession { access, refresh } = outcome.session;
    Ok(Json(LoginResponse {
        user: outcome.principal,
        access_token: access.token,
        access_token_expires_at: access.expires_at,
        refresh_token: refresh.token,
        refresh_token_expires_at: refresh.expires_at,
    }))
}

#[openapi(tag = "Auth")]
#[post("/users/refresh-token", data = "<payload>")]
pub async fn refresh_token(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
    payload: Option<Json<RefreshRequest>>,
) -> AuthRouteResult<RefreshResponse> {
    let from_cookie = cookies
        .get(&state.config.refresh_cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());
    let presented = from_cookie
        .or_else(|| payload.and_then(|json| json.into_inner().refresh_token))
        .unwrap_or_default();

    let (_, session) = state
        .accounts
        .refresh(&presented, Utc::now())
        .await
        .map_err(respond_error)?;

    set_session_cookies(cookies, &state.config, &session);

    let IssuedSession { access, refresh } = session;
    Ok(Json(RefreshResponse {
        access_token: access.token,
        access_token_expires_at: access.expires_at,
        refresh_token: refresh.token,
        refresh_token_expires_at: refresh.expires_at,
    }))
}

#[openapi(tag = "Auth")]
#[post("/users/logout")]
pub async fn logout(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
    caller: AuthenticatedPrincipal,
) -> AuthRouteResult<MessageResponse> {
    state
        .accounts
        .logout(caller.id())
        .await
        .map_err(respond_error)?;

    clear_session_cookies(cookies, &state.config);
    Ok(Json(MessageResponse::new("logged out")))
}

#[openapi(tag = "Auth")]
#[post("/users/change-password", data = "<payload>")]
pub async fn change_password(
    state: &State<AuthState>,
    caller: AuthenticatedPrincipal,
    payload: Json<ChangePasswordRequest>,
) -> AuthRouteResult<MessageResponse> {
    state
        .accounts
        .change_password(caller.id(), &payload.old_password, &payload.new_password)
        .await
        .map_err(respond_error)?;

    Ok(Json(MessageResponse::new("password changed")))
}

#[openapi(tag = "Auth")]
#[get("/users/current-user")]
pub async fn current_user(caller: AuthenticatedPrincipal) -> Json<Principal> {
    Json(caller.into_principal())
}

#[openapi(tag = "Auth")]
#[patch("/users/update-account", data = "<payload>")]
pub async fn update_account(
    state: &State<AuthState>,
    caller: AuthenticatedPrincipal,
    payload: Json<UpdateAccountRequest>,
) -> AuthRouteResult<Principal> {
    let payload = payload.into_inner();
    let principal = state
        .accounts
        .update_account(
            caller.id(),
            AccountUpdate {
                display_name: payload.full_name,
                email: payload.email,
            },
        )
        .await
        .map_err(respond_error)?;

    Ok(Json(principal))
}

/// Routes without the OpenAPI document, for tests and embedding.
pub fn routes() -> Vec<Route> {
    rocket::routes![
        register,
        login,
        refresh_token,
        logout,
        change_password,
        current_user,
        update_account
    ]
}

pub fn catchers() -> Vec<Catcher> {
    catchers![
        unauthorized,
        forbidden,
        internal_error,
        service_unavailable,
        default_catcher
    ]
}

#[catch(401)]
fn unauthorized(request: &Request<'_>) -> status::Custom<Json<AuthErrorResponse>> {
    render_failure(Status::Unauthorized, request)
}

#[catch(403)]
fn forbidden(request: &Request<'_>) -> status::Custom<Json<AuthErrorResponse>> {
    render_failure(Status::Forbidden, request)
}

#[catch(500)]
fn internal_error(request: &Request<'_>) -> status::Custom<Json<AuthErrorResponse>> {
    render_failure(Status::InternalServerError, request)
}

#[catch(503)]
fn service_unavailable(request: &Request<'_>) -> status::Custom<Json<AuthErrorResponse>> {
    render_failure(Status::ServiceUnavailable, request)
}

#[catch(default)]
fn default_catcher(status: Status, request: &Request<'_>) -> status::Custom<Json<AuthErrorResponse>> {
    render_failure(status, request)
}

fn render_failure(status: Status, request: &Request<'_>) -> status::Custom<Json<AuthErrorResponse>> {
    let failure = request.local_cache(GuardFailure::default);
    let (code, message) = match &failure.0 {
        Some((recorded, code, message)) if *recorded == status.code => {
            (code.to_string(), message.clone())
        }
        _ => (
            default_code(status).to_string(),
            status.reason_lossy().to_lowercase(),
        ),
    };

    status::Custom(
        status,
        Json(AuthErrorResponse {
            status: status.code,
            code,
            message,
            fields: Vec::new(),
        }),
    )
}

fn default_code(status: Status) -> &'static str {
    match status.code {
        400 | 422 => "validation_failed",
        401 => "unauthorized",
        403 => "forbidden",
        404 => "not_found",
        503 => "backend_unavailable",
        _ => "internal",
    }
}

fn respond_error(err: AuthError) -> status::Custom<Json<AuthErrorResponse>> {
    let status = err.status();
    if status.code >= 500 {
        log::error!("auth request failed: {}", err);
    }
    status::Custom(
        status,
        Json(AuthErrorResponse {
            status: status.code,
            code: err.code().to_string(),
            message: err.public_message(),
            fields: err.field_errors().to_vec(),
        }),
    )
}

fn set_session_cookies(cookies: &CookieJar<'_>, config: &AuthConfig, session: &IssuedSession) {
    cookies.add(session_cookie(
        config,
        config.access_cookie_name.clone(),
        session.access.token.clone(),
        session.access.expires_at,
    ));
    cookies.add(session_cookie(
        config,
        config.refresh_cookie_name.clone(),
        session.refresh.token.clone(),
        session.refresh.expires_at,
    ));
}

fn session_cookie(
    config: &AuthConfig,
    name: String,
    value: String,
    expires_at: DateTime<Utc>,
) -> Cookie<'static> {
    let max_age_secs = (expires_at - Utc::now()).num_seconds().max(0);
    let mut cookie = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(TimeDuration::seconds(max_age_secs))
        .build();

    if let Some(domain) = &config.cookie_domain {
        cookie.set_domain(domain.clone());
    }

    cookie
}

fn clear_session_cookies(cookies: &CookieJar<'_>, config: &AuthConfig) {
    for name in [&config.access_cookie_name, &config.refresh_cookie_name] {
        let mut cookie = Cookie::build((name.clone(), String::new()))
            .path("/")
            .removal()
            .build();

        if let Some(domain) = &config.cookie_domain {
            cookie.set_domain(domain.clone());
        }
        cookies.add(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::SignedToken;
    use crate::test_support::test_auth_config;

    fn session() -> IssuedSession {
        let now = Utc::now();
        IssuedSession {
            access: SignedToken {
                token: "access-value".into(),
                expires_at: now + chrono::Duration::minutes(15),
            },
            refresh: SignedToken {
                token: "refresh-value".into(),
                expires_at: now + chrono::Duration::days(7),
            },
        }
    }

    #[test]
    fn session_cookies_are_http_only_and_lax() {
        let mut config = test_auth_config();
        config.cookie_secure = true;
        config.cookie_domain = Some("vidtube.test".into());
        let session = session();

        let cookie = session_cookie(
            &config,
            config.access_cookie_name.clone(),
            session.access.token.clone(),
            session.access.expires_at,
        );
        assert_eq!(cookie.name(), "accessToken");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("vidtube.test"));
        let max_age = cookie.max_age().expect("max age").whole_seconds();
        assert!(max_age > 0 && max_age <= 15 * 60);
    }

    #[test]
    fn error_bodies_hide_internal_detail() {
        let body = respond_error(AuthError::BackendUnavailable("pool timed out".into()));
        assert_eq!(body.0, Status::ServiceUnavailable);
        assert_eq!(body.1.code, "backend_unavailable");
        assert!(!body.1.message.contains("pool timed out"));

        let body = respond_error(AuthError::Validation(vec![crate::auth::FieldError::new(
            "email", "bad",
        )]));
        assert_eq!(body.0, Status::BadRequest);
        assert_eq!(body.1.fields.len(), 1);
    }
}
