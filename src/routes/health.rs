//! Service health endpoint used for readiness checks and tests.

use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::auth::AuthState;
use crate::auth::jwt::JwtMetadata;

/// Basic response payload describing API health.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    /// `ok` when the credential store answers, `unavailable` otherwise.
    pub status: String,
    pub storage: String,
    /// Token lifetimes and issuer settings clients need to schedule refreshes.
    pub tokens: JwtMetadata,
}

/// Reports 503 while the credential store is unreachable.
#[openapi(tag = "Health")]
#[get("/health")]
pub async fn health_check(
    state: &State<AuthState>,
) -> Result<Json<HealthResponse>, status::Custom<Json<HealthResponse>>> {
    match state.store.ping().await {
        Ok(()) => Ok(Json(HealthResponse {
            status: "ok".to_string(),
            storage: "ok".to_string(),
            tokens: state.jwt_service.metadata(),
        })),
        Err(err) => {
            log::warn!("health check failed: {}", err);
            Err(status::Custom(
                Status::ServiceUnavailable,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                    storage: err.public_message(),
                    tokens: state.jwt_service.metadata(),
                }),
            ))
        }
    }
}
