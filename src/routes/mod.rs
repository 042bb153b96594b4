//! HTTP route handlers outside the account surface.
//!
//! Handlers are annotated with `#[openapi]` so `rocket_okapi` can derive
//! the OpenAPI document; account routes live in `crate::auth::routes`.

pub mod health;
