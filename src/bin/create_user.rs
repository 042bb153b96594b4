use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use vidtube_api::auth::service::Registration;
use vidtube_api::auth::{AuthConfig, AuthError, AuthState, PgCredentialStore};

#[derive(Parser, Debug)]
#[command(name = "create_user", about = "Provision a VidTube account directly in Postgres")]
struct Args {
    /// Unique handle (case insensitive).
    #[arg(long)]
    user_name: String,

    /// Email address for the account (case insensitive).
    #[arg(long)]
    email: String,

    /// Display name shown on the channel.
    #[arg(long)]
    full_name: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    vidtube_api::db::run_migrations(&pool).await?;

    let config = AuthConfig::from_env()?;
    let state = AuthState::from_config(config, Arc::new(PgCredentialStore::new(pool)))?;

    let result = state
        .accounts
        .register(Registration {
            handle: args.user_name,
            email: args.email,
            display_name: args.full_name,
            password: args.password,
        })
        .await;

    match result {
        Ok(principal) => {
            println!(
                "Created user '{}' <{}> with id {}",
                principal.handle, principal.email, principal.id
            );
            Ok(())
        }
        Err(AuthError::Validation(fields)) => {
            for field in fields {
                writeln!(io::stderr(), "error: {}: {}", field.field, field.message)?;
            }
            std::process::exit(1);
        }
        Err(AuthError::Conflict(message)) => {
            writeln!(io::stderr(), "error: {message}")?;
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}
