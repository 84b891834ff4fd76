use std::env;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use talent_match::{
    auth::{jwt::Role, password},
    config::AppConfig,
    credentials::{CredentialStore, PgCredentialStore},
    db,
    models::NewUser,
};

const USAGE: &str = "Usage: maintenance hash-password <password>\n       maintenance create-user <email> <password>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("hash-password") => {
            let plain = args.next().context(USAGE)?;
            println!("{}", password::hash_password(&plain)?);
        }
        Some("create-user") => {
            let email = args.next().context(USAGE)?;
            let plain = args.next().context(USAGE)?;
            create_user(&email, &plain).await?;
        }
        Some(cmd) => bail!("Unknown command: {cmd}\n{USAGE}"),
        None => bail!("{USAGE}"),
    }

    Ok(())
}

async fn create_user(email: &str, plain: &str) -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    if plain.chars().count() < password::MIN_PASSWORD_LENGTH {
        bail!(
            "password must be at least {} characters",
            password::MIN_PASSWORD_LENGTH
        );
    }

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let migration_pool = pool.clone();
    tokio::task::spawn_blocking(move || db::run_migrations(&migration_pool))
        .await
        .context("migration task panicked")??;

    let store = PgCredentialStore::new(pool);
    let created = store
        .create_user(NewUser {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password_hash: password::hash_password(plain)?,
            role: Role::Talent.as_str().to_string(),
        })
        .await?;

    match created {
        Some(user) => println!("Created user {} ({})", user.email, user.id),
        None => bail!("an account for {email} already exists"),
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
