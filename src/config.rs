use std::env;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => bail!("APP_ENV must be development, test or production (got {other})"),
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// App ID and API token for one kintone app.
#[derive(Clone, Debug)]
pub struct KintoneApp {
    pub id: u64,
    pub api_token: String,
}

#[derive(Clone, Debug)]
pub struct KintoneConfig {
    pub base_url: Url,
    pub jobs: KintoneApp,
    pub talents: KintoneApp,
    pub applications: KintoneApp,
    pub inquiries: KintoneApp,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub session_expiry_minutes: i64,
    pub session_cookie_secure: bool,
    pub session_cookie_domain: Option<String>,
    pub cors_allowed_origin: Option<String>,
    pub admin_username: String,
    pub admin_password: String,
    pub cache_ttl_seconds: u64,
    pub password_reset_url: String,
    pub password_reset_expiry_minutes: i64,
    pub kintone: KintoneConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let environment = Environment::parse(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        )?;
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "talent-match".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "talent-match-web".to_string());
        let session_expiry_minutes = env::var("SESSION_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "1440".to_string())
            .parse()
            .context("SESSION_EXPIRY_MINUTES must be an integer")?;
        let session_cookie_secure = env::var("SESSION_COOKIE_SECURE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or_else(|_| environment.is_production());
        let session_cookie_domain = env::var("SESSION_COOKIE_DOMAIN").ok();
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let admin_username = env::var("ADMIN_USERNAME").context("ADMIN_USERNAME must be set")?;
        let admin_password = env::var("ADMIN_PASSWORD").context("ADMIN_PASSWORD must be set")?;
        let cache_ttl_seconds = env::var("CACHE_TTL_SECONDS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .context("CACHE_TTL_SECONDS must be an integer")?;
        let password_reset_url = env::var("PASSWORD_RESET_URL")
            .unwrap_or_else(|_| "http://localhost:3000/password-reset".to_string());
        let password_reset_expiry_minutes = env::var("PASSWORD_RESET_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("PASSWORD_RESET_EXPIRY_MINUTES must be an integer")?;

        let base_url = env::var("KINTONE_BASE_URL").context("KINTONE_BASE_URL must be set")?;
        let kintone = KintoneConfig {
            base_url: Url::parse(&base_url).context("KINTONE_BASE_URL must be a valid URL")?,
            jobs: kintone_app_from_env("JOB")?,
            talents: kintone_app_from_env("TALENT")?,
            applications: kintone_app_from_env("APPLICATION")?,
            inquiries: kintone_app_from_env("INQUIRY")?,
        };

        Ok(Self {
            environment,
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            session_expiry_minutes,
            session_cookie_secure,
            session_cookie_domain,
            cors_allowed_origin,
            admin_username,
            admin_password,
            cache_ttl_seconds,
            password_reset_url,
            password_reset_expiry_minutes,
            kintone,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn kintone_app_from_env(prefix: &str) -> Result<KintoneApp> {
    let id_var = format!("KINTONE_{prefix}_APP_ID");
    let token_var = format!("KINTONE_{prefix}_API_TOKEN");
    let id = env::var(&id_var)
        .with_context(|| format!("{id_var} must be set"))?
        .parse()
        .with_context(|| format!("{id_var} must be an integer"))?;
    let api_token = env::var(&token_var).with_context(|| format!("{token_var} must be set"))?;
    Ok(KintoneApp { id, api_token })
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
