use axum::http::HeaderValue;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

pub const SESSION_COOKIE_NAME: &str = "session";

pub fn build_session_cookie(
    config: &AppConfig,
    token: &str,
    max_age_seconds: i64,
) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{}={}", SESSION_COOKIE_NAME, token)];
    parts.push(format!("Max-Age={}", max_age_seconds));
    finish(config, parts)
}

pub fn build_clear_session_cookie(config: &AppConfig) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{}=", SESSION_COOKIE_NAME)];
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    finish(config, parts)
}

fn finish(config: &AppConfig, mut parts: Vec<String>) -> AppResult<HeaderValue> {
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Lax".into());
    if config.session_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &config.session_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}
