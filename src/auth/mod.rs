pub mod cookie;
pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::Cookie;
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};
use cookie::SESSION_COOKIE_NAME;
use jwt::{Claims, Role};

/// A signed-in talent. Rejects admin sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

/// A signed-in console operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    pub username: String,
    pub role: Role,
}

async fn session_claims(parts: &mut Parts, state: &AppState) -> Result<Claims, AppError> {
    let TypedHeader(cookies) = TypedHeader::<Cookie>::from_request_parts(parts, state)
        .await
        .map_err(|_| AppError::unauthorized())?;

    let token = cookies
        .get(SESSION_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    state
        .jwt
        .verify_token(token)
        .map_err(|_| AppError::unauthorized())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = session_claims(parts, state).await?;
        if claims.role != Role::Talent {
            return Err(AppError::unauthorized());
        }

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = session_claims(parts, state).await?;
        if claims.role != Role::Admin {
            return Err(AppError::unauthorized());
        }

        Ok(AdminUser {
            username: claims.email,
            role: claims.role,
        })
    }
}

/// Constant-time comparison for the configured console credentials.
pub fn credentials_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
