use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        cookie::{build_clear_session_cookie, build_session_cookie},
        jwt::Role,
        password::{self, MIN_PASSWORD_LENGTH},
        AuthenticatedUser,
    },
    error::{AppError, AppResult},
    mailer::password_reset_mail,
    models::{NewPasswordResetToken, NewUser, User},
    services::TalentStatus,
    state::AppState,
};

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

const SIGN_UP_ACCEPTED: &str = "登録を受け付けました";
const RESET_ACCEPTED: &str =
    "登録済みのメールアドレスであれば、パスワード再設定のご案内を送信しました";

pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let email = normalize_email(&payload.email)?;
    validate_password(&payload.password)?;

    let password_hash = password::hash_password(&payload.password)?;
    let created = state
        .credentials
        .create_user(NewUser {
            id: Uuid::new_v4(),
            email,
            password_hash,
            role: Role::Talent.as_str().to_string(),
        })
        .await?;

    // Same reply for new and existing addresses; no session is issued.
    match created {
        Some(user) => info!(user_id = %user.id, "account created"),
        None => info!("sign-up for an existing account ignored"),
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: SIGN_UP_ACCEPTED,
        }),
    ))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> AppResult<(HeaderMap, Json<SessionResponse>)> {
    let email = payload.email.trim().to_lowercase();
    let invalid = || {
        AppError::new(
            StatusCode::UNAUTHORIZED,
            "メールアドレスまたはパスワードが正しくありません",
        )
    };

    let user = state
        .credentials
        .find_by_email(&email)
        .await?
        .ok_or_else(invalid)?;
    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| invalid())?;
    if !valid || user.role != Role::Talent.as_str() {
        return Err(invalid());
    }

    if let Some(talent) = state.services.talents.get_by_auth_user(user.id).await? {
        if talent.status == TalentStatus::Withdrawn {
            warn!(user_id = %user.id, "sign-in refused for withdrawn talent");
            return Err(AppError::new(StatusCode::UNAUTHORIZED, "退会済みのアカウントです"));
        }
    }

    let (cookie, expires_in) = issue_session(&state, user.id, &user.email, Role::Talent)?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((
        headers,
        Json(SessionResponse {
            user_id: user.id,
            email: user.email,
            role: Role::Talent,
            expires_in,
        }),
    ))
}

pub async fn sign_out(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_session_cookie(&state.config)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn session(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let email = payload.email.trim().to_lowercase();

    // Known and unknown addresses get the same reply; delivery failures are only logged.
    if let Some(user) = state.credentials.find_by_email(&email).await? {
        match send_reset_mail(&state, &user).await {
            Ok(()) => info!(user_id = %user.id, "password reset issued"),
            Err(err) => error!(user_id = %user.id, error = %err, "password reset not delivered"),
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: RESET_ACCEPTED,
        }),
    ))
}

async fn send_reset_mail(state: &AppState, user: &User) -> anyhow::Result<()> {
    let token = generate_reset_token();
    let expiry_minutes = state.config.password_reset_expiry_minutes;
    let expires_at = Utc::now() + ChronoDuration::minutes(expiry_minutes);

    state
        .credentials
        .store_reset_token(NewPasswordResetToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash_reset_token(&token),
            expires_at: expires_at.naive_utc(),
        })
        .await?;
    state
        .mailer
        .send(password_reset_mail(
            &user.email,
            &state.config.password_reset_url,
            &token,
            expiry_minutes,
        ))
        .await
}

#[derive(Deserialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub password: String,
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirm>,
) -> AppResult<StatusCode> {
    validate_password(&payload.password)?;

    let user_id = state
        .credentials
        .consume_reset_token(&hash_reset_token(payload.token.trim()), Utc::now().naive_utc())
        .await?
        .ok_or_else(|| AppError::bad_request("再設定リンクが無効か、有効期限が切れています"))?;

    let password_hash = password::hash_password(&payload.password)?;
    state
        .credentials
        .update_password(user_id, &password_hash)
        .await?;
    info!(%user_id, "password reset completed");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    validate_password(&payload.new_password)?;

    let stored = state
        .credentials
        .find_by_id(user.user_id)
        .await?
        .ok_or_else(AppError::unauthorized)?;
    let valid = password::verify_password(&payload.current_password, &stored.password_hash)?;
    if !valid {
        return Err(AppError::bad_request("現在のパスワードが正しくありません"));
    }

    let password_hash = password::hash_password(&payload.new_password)?;
    state
        .credentials
        .update_password(user.user_id, &password_hash)
        .await?;
    info!(user_id = %user.user_id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// Signs a session token and wraps it in a cookie. Also returns the lifetime in seconds.
pub(crate) fn issue_session(
    state: &AppState,
    subject: Uuid,
    email: &str,
    role: Role,
) -> AppResult<(axum::http::HeaderValue, i64)> {
    let token = state.jwt.generate_token(subject, email, role)?;
    let max_age = state.jwt.expiry().num_seconds();
    let cookie = build_session_cookie(&state.config, &token, max_age)?;
    Ok((cookie, max_age))
}

fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::bad_request("メールアドレスの形式が正しくありません"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "パスワードは{MIN_PASSWORD_LENGTH}文字以上で入力してください"
        )));
    }
    Ok(())
}

fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
