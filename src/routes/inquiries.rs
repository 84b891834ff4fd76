use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    Json,
};

use crate::{
    auth::{cookie::build_clear_session_cookie, AuthenticatedUser},
    error::{AppError, AppResult},
    services::{Inquiry, NewInquiry, Talent},
    state::AppState,
};

async fn require_talent(state: &AppState, user: &AuthenticatedUser) -> AppResult<Talent> {
    state
        .services
        .talents
        .fetch_by_auth_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::bad_request("プロフィールが登録されていません"))
}

pub async fn create_inquiry(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<NewInquiry>,
) -> AppResult<(StatusCode, Json<Inquiry>)> {
    let talent = require_talent(&state, &user).await?;
    let inquiry = state.services.inquiries.create(&talent, payload).await?;
    Ok((StatusCode::CREATED, Json(inquiry)))
}

/// Completing a withdrawal also ends the session.
pub async fn complete_withdrawal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(inquiry_id): Path<u64>,
) -> AppResult<(HeaderMap, Json<Inquiry>)> {
    let talent = require_talent(&state, &user).await?;
    let inquiry = state
        .services
        .inquiries
        .complete_withdrawal(&talent, inquiry_id, &state.services.talents)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_session_cookie(&state.config)?);
    Ok((headers, Json(inquiry)))
}
