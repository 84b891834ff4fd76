use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{cookie::build_clear_session_cookie, credentials_match, jwt::Role, AdminUser},
    error::{AppError, AppResult},
    routes::auth::issue_session,
    services::{JobPage, JobScope, JobSearch, JobSort},
    state::AppState,
};

#[derive(Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AdminSessionResponse {
    pub username: String,
    pub role: Role,
    pub expires_in: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<AdminLoginRequest>,
) -> AppResult<(HeaderMap, Json<AdminSessionResponse>)> {
    let username_ok = credentials_match(&payload.username, &state.config.admin_username);
    let password_ok = credentials_match(&payload.password, &state.config.admin_password);
    if !(username_ok & password_ok) {
        warn!("admin login rejected");
        return Err(AppError::unauthorized());
    }

    let (cookie, expires_in) =
        issue_session(&state, Uuid::new_v4(), &state.config.admin_username, Role::Admin)?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    info!(username = %state.config.admin_username, "admin signed in");

    Ok((
        headers,
        Json(AdminSessionResponse {
            username: state.config.admin_username.clone(),
            role: Role::Admin,
            expires_in,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_session_cookie(&state.config)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn session(admin: AdminUser) -> Json<AdminUser> {
    Json(admin)
}

#[derive(Deserialize)]
pub struct AdminJobQuery {
    pub query: Option<String>,
    pub loc: Option<String>,
    #[serde(default)]
    pub sort: JobSort,
    pub page: Option<u32>,
    pub size: Option<u32>,
    #[serde(default)]
    pub eligible_only: bool,
}

/// Every job, published or not, optionally narrowed to matching-eligible ones.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<AdminJobQuery>,
) -> AppResult<Json<JobPage>> {
    let scope = JobScope::Admin {
        eligible_only: params.eligible_only,
    };
    let search = JobSearch {
        query: params.query,
        loc: params.loc,
        sort: params.sort,
        page: params.page,
        size: params.size,
    };
    let page = state.services.jobs.search(scope, &search).await?;
    Ok(Json(page))
}
