use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::{
    auth::AuthenticatedUser,
    error::AppResult,
    services::Application,
    state::AppState,
};

#[derive(Serialize)]
pub struct InterviewNotice {
    pub application_id: u64,
    pub job_id: u64,
    pub job_title: String,
    pub status_label: String,
}

impl From<Application> for InterviewNotice {
    fn from(application: Application) -> Self {
        Self {
            status_label: application.status_label().to_string(),
            application_id: application.id,
            job_id: application.job_id,
            job_title: application.job_title,
        }
    }
}

pub async fn list_interviews(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<InterviewNotice>>> {
    let pending = state
        .services
        .applications
        .pending_interview_notices(user.user_id)
        .await?;
    Ok(Json(pending.into_iter().map(InterviewNotice::from).collect()))
}

pub async fn acknowledge_interview(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<u64>,
) -> AppResult<Json<Application>> {
    let application = state
        .services
        .applications
        .acknowledge_interview(user.user_id, application_id)
        .await?;
    Ok(Json(application))
}
