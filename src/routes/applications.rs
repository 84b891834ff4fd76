use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    services::ApplicationWithJob,
    state::AppState,
};

#[derive(Deserialize)]
pub struct CreateApplicationRequest {
    pub job_id: u64,
}

#[derive(Serialize)]
pub struct AppliedJobIdsResponse {
    pub job_ids: Vec<u64>,
}

pub async fn create_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateApplicationRequest>,
) -> AppResult<(StatusCode, Json<ApplicationWithJob>)> {
    let services = &state.services;
    let talent = services
        .talents
        .get_by_auth_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::bad_request("応募の前にプロフィールを登録してください"))?;
    let job = services
        .jobs
        .get_by_id(payload.job_id)
        .await?
        .filter(|job| job.published)
        .ok_or_else(AppError::not_found)?;

    let application = services.applications.create(&talent, &job).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApplicationWithJob {
            status_label: application.status_label().to_string(),
            application,
            job: Some(job),
        }),
    ))
}

pub async fn list_my_applications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ApplicationWithJob>>> {
    let applications = state
        .services
        .aggregator()
        .applications_with_jobs(user.user_id)
        .await?;
    Ok(Json(applications))
}

pub async fn list_my_job_ids(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<AppliedJobIdsResponse>> {
    let job_ids = state
        .services
        .applications
        .applied_job_ids(user.user_id)
        .await?;
    Ok(Json(AppliedJobIdsResponse { job_ids }))
}
