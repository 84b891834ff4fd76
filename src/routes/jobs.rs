use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    error::{AppError, AppResult},
    services::{Job, JobPage, JobScope, JobSearch},
    state::AppState,
};

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(search): Query<JobSearch>,
) -> AppResult<Json<JobPage>> {
    let page = state.services.jobs.search(JobScope::Public, &search).await?;
    Ok(Json(page))
}

/// Unpublished jobs are indistinguishable from missing ones here.
pub async fn get_job(State(state): State<AppState>, Path(id): Path<u64>) -> AppResult<Json<Job>> {
    let job = state
        .services
        .jobs
        .get_by_id(id)
        .await?
        .filter(|job| job.published)
        .ok_or_else(AppError::not_found)?;
    Ok(Json(job))
}
