use axum::{extract::State, Json};

use crate::{
    auth::AuthenticatedUser, error::AppResult, services::PrefetchBundle, state::AppState,
};

/// Loads the talent profile and applications together so later page loads hit the cache.
pub async fn prefetch(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<PrefetchBundle>> {
    let bundle = state.services.aggregator().prefetch(user.user_id).await?;
    Ok(Json(bundle))
}
