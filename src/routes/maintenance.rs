use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    cache::{CacheNamespace, NamespaceStats},
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Deserialize)]
pub struct ClearCacheQuery {
    pub namespace: Option<String>,
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub namespace: Option<CacheNamespace>,
    pub removed: usize,
}

#[derive(Serialize)]
pub struct CacheStatsResponse {
    pub namespaces: Vec<NamespaceStats>,
}

fn ensure_enabled(state: &AppState) -> AppResult<()> {
    if state.config.environment.is_production() {
        return Err(AppError::not_found());
    }
    Ok(())
}

pub async fn clear_cache(
    State(state): State<AppState>,
    Query(params): Query<ClearCacheQuery>,
) -> AppResult<Json<ClearCacheResponse>> {
    ensure_enabled(&state)?;

    let namespace = match params.namespace.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(CacheNamespace::parse(raw).ok_or_else(|| {
            AppError::bad_request(format!("unknown cache namespace: {raw}"))
        })?),
    };
    let removed = match namespace {
        Some(namespace) => state.cache.clear_namespace(namespace),
        None => state.cache.clear(),
    };

    info!(component = "maintenance", ?namespace, removed, "cache cleared");
    Ok(Json(ClearCacheResponse { namespace, removed }))
}

pub async fn cache_stats(State(state): State<AppState>) -> AppResult<Json<CacheStatsResponse>> {
    ensure_enabled(&state)?;
    Ok(Json(CacheStatsResponse {
        namespaces: state.cache.stats(),
    }))
}
