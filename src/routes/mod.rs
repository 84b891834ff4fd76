use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{AdminUser, AuthenticatedUser},
    services::files::MAX_FILE_BYTES,
    state::AppState,
};

pub mod admin;
pub mod applications;
pub mod auth;
pub mod health;
pub mod inquiries;
pub mod jobs;
pub mod maintenance;
pub mod notifications;
pub mod prefetch;
pub mod talents;

/// Headroom for multipart framing around a maximum-size file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(err) => {
                        tracing::warn!(origin = value, error = %err, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let public_auth_routes = Router::new()
        .route("/sign-up", post(auth::sign_up))
        .route("/sign-in", post(auth::sign_in))
        .route("/password-reset", post(auth::request_password_reset))
        .route(
            "/password-reset/confirm",
            post(auth::confirm_password_reset),
        );

    let application_routes = Router::new()
        .route("/", post(applications::create_application))
        .route("/me", get(applications::list_my_applications))
        .route("/me/job-ids", get(applications::list_my_job_ids));

    let talent_routes = Router::new()
        .route("/", post(talents::create_talent))
        .route("/me", get(talents::get_me).patch(talents::update_me))
        .route(
            "/me/files",
            post(talents::upload_file)
                .layer(DefaultBodyLimit::max(MAX_FILE_BYTES + MULTIPART_OVERHEAD_BYTES)),
        )
        .route(
            "/me/files/:file_key",
            get(talents::download_file).delete(talents::delete_file),
        );

    let inquiry_routes = Router::new()
        .route("/", post(inquiries::create_inquiry))
        .route(
            "/:id/withdrawal-complete",
            post(inquiries::complete_withdrawal),
        );

    let notification_routes = Router::new()
        .route("/interviews", get(notifications::list_interviews))
        .route(
            "/interviews/:id/ack",
            post(notifications::acknowledge_interview),
        );

    let talent_state = state.clone();
    let talent_only = Router::new()
        .route("/api/auth/sign-out", post(auth::sign_out))
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/password", post(auth::change_password))
        .nest("/api/applications", application_routes)
        .nest("/api/talents", talent_routes)
        .nest("/api/inquiries", inquiry_routes)
        .nest("/api/notifications", notification_routes)
        .route("/api/prefetch", post(prefetch::prefetch))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(talent_state));

    let admin_state = state.clone();
    let admin_only = Router::new()
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/admin/session", get(admin::session))
        .route("/api/admin/jobs", get(admin::list_jobs))
        .layer(middleware::from_extractor_with_state::<AdminUser, _>(admin_state));

    let job_routes = Router::new()
        .route("/", get(jobs::list_jobs))
        .route("/:id", get(jobs::get_job));

    let maintenance_routes = Router::new()
        .route("/cache", get(maintenance::cache_stats))
        .route("/cache/clear", post(maintenance::clear_cache));

    Router::new()
        .merge(talent_only)
        .merge(admin_only)
        .nest("/api/auth", public_auth_routes)
        .route("/api/admin/login", post(admin::login))
        .nest("/api/jobs", job_routes)
        .nest("/api/debug", maintenance_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
