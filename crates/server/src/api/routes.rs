use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, history, jobs, middleware::metrics_middleware, settings, uploads, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Runtime settings
        .route(
            "/settings",
            get(settings::get_settings)
                .put(settings::update_settings)
                .delete(settings::reset_settings),
        )
        // Jobs
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::cancel_job))
        .route("/jobs/{id}/ws", get(ws::job_ws_handler))
        // History
        .route("/history", get(history::list_history))
        .route(
            "/history/{id}",
            get(history::get_entry).delete(history::delete_entry),
        )
        // Upload confirmation
        .route("/uploads/{id}", get(uploads::get_upload))
        .route("/uploads/{id}/confirm", post(uploads::confirm_upload))
        .route("/uploads/{id}/cancel", post(uploads::cancel_upload))
        // Global event feed
        .route("/ws", get(ws::ws_handler))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics).with_state(state))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
