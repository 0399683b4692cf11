use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod tracker;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// Multipart framing on top of the largest accepted file
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(extractors::USER_ID_HEADER),
            HeaderName::from_static(middlewares::trace::TRACE_ID_HEADER),
        ])
        .allow_origin(tower_http::cors::Any);

    let upload_limit = app_state.config.ingestion.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/exercises", exercise_routes().layer(cors))
        .nest(
            "/api/v1/imports",
            import_routes().layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn exercise_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/{id}/progress",
            get(handlers::progress::get_progress).put(handlers::progress::put_progress),
        )
        .route("/{id}/sessions", post(handlers::progress::complete_session))
        .route(
            "/{id}/requirement",
            get(handlers::progress::get_requirement),
        )
}

fn import_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{profile}", post(handlers::imports::upload_report))
        .route(
            "/{profile}/reimport",
            post(handlers::imports::reimport_report),
        )
}
