pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;

use axum::{
    extract::DefaultBodyLimit, middleware as axum_middleware, routing::get, Json, Router,
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{config::Config, db::Database, services::storage::StorageService};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub storage: StorageService,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let storage = StorageService::new(&config.upload_path, config.max_upload_bytes);
        Self {
            db,
            config,
            storage,
        }
    }
}

/// The full HTTP surface: `/api` JSON routes, uploaded files and static assets.
pub fn build_router(state: AppState) -> Router {
    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .nest("/jobs", routes::jobs::router())
        .nest("/applications", routes::applications::router())
        .nest("/reviews", routes::reviews::router())
        .nest("/messages", routes::messages::router())
        .nest("/comments", routes::comments::router())
        .nest("/admin", routes::admin::router())
        .merge(routes::profiles::router())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::identify,
        ));

    // Multipart bodies carry several files, each capped by the storage service
    let body_limit = state.config.max_upload_bytes.saturating_mul(4);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_path))
        .nest_service("/static", ServeDir::new(&state.config.static_path))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
