//! HTTP surface: axum routes over [`ContentService`].

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::service::ContentService;

pub mod error;
pub mod handlers;

pub use error::{AppError, AppResult};
pub use handlers::DataResponse;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ContentService>,
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/generations", post(handlers::create_generation))
        .route("/generations/retry", post(handlers::retry_by_title))
        .route("/generations/retry-result", post(handlers::retry_with_result))
        .route("/generations/{title}/status", get(handlers::generation_status))
        .route(
            "/generations/{title}",
            get(handlers::get_generation).delete(handlers::delete_generation),
        )
}

/// Full application router with tracing and CORS layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
