use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod images;
pub mod metrics;

/// API routes. Middleware and the metrics endpoint are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/images", get(images::list_images))
        .route("/api/images/generate", post(images::generate_image))
        .route(
            "/api/images/{id}",
            get(images::get_image).delete(images::delete_image),
        )
        .with_state(state)
}
