//! Route modules for the QuickDrop server

pub mod files;
pub mod health;
pub mod upload;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .merge(upload::router(&state.config().upload))
        .merge(files::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
