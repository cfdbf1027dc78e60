//! Route table and handlers.
//!
//! Every route sits behind the pipeline gate; per-route identity
//! requirements are expressed by the extractor a handler takes.

pub mod health;
pub mod movies;
pub mod tokens;
pub mod users;

use axum::{
    http::Method,
    routing::{get, post, put},
    Router,
};

use crate::http::response::ApiError;
use crate::http::server::AppState;

/// `/v1` routes with JSON 404 and 405 fallbacks.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/movies", get(movies::list).post(movies::create))
        .route(
            "/v1/movies/{id}",
            get(movies::show).put(movies::update).delete(movies::delete),
        )
        .route("/v1/users", post(users::register))
        .route("/v1/users/activated", put(users::activate))
        .route("/v1/tokens/authentication", post(tokens::login))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}
