use axum::{extract::State, http::StatusCode};

use crate::http::response::{ApiError, Envelope};
use crate::http::server::AppState;

pub async fn health(State(state): State<AppState>) -> Result<Envelope, ApiError> {
    Envelope::new(StatusCode::OK)
        .with("status", "available")?
        .with("environment", &state.config.server.env)?
        .with("version", crate::VERSION)
}
