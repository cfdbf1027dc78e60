//! Request pipeline gate.
//!
//! Fixed order, outermost first: panic recovery, admission check, identity
//! resolution. Handlers only ever run with an `Identity` attached.

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};

use crate::auth::authenticate_middleware;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::{rate_limit_middleware, recover_panic};

/// Wrap `routes` in the gate and bind the state.
pub fn gate(routes: Router<AppState>, state: AppState) -> Router {
    // layers run outside-in in reverse order of addition
    routes
        .layer(middleware::from_fn_with_state(state.clone(), authenticate_middleware))
        .layer(middleware::from_fn_with_state(state.limiter.clone(), rate_limit_middleware))
        .layer(middleware::from_fn(recover_panic))
        .with_state(state)
}

/// Count requests and their latency by method and status.
pub async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

/// Abandon a request that runs past `limit`, answering 408 in the error envelope.
pub async fn enforce_timeout(State(limit): State<Duration>, request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(request_method = %method, request_url = %uri, timeout = ?limit, "Request timed out");
            ApiError::RequestTimeout.into_response()
        }
    }
}
