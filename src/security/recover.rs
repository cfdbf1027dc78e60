//! Panic recovery middleware.

use std::panic::AssertUnwindSafe;

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;

use crate::http::response::ApiError;
use crate::lifecycle::background::panic_message;
use crate::observability::metrics;

/// Turn a panic anywhere downstream into a 500 and close the connection.
///
/// Other connections are unaffected; the panic unwinds only this request's
/// future.
pub async fn recover_panic(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(
                request_method = %method,
                request_url = %uri,
                panic = %panic_message(&*panic),
                "Recovered from handler panic"
            );
            metrics::record_panic_recovered();
            let mut response = ApiError::Internal("handler panicked".to_string()).into_response();
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route(
                "/boom",
                get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            )
            .layer(axum::middleware::from_fn(recover_panic))
    }

    #[tokio::test]
    async fn panic_becomes_server_error() {
        let response = app()
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[tokio::test]
    async fn normal_responses_pass_through() {
        let response = app()
            .oneshot(Request::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONNECTION).is_none());
    }
}
