//! Identity resolution middleware.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::identity::Identity;
use crate::auth::token::{CredentialError, Scope};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::store::with_deadline;

/// Attach an [`Identity`] to every request.
///
/// No `Authorization` header means anonymous. Anything other than
/// `Bearer <token>` with a live authentication credential is rejected here,
/// before the handler runs.
pub async fn authenticate_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let resolved = resolve(&state, request.headers()).await;
    let mut response = match resolved {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    };
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

async fn resolve(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Identity::Anonymous);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or_else(|| {
            metrics::record_auth_failure("malformed_header");
            ApiError::InvalidAuthenticationToken
        })?;

    let user_id = match state.credentials.verify(Scope::Authentication, token).await {
        Ok(id) => id,
        Err(CredentialError::Malformed | CredentialError::NotFound) => {
            metrics::record_auth_failure("invalid_token");
            return Err(ApiError::InvalidAuthenticationToken);
        }
        Err(e) => return Err(e.into()),
    };

    match with_deadline(state.store_deadline(), state.users.user_by_id(user_id)).await? {
        Some(user) => Ok(Identity::User(Arc::new(user))),
        None => {
            metrics::record_auth_failure("unknown_principal");
            Err(ApiError::InvalidAuthenticationToken)
        }
    }
}

/// Token part of `Bearer <token>`, split on single spaces.
fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}
