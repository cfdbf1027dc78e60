//! Per-request identity and the capability gates built on it.
//!
//! The authenticate middleware inserts exactly one [`Identity`] into every
//! request it forwards. Handlers that need a principal take
//! [`AuthenticatedUser`] or [`ActivatedUser`] as an extractor argument.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::store::User;

/// Who is making the request.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    User(Arc<User>),
}

impl Identity {
    pub fn user(&self) -> Option<&Arc<User>> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}

fn identity(parts: &Parts) -> Result<&Identity, ApiError> {
    parts
        .extensions
        .get::<Identity>()
        .ok_or_else(|| ApiError::Internal("route is not behind identity resolution".into()))
}

/// Any verified principal.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Arc<User>);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match identity(parts)?.user() {
            Some(user) => Ok(Self(user.clone())),
            None => {
                metrics::record_auth_failure("anonymous");
                Err(ApiError::AuthenticationRequired)
            }
        }
    }
}

/// A verified principal whose account has been activated.
#[derive(Debug, Clone)]
pub struct ActivatedUser(pub Arc<User>);

impl<S: Send + Sync> FromRequestParts<S> for ActivatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.activated {
            metrics::record_auth_failure("inactive");
            return Err(ApiError::InactiveAccount);
        }
        Ok(Self(user))
    }
}
