//! Authentication credential issue (login).

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use crate::auth::password::verify_password;
use crate::auth::token::Scope;
use crate::handlers::users::{blocking, validate_email, validate_password};
use crate::http::request::ReadJson;
use crate::http::response::{ApiError, Envelope};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::store::with_deadline;
use crate::validation::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Login {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    ReadJson(input): ReadJson<Login>,
) -> Result<Envelope, ApiError> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password(&mut v, &input.password);
    v.finish()?;

    let Some(user) = with_deadline(state.store_deadline(), state.users.user_by_email(&input.email)).await? else {
        metrics::record_auth_failure("unknown_email");
        return Err(ApiError::InvalidCredentials);
    };

    let hash = user.password_hash.clone();
    let password = input.password;
    let matches = blocking(move || verify_password(&password, &hash))
        .await?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !matches {
        metrics::record_auth_failure("wrong_password");
        return Err(ApiError::InvalidCredentials);
    }

    let credential = state
        .credentials
        .issue(user.id, state.config.tokens.authentication_ttl(), Scope::Authentication)
        .await?;
    Envelope::new(StatusCode::CREATED).with("authentication_token", &credential)
}
