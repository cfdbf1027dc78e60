//! Account registration and activation.

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use crate::auth::password::hash_password;
use crate::auth::token::{CredentialError, Scope};
use crate::http::request::ReadJson;
use crate::http::response::{ApiError, Envelope};
use crate::http::server::AppState;
use crate::mailer::WelcomeMessage;
use crate::store::{with_deadline, NewUser};
use crate::validation::{is_email, Validator};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateUser {
    #[serde(default)]
    token: String,
}

pub(crate) fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_email(email), "email", "must be a valid email address");
}

pub(crate) fn validate_password(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

fn validate_user(v: &mut Validator, input: &RegisterUser) {
    v.check(!input.name.is_empty(), "name", "must be provided");
    v.check(input.name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, &input.email);
    validate_password(v, &input.password);
}

/// Argon2 is CPU bound; keep it off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub async fn register(
    State(state): State<AppState>,
    ReadJson(input): ReadJson<RegisterUser>,
) -> Result<Envelope, ApiError> {
    let mut v = Validator::new();
    validate_user(&mut v, &input);
    v.finish()?;

    let RegisterUser { name, email, password } = input;
    let password_hash = blocking(move || hash_password(&password))
        .await?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let user = with_deadline(
        state.store_deadline(),
        state.users.insert_user(NewUser { name, email, password_hash }),
    )
    .await?;

    let credential = state
        .credentials
        .issue(user.id, state.config.tokens.activation_ttl(), Scope::Activation)
        .await?;

    let notifier = state.notifier.clone();
    let recipient = user.email.clone();
    let message = WelcomeMessage {
        user_id: user.id,
        name: user.name.clone(),
        activation_token: credential.plaintext,
    };
    let dispatched = state.background.spawn("welcome-email", async move {
        notifier.send_welcome(&recipient, message).await
    });
    if let Err(e) = dispatched {
        tracing::error!(user_id = user.id, error = %e, "Welcome message not dispatched");
    }

    tracing::info!(user_id = user.id, "User registered");
    Envelope::new(StatusCode::ACCEPTED).with("user", &user)
}

pub async fn activate(
    State(state): State<AppState>,
    ReadJson(input): ReadJson<ActivateUser>,
) -> Result<Envelope, ApiError> {
    let expected_len = state.credentials.plaintext_len();
    let mut v = Validator::new();
    v.check(!input.token.is_empty(), "token", "must be provided");
    v.check(
        input.token.len() == expected_len,
        "token",
        &format!("must be {} bytes long", expected_len),
    );
    v.finish()?;

    let rejected = || ApiError::invalid("token", "invalid or expired activation token");

    let user_id = match state.credentials.verify(Scope::Activation, &input.token).await {
        Ok(id) => id,
        Err(CredentialError::Malformed | CredentialError::NotFound) => return Err(rejected()),
        Err(e) => return Err(e.into()),
    };
    let mut user = with_deadline(state.store_deadline(), state.users.user_by_id(user_id))
        .await?
        .ok_or_else(rejected)?;

    user.activated = true;
    let user = with_deadline(state.store_deadline(), state.users.update_user(user)).await?;

    let revoked = state.credentials.revoke_all(Scope::Activation, user.id).await?;
    tracing::info!(user_id = user.id, revoked, "User activated");

    Envelope::new(StatusCode::OK).with("user", &user)
}
