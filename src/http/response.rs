//! Response rendering and error mapping.
//!
//! # Responsibilities
//! - Render `{"<name>": value}` JSON envelopes
//! - Map every failure to one [`ApiError`] with a fixed status category
//! - Keep internal error detail in the logs, out of response bodies
//!
//! # Design Decisions
//! - Bodies are indented and newline terminated
//! - Server errors always carry the same generic message

use std::collections::BTreeMap;

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::token::CredentialError;
use crate::store::StoreError;

const SERVER_ERROR_MESSAGE: &str = "the server encountered a problem and could not process your request";

/// Boundary error returned by handlers and middleware.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    MethodNotAllowed(Method),
    BadRequest(String),
    FailedValidation(BTreeMap<String, String>),
    EditConflict,
    RateLimited,
    RequestTimeout,
    InvalidCredentials,
    InvalidAuthenticationToken,
    AuthenticationRequired,
    InactiveAccount,
    /// Detail is logged, never sent.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::InvalidCredentials
            | ApiError::InvalidAuthenticationToken
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::InactiveAccount => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> Value {
        let text = match self {
            ApiError::NotFound => "the requested resource could not be found".to_string(),
            ApiError::MethodNotAllowed(method) => {
                format!("the {} method is not supported for this resource", method)
            }
            ApiError::BadRequest(message) => message.clone(),
            ApiError::FailedValidation(errors) => {
                return Value::Object(
                    errors
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                )
            }
            ApiError::EditConflict => {
                "unable to update the record due to an edit conflict, please try again".to_string()
            }
            ApiError::RateLimited => "rate limit exceeded".to_string(),
            ApiError::RequestTimeout => "the request took too long to process".to_string(),
            ApiError::InvalidCredentials => "invalid authentication credentials".to_string(),
            ApiError::InvalidAuthenticationToken => "invalid or missing authentication token".to_string(),
            ApiError::AuthenticationRequired => {
                "you must be authenticated to access this resource".to_string()
            }
            ApiError::InactiveAccount => {
                "your user account must be activated to access this resource".to_string()
            }
            ApiError::Internal(_) => SERVER_ERROR_MESSAGE.to_string(),
        };
        Value::String(text)
    }

    /// Single-field validation failure.
    pub fn invalid(field: &str, message: &str) -> Self {
        ApiError::FailedValidation(BTreeMap::from([(field.to_string(), message.to_string())]))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Request failed");
        }
        let mut body = Map::new();
        body.insert("error".to_string(), self.message());
        let mut response = render(self.status(), &body);
        if matches!(self, ApiError::InvalidAuthenticationToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::EditConflict => ApiError::EditConflict,
            StoreError::DuplicateEmail => {
                ApiError::invalid("email", "a user with this email address already exists")
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Malformed | CredentialError::NotFound => ApiError::InvalidAuthenticationToken,
            CredentialError::Store(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Successful JSON response built from named top-level values.
#[derive(Debug)]
pub struct Envelope {
    status: StatusCode,
    body: Map<String, Value>,
    headers: HeaderMap,
}

impl Envelope {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            body: Map::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Add `{"<key>": value}` to the body.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Result<Self, ApiError> {
        let value = serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))?;
        self.body.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let mut response = render(self.status, &self.body);
        response.headers_mut().extend(self.headers);
        response
    }
}

fn render(status: StatusCode, body: &Map<String, Value>) -> Response {
    match serde_json::to_vec_pretty(body) {
        Ok(mut bytes) => {
            bytes.push(b'\n');
            (
                status,
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode response body");
            (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE).into_response()
        }
    }
}
