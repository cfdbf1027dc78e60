//! Request decoding and identification.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4)
//! - Decode JSON bodies into typed inputs with client-readable errors
//! - Parse path identifiers
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Body size is capped by the router's body limit before decoding
//! - Unknown fields are rejected by the input types themselves

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{HeaderValue, StatusCode},
};
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::http::response::ApiError;

/// Assigns a random UUID to every request lacking one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// JSON body extractor producing [`ApiError::BadRequest`] on bad input.
#[derive(Debug)]
pub struct ReadJson<T>(pub T);

impl<T, S> FromRequest<S> for ReadJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::BadRequest("body is too large".to_string())
            } else {
                ApiError::BadRequest(rejection.body_text())
            }
        })?;
        decode(&bytes).map(ReadJson)
    }
}

/// Decode a JSON body, describing failures in client terms.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("body must not be empty".to_string()));
    }

    serde_json::from_slice(bytes).map_err(|e| {
        let message = e.to_string();
        let text = match e.classify() {
            Category::Eof => "body contains badly-formed JSON".to_string(),
            Category::Syntax if message.starts_with("trailing characters") => {
                "body must only contain a single JSON value".to_string()
            }
            Category::Syntax => format!(
                "body contains badly-formed JSON (at line {}, column {})",
                e.line(),
                e.column()
            ),
            Category::Data if message.starts_with("unknown field") => {
                let field = message.split('`').nth(1).unwrap_or_default();
                format!("body contains unknown key \"{}\"", field)
            }
            Category::Data if message.starts_with("invalid type") => format!(
                "body contains incorrect JSON type (at line {}, column {})",
                e.line(),
                e.column()
            ),
            Category::Data => format!("body contains invalid data: {}", strip_position(&message)),
            Category::Io => return ApiError::Internal(message),
        };
        ApiError::BadRequest(text)
    })
}

fn strip_position(message: &str) -> &str {
    message.split(" at line ").next().unwrap_or(message)
}

/// Parse a positive record id from a path segment. Anything else is a 404.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    #[allow(dead_code)]
    struct Input {
        title: String,
        year: i32,
    }

    fn message(body: &str) -> String {
        match decode::<Input>(body.as_bytes()).unwrap_err() {
            ApiError::BadRequest(message) => message,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_error_messages() {
        assert_eq!(message(""), "body must not be empty");
        assert_eq!(message("{\"title\": "), "body contains badly-formed JSON");
        assert!(message("{\"title\" \"x\"}").starts_with("body contains badly-formed JSON (at line 1"));
        assert_eq!(
            message("{\"title\":\"x\",\"year\":1,\"rating\":5}"),
            "body contains unknown key \"rating\""
        );
        assert!(message("{\"title\":\"x\",\"year\":\"1999\"}").starts_with("body contains incorrect JSON type"));
        assert_eq!(
            message("{\"title\":\"x\",\"year\":1}{}"),
            "body must only contain a single JSON value"
        );
    }

    #[test]
    fn decode_accepts_valid_input() {
        let input: Input = decode(b"{\"title\":\"Casablanca\",\"year\":1942}").unwrap();
        assert_eq!(input.year, 1942);
    }

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id("0"), Err(ApiError::NotFound)));
        assert!(matches!(parse_id("-1"), Err(ApiError::NotFound)));
        assert!(matches!(parse_id("abc"), Err(ApiError::NotFound)));
    }
}
