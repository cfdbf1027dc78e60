//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, timeouts > 0, addresses parse)
//! - Enforce the minimum credential entropy
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::auth::token::MIN_SECRET_BYTES;
use crate::config::schema::AppConfig;

const ENVIRONMENTS: [&str; 3] = ["development", "staging", "production"];

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if !ENVIRONMENTS.contains(&config.server.env.as_str()) {
        errors.push(ValidationError::new(
            "server.env",
            format!("must be one of {}", ENVIRONMENTS.join("|")),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than zero"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be greater than zero"));
    }

    let limiter = &config.rate_limit;
    if !(limiter.requests_per_second.is_finite() && limiter.requests_per_second > 0.0) {
        errors.push(ValidationError::new("rate_limit.requests_per_second", "must be a positive number"));
    }
    if limiter.burst_size == 0 {
        errors.push(ValidationError::new("rate_limit.burst_size", "must be at least 1"));
    }
    if limiter.idle_eviction_secs == 0 {
        errors.push(ValidationError::new("rate_limit.idle_eviction_secs", "must be greater than zero"));
    }
    if limiter.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be greater than zero"));
    }

    if config.tokens.secret_bytes < MIN_SECRET_BYTES {
        errors.push(ValidationError::new(
            "tokens.secret_bytes",
            format!("must be at least {}", MIN_SECRET_BYTES),
        ));
    }
    if config.tokens.activation_ttl_secs == 0 {
        errors.push(ValidationError::new("tokens.activation_ttl_secs", "must be greater than zero"));
    }
    if config.tokens.authentication_ttl_secs == 0 {
        errors.push(ValidationError::new("tokens.authentication_ttl_secs", "must be greater than zero"));
    }

    if config.lifecycle.grace_period_secs == 0 {
        errors.push(ValidationError::new("lifecycle.grace_period_secs", "must be greater than zero"));
    }
    if config.store.timeout_secs == 0 {
        errors.push(ValidationError::new("store.timeout_secs", "must be greater than zero"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
