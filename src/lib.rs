//! Greenlight movie catalogue API library.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod mailer;
pub mod observability;
pub mod security;
pub mod store;
pub mod validation;

pub use config::AppConfig;
pub use http::HttpServer;
pub use lifecycle::{LifecycleManager, Shutdown};

/// Reported by the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
