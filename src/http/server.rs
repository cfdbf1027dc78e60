//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build shared application state (stores, credential engine, limiter)
//! - Create the Axum router with the gated route table
//! - Wire up outer middleware (request ID, tracing, metrics, timeout, body limit)
//! - Hand the router to the lifecycle manager

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, middleware, Router};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::auth::CredentialEngine;
use crate::config::AppConfig;
use crate::handlers;
use crate::http::pipeline::{self, enforce_timeout, track_metrics};
use crate::http::request::MakeRequestUuid;
use crate::lifecycle::{BackgroundTasks, LifecycleError, LifecycleManager};
use crate::mailer::{LogNotifier, Notifier};
use crate::security::RateLimiter;
use crate::store::{MemoryStore, MovieStore, UserStore};

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub credentials: CredentialEngine,
    pub users: Arc<dyn UserStore>,
    pub movies: Arc<dyn MovieStore>,
    pub limiter: Arc<RateLimiter>,
    pub background: BackgroundTasks,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Per-call deadline for store access from the request path.
    pub fn store_deadline(&self) -> Duration {
        self.config.store.timeout()
    }
}

/// HTTP server for the movie API.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a server over a fresh in-memory store.
    pub fn new(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let credentials = CredentialEngine::new(
            store.clone(),
            config.tokens.secret_bytes,
            config.store.timeout(),
        );
        let state = AppState {
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            credentials,
            users: store.clone(),
            movies: store,
            background: BackgroundTasks::new(),
            notifier: Arc::new(LogNotifier),
            config: Arc::new(config),
        };
        Self { state }
    }

    /// Replace the welcome message transport.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.state.notifier = notifier;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Tracker the lifecycle manager must wait on.
    pub fn background(&self) -> BackgroundTasks {
        self.state.background.clone()
    }

    /// Build the router with all middleware layers.
    pub fn router(&self) -> Router {
        let server = &self.state.config.server;
        pipeline::gate(handlers::routes(), self.state.clone())
            .layer(DefaultBodyLimit::max(server.max_body_bytes))
            .layer(middleware::from_fn_with_state(
                Duration::from_secs(server.request_timeout_secs),
                enforce_timeout,
            ))
            .layer(middleware::from_fn(track_metrics))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve until the manager stops. Starts the limiter sweep alongside.
    pub async fn run(self, manager: LifecycleManager) -> Result<(), LifecycleError> {
        let limits = &self.state.config.rate_limit;
        if limits.enabled {
            tokio::spawn(
                self.state
                    .limiter
                    .clone()
                    .run_eviction(limits.sweep_interval(), manager.stopped_token()),
            );
        }

        tracing::info!(
            address = %manager.local_addr(),
            env = %self.state.config.server.env,
            limiter_enabled = limits.enabled,
            "Starting server"
        );
        manager.run(self.router()).await
    }
}
