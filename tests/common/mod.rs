//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use greenlight::config::AppConfig;
use greenlight::http::{AppState, HttpServer};
use greenlight::lifecycle::{LifecycleError, LifecycleManager, Shutdown};
use greenlight::mailer::{Notifier, NotifyError, WelcomeMessage};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

/// Notifier that keeps every message, optionally after a delay.
#[derive(Default)]
pub struct RecordingNotifier {
    delay: Duration,
    sent: Mutex<Vec<(String, WelcomeMessage)>>,
}

impl RecordingNotifier {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, WelcomeMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Poll until a message for `recipient` arrives and return its token.
    pub async fn token_for(&self, recipient: &str) -> String {
        for _ in 0..100 {
            if let Some((_, message)) = self.sent().into_iter().find(|(to, _)| to == recipient) {
                return message.activation_token;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no welcome message for {}", recipient);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_welcome(&self, recipient: &str, message: WelcomeMessage) -> Result<(), NotifyError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent.lock().unwrap().push((recipient.to_string(), message));
        Ok(())
    }
}

/// Defaults suited to tests: ephemeral port, limiter off, short grace.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.bind_address = "127.0.0.1:0".into();
    config.rate_limit.enabled = false;
    config.lifecycle.grace_period_secs = 5;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), LifecycleError>>,
    pub client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Request shutdown and wait for the lifecycle result.
    pub async fn stop(self) -> Result<(), LifecycleError> {
        self.shutdown.request();
        self.handle.await.unwrap()
    }
}

async fn bind(config: &AppConfig, server: &HttpServer) -> LifecycleManager {
    LifecycleManager::bind(
        &config.server.bind_address,
        config.lifecycle.grace_period(),
        server.background(),
    )
    .await
    .unwrap()
    .without_os_signals()
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Boot the full application.
pub async fn spawn_server(config: AppConfig, notifier: Arc<RecordingNotifier>) -> TestServer {
    let server = HttpServer::new(config.clone()).with_notifier(notifier);
    let manager = bind(&config, &server).await;
    TestServer {
        addr: manager.local_addr(),
        shutdown: manager.shutdown_handle(),
        handle: tokio::spawn(server.run(manager)),
        client: client(),
    }
}

/// Boot a custom router built from the application's state.
pub async fn spawn_router<F>(config: AppConfig, build: F) -> TestServer
where
    F: FnOnce(AppState) -> Router,
{
    let server = HttpServer::new(config.clone());
    let manager = bind(&config, &server).await;
    let app = build(server.state().clone());
    TestServer {
        addr: manager.local_addr(),
        shutdown: manager.shutdown_handle(),
        handle: tokio::spawn(manager.run(app)),
        client: client(),
    }
}

/// Register, activate and log in a user; returns the bearer token.
pub async fn activated_user(server: &TestServer, notifier: &RecordingNotifier, email: &str) -> String {
    let res = server
        .client
        .post(server.url("/v1/users"))
        .json(&json!({"name": "Test User", "email": email, "password": "pa55word"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 202);

    let token = notifier.token_for(email).await;
    let res = server
        .client
        .put(server.url("/v1/users/activated"))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    login(server, email, "pa55word").await
}

pub async fn login(server: &TestServer, email: &str, password: &str) -> String {
    let res = server
        .client
        .post(server.url("/v1/tokens/authentication"))
        .json(&json!({"email": email, "password": password}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let body: Value = res.json().await.unwrap();
    body["authentication_token"]["token"].as_str().unwrap().to_string()
}
