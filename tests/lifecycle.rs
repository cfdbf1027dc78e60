//! Shutdown and fault containment against a running server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{routing::get, Router};
use greenlight::http::pipeline;
use greenlight::lifecycle::LifecycleError;
use serde_json::json;

mod common;

use common::{spawn_router, spawn_server, test_config, RecordingNotifier};

#[tokio::test]
async fn shutdown_waits_for_welcome_message() {
    let notifier = Arc::new(RecordingNotifier::with_delay(Duration::from_millis(500)));
    let server = spawn_server(test_config(), notifier.clone()).await;

    let res = server
        .client
        .post(server.url("/v1/users"))
        .json(&json!({"name": "Frank", "email": "frank@example.com", "password": "pa55word"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 202);
    assert!(notifier.sent().is_empty());

    server.stop().await.unwrap();
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn stuck_background_task_forces_stop_after_grace() {
    let notifier = Arc::new(RecordingNotifier::with_delay(Duration::from_secs(60)));
    let mut config = test_config();
    config.lifecycle.grace_period_secs = 1;
    let server = spawn_server(config, notifier.clone()).await;

    let res = server
        .client
        .post(server.url("/v1/users"))
        .json(&json!({"name": "Grace", "email": "grace@example.com", "password": "pa55word"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 202);

    let start = Instant::now();
    match server.stop().await {
        Err(LifecycleError::DrainTimeout {
            connections_drained,
            outstanding_tasks,
            ..
        }) => {
            assert!(connections_drained);
            assert_eq!(outstanding_tasks, 1);
        }
        other => panic!("expected drain timeout, got {:?}", other),
    }
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn handler_panic_is_isolated() {
    let server = spawn_router(test_config(), |state| {
        let routes = Router::new()
            .route(
                "/panic",
                get(|| async {
                    if true {
                        panic!("boom");
                    }
                    "unreachable"
                }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    "slow ok"
                }),
            );
        pipeline::gate(routes, state)
    })
    .await;

    let slow = {
        let client = server.client.clone();
        let url = server.url("/slow");
        tokio::spawn(async move { client.get(url).send().await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let res = server.client.get(server.url("/panic")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        body["error"],
        "the server encountered a problem and could not process your request"
    );

    let slow = slow.await.unwrap();
    assert_eq!(slow.status(), 200);
    assert_eq!(slow.text().await.unwrap(), "slow ok");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn in_flight_request_finishes_during_drain() {
    let server = spawn_router(test_config(), |state| {
        let routes = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                "finished"
            }),
        );
        pipeline::gate(routes, state)
    })
    .await;

    let request = {
        let client = server.client.clone();
        let url = server.url("/slow");
        tokio::spawn(async move { client.get(url).send().await.unwrap().text().await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let addr = server.addr;
    server.stop().await.unwrap();
    assert_eq!(request.await.unwrap(), "finished");

    // no longer accepting
    assert!(reqwest::get(format!("http://{}/slow", addr)).await.is_err());
}
