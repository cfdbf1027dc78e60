//! Admission limiting through the full pipeline.

use std::sync::Arc;

use serde_json::Value;

mod common;

use common::{spawn_server, test_config, RecordingNotifier};

#[tokio::test]
async fn burst_beyond_capacity_is_rejected() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 0.5;
    config.rate_limit.burst_size = 4;
    let server = spawn_server(config, Arc::new(RecordingNotifier::default())).await;

    let mut statuses = Vec::new();
    for _ in 0..5 {
        let res = server.client.get(server.url("/v1/health")).send().await.unwrap();
        statuses.push(res.status().as_u16());
        if res.status() == 429 {
            let body: Value = res.json().await.unwrap();
            assert_eq!(body["error"], "rate limit exceeded");
        }
    }
    assert_eq!(statuses, vec![200, 200, 200, 200, 429]);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn limiter_runs_before_authentication() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 0.5;
    config.rate_limit.burst_size = 1;
    let server = spawn_server(config, Arc::new(RecordingNotifier::default())).await;

    let send = || {
        server
            .client
            .get(server.url("/v1/health"))
            .header("Authorization", "Bearer garbage")
            .send()
    };
    assert_eq!(send().await.unwrap().status(), 401);
    // over quota: rejected before the bad token is looked at
    assert_eq!(send().await.unwrap().status(), 429);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn disabled_limiter_admits_everything() {
    let server = spawn_server(test_config(), Arc::new(RecordingNotifier::default())).await;

    for _ in 0..25 {
        let res = server.client.get(server.url("/v1/health")).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }

    server.stop().await.unwrap();
}
