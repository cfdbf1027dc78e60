//! Per-client admission limiting.
//!
//! Every client address owns a token bucket. Buckets are created on first
//! sight, refilled lazily on each request and evicted by a periodic sweep
//! once idle for longer than the configured threshold.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;
use crate::http::response::ApiError;
use crate::observability::metrics;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("unable to determine client address")]
    UnknownClient,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        // never move backwards if callers race with slightly older instants
        self.last_refill = self.last_refill.max(now);
        self.last_seen = self.last_seen.max(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token-bucket limiter keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    enabled: bool,
    rate: f64,
    burst: f64,
    idle_timeout: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            enabled: config.enabled,
            rate: config.requests_per_second,
            burst: config.burst_size as f64,
            idle_timeout: config.idle_eviction(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // A panic while holding the lock leaves the map itself intact.
    fn buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `client` may proceed now.
    pub fn allow(&self, client: &str) -> bool {
        self.allow_at(client, Instant::now())
    }

    pub fn allow_at(&self, client: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }
        let mut buckets = self.buckets();
        match buckets.get_mut(client) {
            Some(bucket) => bucket.try_acquire(self.burst, self.rate, now),
            None => {
                let mut bucket = TokenBucket::full(self.burst, now);
                let allowed = bucket.try_acquire(self.burst, self.rate, now);
                buckets.insert(client.to_string(), bucket);
                allowed
            }
        }
    }

    pub fn check(&self, client: &str) -> Result<(), LimiterError> {
        if self.allow(client) {
            Ok(())
        } else {
            Err(LimiterError::RateLimited)
        }
    }

    /// Drop buckets not seen within the idle threshold. Returns how many
    /// were removed.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= self.idle_timeout);
        metrics::record_limiter_clients(buckets.len());
        before - buckets.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets().len()
    }

    /// Sweep idle buckets every `interval` until `stop` is cancelled.
    pub async fn run_eviction(self: Arc<Self>, interval: Duration, stop: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = self.evict_idle_at(Instant::now());
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = self.tracked_clients(), "Evicted idle rate limiter clients");
                    }
                }
            }
        }
        tracing::debug!("Rate limiter sweep stopped");
    }
}

/// Admission check keyed by the connection's source IP.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let client = match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip().to_string(),
        None => {
            let err = LimiterError::UnknownClient;
            return ApiError::Internal(err.to_string()).into_response();
        }
    };

    match limiter.check(&client) {
        Ok(()) => next.run(request).await,
        Err(_) => {
            tracing::warn!(client = %client, "Rate limit exceeded");
            metrics::record_rate_limited();
            ApiError::RateLimited.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rate: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: rate,
            burst_size: burst,
            idle_eviction_secs: 180,
            sweep_interval_secs: 60,
        })
    }

    #[test]
    fn steady_rate_below_refill_never_denied() {
        let limiter = limiter(2.0, 4);
        let start = Instant::now();
        // 1.8 rps against a 2 rps refill
        let step = Duration::from_secs_f64(1.0 / 1.8);
        for i in 0..500u32 {
            assert!(limiter.allow_at("10.0.0.1", start + step * i), "denied at request {}", i);
        }
    }

    #[test]
    fn instantaneous_burst_admits_exactly_burst() {
        let limiter = limiter(2.0, 4);
        let now = Instant::now();
        let admitted = (0..5).filter(|_| limiter.allow_at("10.0.0.1", now)).count();
        assert_eq!(admitted, 4);
        assert_eq!(limiter.check("10.0.0.1"), Err(LimiterError::RateLimited));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = limiter(1.0, 1);
        let now = Instant::now();
        assert!(limiter.allow_at("a", now));
        assert!(!limiter.allow_at("a", now));
        assert!(limiter.allow_at("b", now));
        assert!(limiter.allow_at("a", now + Duration::from_secs(1)));
    }

    #[test]
    fn disabled_limiter_admits_without_tracking() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            burst_size: 1,
            ..RateLimitConfig::default()
        });
        let now = Instant::now();
        assert!((0..100).all(|_| limiter.allow_at("a", now)));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn sweep_removes_only_idle_buckets() {
        let limiter = limiter(2.0, 4);
        let start = Instant::now();
        limiter.allow_at("idle", start);
        limiter.allow_at("active", start);
        limiter.allow_at("active", start + Duration::from_secs(150));

        let evicted = limiter.evict_idle_at(start + Duration::from_secs(181));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_clients(), 1);
        // a fresh bucket starts full again
        assert!(limiter.allow_at("idle", start + Duration::from_secs(182)));
    }

    #[test]
    fn concurrent_admissions_stay_within_bound() {
        let limiter = limiter(50.0, 10);
        let start = Instant::now();
        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let mut admitted = 0;
                        while start.elapsed() < Duration::from_millis(200) {
                            if limiter.allow("shared") {
                                admitted += 1;
                            }
                        }
                        admitted
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        let window = start.elapsed().as_secs_f64();
        let bound = 10 + (50.0 * window).floor() as usize;
        assert!(admitted <= bound, "admitted {} > bound {}", admitted, bound);
        assert!(admitted >= 10);
    }

    #[tokio::test]
    async fn unidentifiable_client_is_a_server_error() {
        use axum::{http::StatusCode, routing::get, Router};
        use tower::ServiceExt;

        let limiter = Arc::new(limiter(2.0, 4));
        let app = Router::new()
            .route("/", get(|| async { "admitted" }))
            .layer(axum::middleware::from_fn_with_state(limiter.clone(), rate_limit_middleware));

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body["error"],
            "the server encountered a problem and could not process your request"
        );
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let limiter = Arc::new(limiter(2.0, 4));
        let stop = CancellationToken::new();
        let sweeper = tokio::spawn(limiter.clone().run_eviction(Duration::from_millis(10), stop.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        stop.cancel();
        tokio::time::timeout(Duration::from_secs(1), sweeper).await.unwrap().unwrap();
    }
}
