//! Token-bucket rate limiting.
//!
//! One limiter type, two uses: per client IP in front of the HTTP API, and per
//! sender on the message write path (shared by HTTP and socket sends).

use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::ServerError;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, rate: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;

        self.tokens = (self.tokens + elapsed * rate).min(capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter<K> {
    buckets: Arc<Mutex<HashMap<K, TokenBucket>>>,
    rate: f64,
    capacity: f64,
}

/// Per client IP, for the HTTP middleware.
pub type IpRateLimiter = RateLimiter<IpAddr>;

/// Per sender, for message writes.
pub type SenderRateLimiter = RateLimiter<Uuid>;

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate,
            capacity,
        }
    }

    pub async fn check(&self, key: &K) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.clone())
            .or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.try_consume(self.rate, self.capacity)
    }

    pub async fn purge_stale(&self, max_idle_secs: f64) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| {
            now.duration_since(bucket.last_refill).as_secs_f64() < max_idle_secs
        });
    }

    #[cfg(test)]
    pub async fn tracked(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

impl Default for IpRateLimiter {
    fn default() -> Self {
        Self::new(20.0, 60.0)
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ServerError> {
    if let Some(ip) = extract_client_ip(&req) {
        if !limiter.check(&ip).await {
            warn!(ip = %ip, "Rate limit exceeded");
            return Err(ServerError::TooManyRequests);
        }
    }

    Ok(next.run(req).await)
}

/// Try ConnectInfo first, then X-Forwarded-For, then X-Real-IP.
fn extract_client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(connect_info) = req.extensions().get::<ConnectInfo<std::net::SocketAddr>>() {
        return Some(connect_info.0.ip());
    }

    let header_ip = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for").or_else(|| header_ip("x-real-ip"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_rate_limiter_allows_burst() {
        let limiter = SenderRateLimiter::new(1.0, 5.0);
        let sender = Uuid::new_v4();

        for _ in 0..5 {
            assert!(limiter.check(&sender).await);
        }

        assert!(!limiter.check(&sender).await);
    }

    #[tokio::test]
    async fn test_rate_limiter_keys_are_independent() {
        let limiter = IpRateLimiter::new(1.0, 2.0);
        let ip1: IpAddr = "10.0.0.1".parse().unwrap();
        let ip2: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(&ip1).await);
        assert!(limiter.check(&ip1).await);
        assert!(!limiter.check(&ip1).await);

        assert!(limiter.check(&ip2).await);
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let limiter = SenderRateLimiter::new(10.0, 5.0);
        assert!(limiter.check(&Uuid::new_v4()).await);

        limiter.purge_stale(0.0).await;
        assert_eq!(limiter.tracked().await, 0);
    }

    #[tokio::test]
    async fn test_rejection_uses_error_envelope() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                IpRateLimiter::new(0.001, 1.0),
                rate_limit_middleware,
            ));
        let request = || {
            Request::builder()
                .uri("/")
                .header("x-forwarded-for", "198.51.100.4")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let bytes = axum::body::to_bytes(second.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Too many requests");
    }

    #[test]
    fn test_forwarded_header_ip() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(extract_client_ip(&req), Some("203.0.113.7".parse().unwrap()));

        let req = Request::builder().body(()).unwrap();
        assert_eq!(extract_client_ip(&req), None);
    }
}
