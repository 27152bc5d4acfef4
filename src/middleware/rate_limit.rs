use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use tracing::warn;

use crate::{
    config::RateLimitConfig,
    error::{AppError, AppResult},
};

/// Windows are swept once the table holds this many clients.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Fixed-window request counter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Counts a hit for `key`. On refusal returns the seconds until the window resets.
    pub fn check(&self, key: &str, now: Instant) -> Result<(), u64> {
        let mut clients = self.clients.lock();
        if clients.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(key.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                hits: 0,
            };
        }

        if entry.hits >= self.max_requests {
            let left = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(left.as_secs().max(1));
        }
        entry.hits += 1;
        Ok(())
    }
}

fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn limit_by_ip(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> AppResult<Response> {
    let key = client_key(&req);
    if let Err(retry_after_secs) = limiter.check(&key, Instant::now()) {
        warn!(client = %key, uri = %req.uri(), "rate limit exceeded");
        return Err(AppError::TooManyRequests { retry_after_secs });
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window_secs,
        })
    }

    #[test]
    fn refuses_after_max_within_window() {
        let limiter = limiter(2, 60);
        let t0 = Instant::now();
        assert!(limiter.check("1.2.3.4", t0).is_ok());
        assert!(limiter.check("1.2.3.4", t0).is_ok());
        let retry = limiter.check("1.2.3.4", t0 + Duration::from_secs(10)).unwrap_err();
        assert_eq!(retry, 50);
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = limiter(1, 60);
        let t0 = Instant::now();
        assert!(limiter.check("a", t0).is_ok());
        assert!(limiter.check("b", t0).is_ok());
        assert!(limiter.check("a", t0).is_err());
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = limiter(1, 60);
        let t0 = Instant::now();
        assert!(limiter.check("a", t0).is_ok());
        assert!(limiter.check("a", t0 + Duration::from_secs(59)).is_err());
        assert!(limiter.check("a", t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn stale_windows_are_pruned() {
        let limiter = limiter(5, 1);
        let t0 = Instant::now();
        for i in 0..PRUNE_THRESHOLD {
            limiter.check(&i.to_string(), t0).unwrap();
        }
        limiter.check("fresh", t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(limiter.clients.lock().len(), 1);
    }
}
