//! In-process request rate limiting for the HTTP routes.
//!
//! Fixed windows keyed by client address. Task routes carry a per-route
//! limit; the whole API also carries per-client daily and hourly limits.
//! State is not shared between processes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tokio::time::Instant;
use tracing::warn;

/// Requests allowed per client and route in one window.
pub const DEFAULT_LIMIT: u32 = 10;

/// Window length (one minute).
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Requests allowed per client across the API in one day.
pub const DAILY_LIMIT: u32 = 200;

/// Requests allowed per client across the API in one hour.
pub const HOURLY_LIMIT: u32 = 50;

/// Key used when the peer address is unknown (e.g. in-process tests).
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, Duration::from_secs(DEFAULT_WINDOW_SECS))
    }
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request for `key`.
    ///
    /// Returns the time until the window resets when the limit is exceeded.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Drop expired windows so the map doesn't grow with every client seen.
        windows.retain(|_, w| now.duration_since(w.started) < self.window);

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if window.count >= self.limit {
            return Err(self.window - now.duration_since(window.started));
        }

        window.count += 1;
        Ok(())
    }
}

/// Per-client limits applied to every API route: 200 per day, 50 per hour.
pub fn client_defaults() -> Vec<RateLimiter> {
    vec![
        RateLimiter::new(DAILY_LIMIT, Duration::from_secs(24 * 60 * 60)),
        RateLimiter::new(HOURLY_LIMIT, Duration::from_secs(60 * 60)),
    ]
}

fn client_id(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn rejection(client: &str, path: &str, retry_after: Duration) -> Response {
    warn!(client = %client, path = %path, "Request rate limit exceeded");
    let secs = retry_after.as_secs().max(1);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, secs.to_string())],
        Json(json!({
            "error": format!("Rate limit exceeded. Try again in {} seconds", secs)
        })),
    )
        .into_response()
}

/// Middleware enforcing a per-client, per-route limiter on the wrapped routes.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_id(&request);
    let path = request.uri().path().to_string();

    match limiter.check(&format!("{} {}", client, path)) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => rejection(&client, &path, retry_after),
    }
}

/// Middleware enforcing per-client limits shared by all wrapped routes.
///
/// Every limiter is checked; the longest wait among the rejecting ones is
/// reported.
pub async fn enforce_client(
    State(limiters): State<Arc<Vec<RateLimiter>>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_id(&request);

    let retry_after = limiters
        .iter()
        .filter_map(|limiter| limiter.check(&client).err())
        .max();

    match retry_after {
        None => next.run(request).await,
        Some(retry_after) => rejection(&client, request.uri().path(), retry_after),
    }
}
