//! Request admission middleware.
//!
//! Runs ahead of every route handler: resolves the caller key from address
//! headers, selects the policy for the request path, and either forwards
//! the request (annotating the response with quota headers) or answers 429
//! with retry guidance.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tracing::warn;

use crate::ratelimit::{Decision, LimiterSet};

/// Key used when no address header can be resolved.
const FALLBACK_CLIENT_KEY: &str = "127.0.0.1";

static RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
static RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Evaluate a request against the path's rate limit policy.
///
/// The admission check itself never fails; a request is only ever forwarded
/// or answered with 429.
pub async fn admission_middleware(
    State(limiters): State<Arc<LimiterSet>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(request.headers());
    let path = request.uri().path().to_string();
    let limiter = limiters.limiter_for(&path);
    let limit = limiter.policy().max_requests();
    let now_ms = Utc::now().timestamp_millis();

    match limiter.admit(&key, now_ms) {
        Decision::Admitted {
            remaining,
            reset_at_ms,
        } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            insert_header(headers, &RATELIMIT_LIMIT, limit.to_string());
            insert_header(headers, &RATELIMIT_REMAINING, remaining.to_string());
            insert_header(headers, &RATELIMIT_RESET, format_reset(reset_at_ms));
            response
        }
        Decision::Rejected {
            retry_after_secs,
            reset_at_ms,
        } => {
            warn!(
                key = %key,
                path = %path,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            rejection_response(limit, retry_after_secs, reset_at_ms)
        }
    }
}

/// Resolve the caller key from address-identifying headers.
///
/// Prefers the first entry of `x-forwarded-for`, then `x-real-ip`, then a
/// fixed loopback fallback. Resolution never fails the request.
fn client_key(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
    {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    FALLBACK_CLIENT_KEY.to_string()
}

/// Build the 429 response for a rejected request.
fn rejection_response(limit: u32, retry_after_secs: u32, reset_at_ms: i64) -> Response {
    let body = Json(json!({
        "error": "Too Many Requests",
        "message": format!(
            "Rate limit exceeded. Retry after {} seconds.",
            retry_after_secs
        ),
        "retryAfter": retry_after_secs,
    }));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    let headers = response.headers_mut();
    insert_header(headers, &header::RETRY_AFTER, retry_after_secs.to_string());
    insert_header(headers, &RATELIMIT_LIMIT, limit.to_string());
    insert_header(headers, &RATELIMIT_REMAINING, "0".to_string());
    insert_header(headers, &RATELIMIT_RESET, format_reset(reset_at_ms));
    response
}

/// Format a reset timestamp as ISO-8601.
fn format_reset(reset_at_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(reset_at_ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

fn insert_header(headers: &mut HeaderMap, name: &HeaderName, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let headers = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_key(&headers), "203.0.113.7");
    }

    #[test]
    fn test_client_key_trims_forwarded_entry() {
        let headers = headers(&[("x-forwarded-for", "  203.0.113.7 , 10.0.0.1")]);
        assert_eq!(client_key(&headers), "203.0.113.7");
    }

    #[test]
    fn test_client_key_falls_back_to_real_ip() {
        let headers = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_key(&headers), "198.51.100.2");
    }

    #[test]
    fn test_client_key_empty_forwarded_falls_through() {
        let headers = headers(&[("x-forwarded-for", ""), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_key(&headers), "198.51.100.2");
    }

    #[test]
    fn test_client_key_fallback_constant() {
        assert_eq!(client_key(&HeaderMap::new()), FALLBACK_CLIENT_KEY);
    }

    #[test]
    fn test_format_reset_is_iso8601() {
        assert_eq!(format_reset(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_reset(1_500), "1970-01-01T00:00:01.500Z");
    }
}
