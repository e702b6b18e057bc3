//! Per-attempt timeout enforcement.

use std::future::Future;
use std::time::Duration;

use axum::body::Body;
use axum::http::Response;

use crate::client::TransportError;

/// Bound one attempt (up to the response head) by `limit`.
///
/// The body is streamed afterwards and is not covered by the deadline.
pub async fn with_attempt_timeout<F>(limit: Duration, call: F) -> Result<Response<Body>, TransportError>
where
    F: Future<Output = Result<Response<Body>, TransportError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(format!(
            "no response within {} ms",
            limit.as_millis()
        ))),
    }
}
