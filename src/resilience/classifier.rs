//! Attempt outcome classification.
//!
//! Rules, first match wins:
//! 1. caller went away → `Aborted` (not a failure)
//! 2. failure kind configured as non-retryable → `Fatal`
//! 3. transport failure without a response → retry on the same endpoint
//! 4. 404 → stale address, re-resolve and retry (twice at most), unless the
//!    backend marked it as a genuine "resource not found"
//! 5. 5xx with status retries enabled → retry on the same endpoint
//! 6. anything else → `Success` with the response, `Fatal` without one
//!
//! Custom [`FailureHandler`]s run ahead of these rules, after rules 1 and 2.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Response, StatusCode};

use crate::client::TransportError;
use crate::resilience::backoff::jittered_delay;
use crate::resilience::retries::{FailureKind, RetryOptions};

/// Response header a backend sets on an intentional 404.
pub const NOT_FOUND_SENTINEL_HEADER: HeaderName = HeaderName::from_static("x-servicefabric");
/// Value of [`NOT_FOUND_SENTINEL_HEADER`] marking an intentional 404.
pub const NOT_FOUND_SENTINEL_VALUE: &str = "ResourceNotFound";

/// Delay before re-resolving after a 404.
pub const STALE_ADDRESS_RETRY_DELAY: Duration = Duration::from_millis(100);
/// Extra attempts granted to stale-address re-resolution.
pub const STALE_ADDRESS_MAX_RETRIES: u32 = 2;

/// Raw result of one attempt.
#[derive(Debug)]
pub enum AttemptResult {
    Cancelled,
    Transport(TransportError),
    Response(Response<Body>),
}

impl From<Result<Response<Body>, TransportError>> for AttemptResult {
    fn from(result: Result<Response<Body>, TransportError>) -> Self {
        match result {
            Ok(response) => AttemptResult::Response(response),
            Err(err) => AttemptResult::Transport(err),
        }
    }
}

/// What went wrong in a failed attempt.
#[derive(Debug)]
pub enum Failure {
    Transport(TransportError),
    Response(Response<Body>),
}

impl Failure {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Failure::Transport(err) => Some(FailureKind::of_transport(err)),
            Failure::Response(response) => FailureKind::of_status(response.status()),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Transport(err) => write!(f, "{err}"),
            Failure::Response(response) => write!(f, "HTTP {}", response.status().as_u16()),
        }
    }
}

/// Decision for a classified attempt.
#[derive(Debug)]
pub enum Outcome {
    /// Relay this response.
    Success(Response<Body>),
    /// Retry against the same client after `delay`.
    RetryKeepEndpoint { delay: Duration, failure: Failure },
    /// Invalidate the client, re-resolve, and retry after `delay`.
    RetryReResolve {
        delay: Duration,
        max_extra_attempts: u32,
        failure: Failure,
    },
    /// Stop; surface this failure.
    Fatal(Failure),
    /// The caller went away; stop without an outcome.
    Aborted,
}

impl Outcome {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::RetryKeepEndpoint { .. } => "retry",
            Outcome::RetryReResolve { .. } => "re_resolve",
            Outcome::Fatal(_) => "fatal",
            Outcome::Aborted => "aborted",
        }
    }
}

/// A decision detached from the attempt it was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Relay the backend response.
    Relay,
    /// Retry against the same client after `delay`.
    RetryKeepEndpoint { delay: Duration },
    /// Invalidate the client, re-resolve, and retry after `delay`.
    RetryReResolve { delay: Duration, max_extra_attempts: u32 },
    /// Stop with this attempt as the final result.
    Fail,
}

impl Verdict {
    /// Attach the verdict to the attempt it judged.
    ///
    /// Relayed responses never carry the not-found sentinel; a transport
    /// failure has nothing to relay and becomes fatal.
    fn apply(self, result: AttemptResult) -> Outcome {
        let failure = match result {
            AttemptResult::Cancelled => return Outcome::Aborted,
            AttemptResult::Transport(err) => Failure::Transport(err),
            AttemptResult::Response(mut response) => {
                strip_not_found_sentinel(response.headers_mut());
                Failure::Response(response)
            }
        };
        match (self, failure) {
            (Verdict::Relay, Failure::Response(response)) => Outcome::Success(response),
            (Verdict::Relay, failure) | (Verdict::Fail, failure) => Outcome::Fatal(failure),
            (Verdict::RetryKeepEndpoint { delay }, failure) => {
                Outcome::RetryKeepEndpoint { delay, failure }
            }
            (
                Verdict::RetryReResolve {
                    delay,
                    max_extra_attempts,
                },
                failure,
            ) => Outcome::RetryReResolve {
                delay,
                max_extra_attempts,
                failure,
            },
        }
    }
}

/// Caller-supplied failure handling, consulted before the built-in rules.
pub trait FailureHandler: Send + Sync + fmt::Debug {
    /// Judge `attempt`, or return `None` to leave it to the next handler.
    fn handle(&self, attempt: &AttemptResult, options: &RetryOptions) -> Option<Verdict>;
}

/// Ordered handler chain ending in the built-in rules.
#[derive(Debug, Clone, Default)]
pub struct FailureHandlers {
    handlers: Vec<Arc<dyn FailureHandler>>,
}

impl FailureHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; it runs after every handler added before it.
    pub fn with(mut self, handler: impl FailureHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Classify one attempt: first handler with a verdict wins, the
    /// built-in rules decide otherwise.
    ///
    /// Cancellation and non-retryable kinds are settled before any handler runs.
    pub fn classify(&self, result: AttemptResult, options: &RetryOptions) -> Outcome {
        let settled = match &result {
            AttemptResult::Cancelled => true,
            AttemptResult::Transport(err) => !options.is_retryable(FailureKind::of_transport(err)),
            AttemptResult::Response(response) => FailureKind::of_status(response.status())
                .is_some_and(|kind| !options.is_retryable(kind)),
        };
        if !settled {
            for handler in &self.handlers {
                if let Some(verdict) = handler.handle(&result, options) {
                    tracing::debug!(?handler, ?verdict, "Failure handler decided the attempt");
                    return verdict.apply(result);
                }
            }
        }
        classify(result, options)
    }
}

/// Classify one attempt under `options`.
pub fn classify(result: AttemptResult, options: &RetryOptions) -> Outcome {
    match result {
        AttemptResult::Cancelled => Outcome::Aborted,
        AttemptResult::Transport(err) => classify_transport(err, options),
        AttemptResult::Response(response) => classify_response(response, options),
    }
}

fn classify_transport(err: TransportError, options: &RetryOptions) -> Outcome {
    let kind = FailureKind::of_transport(&err);
    if !options.is_retryable(kind) || kind == FailureKind::Transport {
        return Outcome::Fatal(Failure::Transport(err));
    }
    Outcome::RetryKeepEndpoint {
        delay: jittered_delay(options.max_retry_backoff),
        failure: Failure::Transport(err),
    }
}

fn classify_response(mut response: Response<Body>, options: &RetryOptions) -> Outcome {
    let intentional = strip_not_found_sentinel(response.headers_mut());
    let status = response.status();

    if status == StatusCode::NOT_FOUND && intentional {
        return Outcome::Success(response);
    }

    let Some(kind) = FailureKind::of_status(status) else {
        return Outcome::Success(response);
    };
    if !options.is_retryable(kind) {
        return Outcome::Fatal(Failure::Response(response));
    }

    match kind {
        // Either the route does not exist on the backend, or the address is stale.
        FailureKind::NotFound => Outcome::RetryReResolve {
            delay: STALE_ADDRESS_RETRY_DELAY,
            max_extra_attempts: STALE_ADDRESS_MAX_RETRIES,
            failure: Failure::Response(response),
        },
        // The address is right, the processing failed.
        FailureKind::ServerError if options.retry_status_errors => Outcome::RetryKeepEndpoint {
            delay: jittered_delay(options.max_retry_backoff),
            failure: Failure::Response(response),
        },
        _ => Outcome::Success(response),
    }
}

/// Remove the sentinel header; true if it marked an intentional 404.
fn strip_not_found_sentinel(headers: &mut HeaderMap) -> bool {
    let marked = headers
        .get_all(&NOT_FOUND_SENTINEL_HEADER)
        .iter()
        .any(|v| {
            v.to_str()
                .map(|s| s.trim().eq_ignore_ascii_case(NOT_FOUND_SENTINEL_VALUE))
                .unwrap_or(false)
        });
    if marked {
        headers.remove(&NOT_FOUND_SENTINEL_HEADER);
    }
    marked
}
