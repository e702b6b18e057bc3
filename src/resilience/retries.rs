//! Retry options.
//!
//! # Responsibilities
//! - Hold the per-request retry tuning (timeout, counts, backoff bound)
//! - Name the failure kinds that must never be retried
//!
//! # Design Decisions
//! - Non-retryable failures are a closed set of kinds, matched structurally
//! - Whether 5xx responses are retried has no default; callers must choose

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::client::TransportError;
use crate::config::{RetryConfig, ValidationError};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 9;
pub const DEFAULT_MAX_RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// Kinds of attempt failures, as far as retry policy is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No response within the operation timeout.
    Timeout,
    /// The endpoint refused or could not be reached.
    ConnectFailure,
    /// The connection closed before a full response arrived.
    ConnectionClosed,
    /// The backend spoke malformed HTTP.
    ProtocolViolation,
    /// Any other transport failure.
    Transport,
    /// The backend answered 404.
    NotFound,
    /// The backend answered 5xx.
    ServerError,
}

impl FailureKind {
    pub fn of_transport(err: &TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => FailureKind::Timeout,
            TransportError::Connect(_) => FailureKind::ConnectFailure,
            TransportError::ConnectionClosed(_) => FailureKind::ConnectionClosed,
            TransportError::Protocol(_) => FailureKind::ProtocolViolation,
            TransportError::Other(_) => FailureKind::Transport,
        }
    }

    /// Failure kind carried by a response status, if any.
    pub fn of_status(status: StatusCode) -> Option<Self> {
        if status == StatusCode::NOT_FOUND {
            Some(FailureKind::NotFound)
        } else if status.is_server_error() {
            Some(FailureKind::ServerError)
        } else {
            None
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ConnectFailure => "connect_failure",
            FailureKind::ConnectionClosed => "connection_closed",
            FailureKind::ProtocolViolation => "protocol_violation",
            FailureKind::Transport => "transport",
            FailureKind::NotFound => "not_found",
            FailureKind::ServerError => "server_error",
        };
        f.write_str(name)
    }
}

/// Retry behaviour for one proxied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    /// Deadline for a single attempt, reset on every retry.
    pub operation_timeout: Duration,
    /// Retries against the same endpoint before giving up.
    pub max_retry_count: u32,
    /// Upper bound of the uniformly jittered delay between retries.
    pub max_retry_backoff: Duration,
    /// Whether 5xx responses are retried.
    pub retry_status_errors: bool,
    /// Failure kinds that end the request immediately.
    pub do_not_retry: HashSet<FailureKind>,
}

impl RetryOptions {
    /// Default tuning with an explicit 5xx policy.
    pub fn new(retry_status_errors: bool) -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            max_retry_backoff: DEFAULT_MAX_RETRY_BACKOFF,
            retry_status_errors,
            do_not_retry: HashSet::new(),
        }
    }

    /// Build options from configuration.
    ///
    /// `inherited` supplies the 5xx policy when `config` leaves it unset
    /// (route overrides inherit it from the global section).
    pub fn from_config(config: &RetryConfig, inherited: Option<bool>) -> Result<Self, ValidationError> {
        let retry_status_errors = config
            .retry_status_errors
            .or(inherited)
            .ok_or(ValidationError::MissingStatusRetryPolicy)?;

        Ok(Self {
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
            max_retry_count: config.max_retry_count,
            max_retry_backoff: Duration::from_millis(config.max_retry_backoff_ms),
            retry_status_errors,
            do_not_retry: config.do_not_retry.iter().copied().collect(),
        })
    }

    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        !self.do_not_retry.contains(&kind)
    }
}
