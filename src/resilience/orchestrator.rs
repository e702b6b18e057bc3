//! Retry orchestration for one proxied request.
//!
//! # State Machine
//! ```text
//! Resolving ──▶ Attempting ──▶ Classifying ──┬──▶ Succeeded
//!     ▲             ▲                        ├──▶ Failed
//!     │             └──── Retrying ◀─────────┤   (same client)
//!     └──────────────────  Retrying ◀────────┘   (stale address)
//! ```
//!
//! # Design Decisions
//! - Every attempt and every backoff sleep races the caller's cancellation token
//! - Keep-endpoint retries are bounded by `max_retry_count`; stale-address
//!   re-resolutions have their own, smaller budget
//! - Exhausted retries surface the last real backend response when there is one

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use tokio_util::sync::CancellationToken;

use crate::client::{
    AddressError, CachedClient, ClientCache, ClientError, ClientFactory, CommunicationClient,
    EndpointAddress, TransportError,
};
use crate::observability::metrics;
use crate::resilience::classifier::{AttemptResult, Failure, FailureHandler, FailureHandlers, Outcome};
use crate::resilience::retries::RetryOptions;
use crate::resilience::timeouts::with_attempt_timeout;
use crate::resolver::{
    EndpointResolver, EndpointSelector, ResolutionToken, ResolveError, RoundRobin, ServiceIdentity,
};

/// Why a proxied call produced no backend response.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("request cancelled by the caller")]
    Cancelled,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("no endpoint of {service} is published on listener {listener:?}")]
    NoEndpoint {
        service: String,
        listener: Option<String>,
    },

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("cannot build outbound request: {0}")]
    Request(String),

    #[error("service call failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        source: TransportError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Resolving,
    Attempting,
}

/// Drives resolve → attempt → classify → retry for proxied requests.
pub struct RetryOrchestrator<F: ClientFactory> {
    resolver: Arc<dyn EndpointResolver>,
    cache: Arc<ClientCache<F>>,
    selector: Arc<dyn EndpointSelector>,
    handlers: FailureHandlers,
}

impl<F: ClientFactory> RetryOrchestrator<F> {
    pub fn new(resolver: Arc<dyn EndpointResolver>, cache: Arc<ClientCache<F>>) -> Self {
        Self {
            resolver,
            cache,
            selector: Arc::new(RoundRobin::new()),
            handlers: FailureHandlers::new(),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn EndpointSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Replace the failure handler chain.
    pub fn with_failure_handlers(mut self, handlers: FailureHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Add a handler consulted after the ones already registered.
    pub fn with_failure_handler(mut self, handler: impl FailureHandler + 'static) -> Self {
        self.handlers = self.handlers.with(handler);
        self
    }

    pub fn cache(&self) -> &Arc<ClientCache<F>> {
        &self.cache
    }

    /// Call `identity` until an outcome is reached.
    ///
    /// `build` produces a fresh outbound request for the chosen endpoint on
    /// every attempt.
    pub async fn invoke<B, E>(
        &self,
        identity: &ServiceIdentity,
        listener: Option<&str>,
        options: &RetryOptions,
        cancel: &CancellationToken,
        mut build: B,
    ) -> Result<Response<Body>, InvokeError>
    where
        B: FnMut(&EndpointAddress) -> Result<Request<Body>, E>,
        E: fmt::Display,
    {
        let mut state = CallState::Resolving;
        let mut prior: Option<ResolutionToken> = None;
        let mut client: Option<Arc<CachedClient<F::Client>>> = None;
        let mut attempts = 0u32;
        let mut retries = 0u32;
        let mut re_resolutions = 0u32;

        loop {
            match state {
                CallState::Resolving => {
                    let resolved = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
                        resolved = self.resolver.resolve(identity, prior.as_ref()) => resolved?,
                    };

                    let endpoint = self
                        .selector
                        .select(&resolved.endpoints, listener)
                        .ok_or_else(|| InvokeError::NoEndpoint {
                            service: identity.service_name().to_string(),
                            listener: listener.map(str::to_string),
                        })?;
                    let address = EndpointAddress::parse(&endpoint.address)?;

                    tracing::debug!(service = %identity, endpoint = %address, "Resolved service endpoint");
                    client = Some(self.cache.get_or_create(&address)?);
                    prior = Some(resolved.token);
                    state = CallState::Attempting;
                }
                CallState::Attempting => {
                    let Some(mut current) = client.clone() else {
                        state = CallState::Resolving;
                        continue;
                    };
                    // Someone else may have invalidated it while we were sleeping.
                    if !self.cache.validate(&current, current.address()) {
                        let address = current.address().clone();
                        current = self.cache.get_or_create(&address)?;
                        client = Some(current.clone());
                    }

                    attempts += 1;
                    let request =
                        build(current.address()).map_err(|e| InvokeError::Request(e.to_string()))?;

                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => AttemptResult::Cancelled,
                        result = with_attempt_timeout(options.operation_timeout, current.send(request)) => {
                            AttemptResult::from(result)
                        }
                    };

                    let outcome = self.handlers.classify(result, options);
                    metrics::record_attempt(identity.service_name(), outcome.label());

                    match outcome {
                        Outcome::Success(response) => return Ok(response),
                        Outcome::Aborted => {
                            tracing::debug!(service = %identity, attempts, "Service call aborted by the caller");
                            return Err(InvokeError::Cancelled);
                        }
                        Outcome::Fatal(failure) => {
                            tracing::warn!(service = %identity, attempts, reason = %failure, "Service call failed");
                            return surface(failure, attempts);
                        }
                        Outcome::RetryKeepEndpoint { delay, failure } => {
                            if retries >= options.max_retry_count {
                                tracing::warn!(service = %identity, attempts, reason = %failure, "Service call failed, retries exhausted");
                                return surface(failure, attempts);
                            }
                            retries += 1;
                            tracing::warn!(
                                service = %identity,
                                endpoint = %current.address(),
                                attempt = attempts,
                                reason = %failure,
                                delay_ms = delay.as_millis() as u64,
                                "Retrying service call"
                            );
                            backoff(delay, cancel).await?;
                        }
                        Outcome::RetryReResolve {
                            delay,
                            max_extra_attempts,
                            failure,
                        } => {
                            if re_resolutions >= max_extra_attempts {
                                tracing::warn!(service = %identity, attempts, reason = %failure, "Service call failed, re-resolution exhausted");
                                return surface(failure, attempts);
                            }
                            re_resolutions += 1;
                            tracing::warn!(
                                service = %identity,
                                endpoint = %current.address(),
                                attempt = attempts,
                                reason = %failure,
                                "Retrying service call with a re-resolved address"
                            );
                            self.cache.invalidate(&current);
                            client = None;
                            backoff(delay, cancel).await?;
                            state = CallState::Resolving;
                        }
                    }
                }
            }
        }
    }
}

async fn backoff(delay: Duration, cancel: &CancellationToken) -> Result<(), InvokeError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(InvokeError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// A backend response is relayed as-is; only transport failures become errors.
fn surface(failure: Failure, attempts: u32) -> Result<Response<Body>, InvokeError> {
    match failure {
        Failure::Response(response) => Ok(response),
        Failure::Transport(source) => Err(InvokeError::Transport { attempts, source }),
    }
}
