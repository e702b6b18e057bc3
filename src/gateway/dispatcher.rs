//! Route table lookup and request forwarding.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::rejection::BytesRejection;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientFactory, TransportError};
use crate::gateway::partition::PartitionKeyError;
use crate::gateway::route::{GatewayRoute, RouteError};
use crate::observability::metrics;
use crate::proxy::{relay_response, NodeIdentity, ProxyRequestContext};
use crate::resilience::{InvokeError, RetryOrchestrator};

/// Why the gateway answered on its own instead of relaying a backend response.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Body(#[from] BytesRejection),

    #[error(transparent)]
    PartitionKey(#[from] PartitionKeyError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Body(rejection) => rejection.status(),
            GatewayError::PartitionKey(_) => StatusCode::BAD_REQUEST,
            GatewayError::Invoke(err) => match err {
                // Only reaches a caller when the gateway stops the call itself.
                InvokeError::Cancelled
                | InvokeError::Resolve(_)
                | InvokeError::NoEndpoint { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InvokeError::Transport {
                    source: TransportError::Timeout(_),
                    ..
                } => StatusCode::GATEWAY_TIMEOUT,
                InvokeError::Transport { .. } | InvokeError::Address(_) | InvokeError::Client(_) => {
                    StatusCode::BAD_GATEWAY
                }
                InvokeError::Request(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GatewayError::Body(_) => "invalid_body",
            GatewayError::PartitionKey(_) => "partition_key",
            GatewayError::Invoke(err) => match err {
                InvokeError::Cancelled => "shutting_down",
                InvokeError::Resolve(_) => "resolve_failed",
                InvokeError::NoEndpoint { .. } => "no_endpoint",
                InvokeError::Address(_) => "invalid_endpoint",
                InvokeError::Client(_) => "client_unavailable",
                InvokeError::Request(_) => "request_build_failed",
                InvokeError::Transport { .. } => "backend_unreachable",
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GatewayError::Invoke(InvokeError::Cancelled))
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        let mut response = Response::new(Body::from(body.to_string()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

/// Ordered route table in front of the retry orchestrator.
pub struct GatewayDispatcher<F: ClientFactory> {
    routes: Vec<GatewayRoute>,
    orchestrator: Arc<RetryOrchestrator<F>>,
    node: NodeIdentity,
    stopping: CancellationToken,
}

impl<F: ClientFactory> GatewayDispatcher<F> {
    pub fn new(
        routes: Vec<GatewayRoute>,
        orchestrator: Arc<RetryOrchestrator<F>>,
        node: NodeIdentity,
    ) -> Self {
        Self {
            routes,
            orchestrator,
            node,
            stopping: CancellationToken::new(),
        }
    }

    /// Cancel every call in flight when `stopping` is cancelled.
    pub fn stop_with(mut self, stopping: CancellationToken) -> Self {
        self.stopping = stopping;
        self
    }

    /// Append a route; it is consulted after every existing one.
    pub fn route(mut self, route: GatewayRoute) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[GatewayRoute] {
        &self.routes
    }

    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    /// First route whose prefix matches `path`.
    pub fn find(&self, path: &str) -> Option<&GatewayRoute> {
        self.routes.iter().find(|route| route.match_len(path).is_some())
    }

    /// Forward `request` through `route` and produce the inbound response.
    ///
    /// Dropping the returned future cancels the call in flight.
    pub async fn forward(
        &self,
        route: &GatewayRoute,
        request: Request<Body>,
        remote: Option<IpAddr>,
    ) -> Response<Body> {
        let start = Instant::now();
        let response = match self.call(route, request, remote).await {
            Ok(response) => relay_response(response, &self.node),
            Err(err) if err.is_cancelled() => {
                tracing::debug!(route = %route.prefix(), "Call cancelled before an outcome");
                err.into_response()
            }
            Err(err) => {
                tracing::warn!(
                    route = %route.prefix(),
                    service = %route.service_name(),
                    status = err.status().as_u16(),
                    error = %err,
                    "Request failed"
                );
                err.into_response()
            }
        };
        metrics::record_request(route.prefix(), response.status().as_u16(), start);
        response
    }

    async fn call(
        &self,
        route: &GatewayRoute,
        request: Request<Body>,
        remote: Option<IpAddr>,
    ) -> Result<Response<Body>, GatewayError> {
        let path = request.uri().path();
        let matched = route.match_len(path).unwrap_or(0);
        let path_base = path[..matched].to_string();

        let ctx = ProxyRequestContext::capture(request, &path_base, remote)
            .await?
            .within(&self.stopping);
        let _cancel_on_drop = ctx.cancellation().clone().drop_guard();
        let identity = route.identity(&ctx)?;

        tracing::debug!(
            service = %identity,
            method = %ctx.method(),
            path = %ctx.path(),
            "Forwarding request"
        );

        let response = self
            .orchestrator
            .invoke(
                &identity,
                route.listener(),
                route.retry_options(),
                ctx.cancellation(),
                |address| ctx.outbound_request(address, &self.node),
            )
            .await?;
        Ok(response)
    }
}

/// Compile every configured route, in order.
pub fn routes_from_config(config: &crate::config::ProxyConfig) -> Result<Vec<GatewayRoute>, RouteError> {
    config
        .routes
        .iter()
        .map(|route| GatewayRoute::from_config(route, &config.retries))
        .collect()
}
