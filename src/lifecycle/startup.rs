//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the long-lived pieces (resolver, client cache, orchestrator)
//! - Compile a configuration into a gateway dispatcher, at startup and on reload
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The client cache and resolver outlive reloads; only the route table and
//!   the resolver's endpoint table are replaced

use std::sync::Arc;

use axum::http::header::InvalidHeaderValue;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientCache, HttpClientFactory};
use crate::config::ProxyConfig;
use crate::gateway::{routes_from_config, GatewayDispatcher, RouteError};
use crate::proxy::NodeIdentity;
use crate::resilience::{FailureHandlers, RetryOrchestrator};
use crate::resolver::StaticResolver;

pub type HttpDispatcher = GatewayDispatcher<HttpClientFactory>;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("node name cannot be used in forwarding headers: {0}")]
    NodeName(#[from] InvalidHeaderValue),
}

/// Components shared by every dispatcher generation.
#[derive(Clone)]
pub struct GatewayCore {
    resolver: Arc<StaticResolver>,
    orchestrator: Arc<RetryOrchestrator<HttpClientFactory>>,
    stopping: CancellationToken,
}

impl GatewayCore {
    pub fn new(config: &ProxyConfig) -> Self {
        Self::with_failure_handlers(config, FailureHandlers::new())
    }

    /// Like [`GatewayCore::new`], consulting `handlers` before the built-in
    /// failure classification.
    pub fn with_failure_handlers(config: &ProxyConfig, handlers: FailureHandlers) -> Self {
        let resolver = Arc::new(StaticResolver::new(&config.services));
        let cache = Arc::new(ClientCache::new(HttpClientFactory::new(&config.timeouts)));
        let orchestrator = Arc::new(
            RetryOrchestrator::new(resolver.clone(), cache).with_failure_handlers(handlers),
        );
        Self {
            resolver,
            orchestrator,
            stopping: CancellationToken::new(),
        }
    }

    /// Cancel every proxied call still in flight. They answer 503.
    pub fn cancel_in_flight(&self) {
        self.stopping.cancel();
    }

    pub fn resolver(&self) -> &Arc<StaticResolver> {
        &self.resolver
    }

    pub fn orchestrator(&self) -> &Arc<RetryOrchestrator<HttpClientFactory>> {
        &self.orchestrator
    }

    /// Compile `config` into a dispatcher over the shared components.
    pub fn dispatcher(&self, config: &ProxyConfig) -> Result<HttpDispatcher, StartupError> {
        let routes = routes_from_config(config)?;
        let node = NodeIdentity::new(config.gateway.node_name())?;

        tracing::info!(
            routes = routes.len(),
            services = config.services.len(),
            node = %node.name(),
            "Gateway table compiled"
        );
        Ok(GatewayDispatcher::new(routes, self.orchestrator.clone(), node)
            .stop_with(self.stopping.clone()))
    }

    /// Apply a reloaded configuration to the shared components.
    pub fn reload(&self, config: &ProxyConfig) -> Result<HttpDispatcher, StartupError> {
        let dispatcher = self.dispatcher(config)?;
        self.resolver.replace(&config.services);
        Ok(dispatcher)
    }
}
