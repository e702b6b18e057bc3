//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all gateway handler
//! - Wire up middleware (tracing, body limits, request ID)
//! - Swap the gateway dispatcher when a new configuration arrives
//! - Serve until the shutdown signal, then drain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::{GatewayCore, HttpDispatcher, StartupError};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ArcSwap<HttpDispatcher>>,
}

/// HTTP server for the service gateway.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    core: GatewayCore,
    dispatcher: Arc<ArcSwap<HttpDispatcher>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        let core = GatewayCore::new(&config);
        let dispatcher = Arc::new(ArcSwap::from_pointee(core.dispatcher(&config)?));

        let state = AppState {
            dispatcher: dispatcher.clone(),
        };
        let router = Self::build_router(&config, state);

        Ok(Self {
            router,
            config,
            core,
            dispatcher,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let max_body = config.listener.max_body_size;
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(max_body))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(RequestBodyLimitLayer::new(max_body)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configurations received on `config_updates` replace the route table
    /// and the resolver's endpoints. Returns once `shutdown` fires and in-flight
    /// requests have drained.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            "HTTP server starting"
        );

        let core = self.core.clone();
        let dispatcher = self.dispatcher.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match core.reload(&config) {
                    Ok(next) => {
                        dispatcher.store(Arc::new(next));
                        tracing::info!("Configuration reloaded");
                    }
                    Err(e) => tracing::error!(
                        error = %e,
                        "Rejected reloaded configuration, keeping current one"
                    ),
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let drain_timeout = Duration::from_secs(self.config.listener.drain_timeout_secs);
        let core = self.core.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!(
                    drain_timeout_secs = drain_timeout.as_secs(),
                    "Shutdown signal received, draining"
                );
                tokio::spawn(async move {
                    tokio::time::sleep(drain_timeout).await;
                    tracing::warn!("Drain timeout elapsed, cancelling calls in flight");
                    core.cancel_in_flight();
                });
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn core(&self) -> &GatewayCore {
        &self.core
    }
}

/// Matches the request against the gateway table and forwards it.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let dispatcher = state.dispatcher.load_full();

    let Some(route) = dispatcher.find(request.uri().path()) else {
        return no_route(request.method(), request.uri().path(), start);
    };

    dispatcher.forward(route, request, Some(remote.ip())).await
}

/// Answer a request no route matched, received at `start`.
fn no_route(method: &Method, path: &str, start: Instant) -> Response {
    tracing::warn!(method = %method, path = %path, "No route matched");
    metrics::record_request("none", StatusCode::NOT_FOUND.as_u16(), start);
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
