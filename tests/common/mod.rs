//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use service_gateway::config::{
    EndpointConfig, PartitionConfig, ProxyConfig, RetryConfig, RouteConfig, ServiceConfig,
};
use service_gateway::{HttpServer, Shutdown};

/// What a mock backend saw.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A running mock backend.
#[derive(Clone)]
pub struct Backend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Backend {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a backend answering every request with `status` and `body`.
pub async fn start_mock_backend(status: u16, body: &'static str) -> Backend {
    start_programmable_backend(move |_| async move { reply(status, body) }).await
}

/// Start a programmable mock backend; `f` receives the zero-based call index.
pub async fn start_programmable_backend<F, Fut>(f: F) -> Backend
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let backend = Backend {
        addr,
        calls: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let f = Arc::new(f);
    let state = backend.clone();
    let app = Router::new().fallback(move |request: Request<Body>| {
        let f = f.clone();
        let state = state.clone();
        async move {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            state.requests.lock().unwrap().push(Recorded {
                method: parts.method.to_string(),
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body,
            });
            let call = state.calls.fetch_add(1, Ordering::SeqCst);
            f(call).await
        }
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    backend
}

pub fn reply(status: u16, body: impl Into<Body>) -> Response<Body> {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .body(body.into())
        .unwrap()
}

/// A port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn endpoint(address: impl Into<String>) -> EndpointConfig {
    EndpointConfig {
        address: address.into(),
        listener: None,
        partition: None,
    }
}

pub fn named_endpoint(address: impl Into<String>, partition: &str) -> EndpointConfig {
    EndpointConfig {
        partition: Some(PartitionConfig::Named {
            name: partition.to_string(),
        }),
        ..endpoint(address)
    }
}

pub fn service(name: &str, endpoints: Vec<EndpointConfig>) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        endpoints,
    }
}

/// Configuration with fast retries and one route per `(prefix, service)`.
pub fn gateway_config(routes: &[(&str, &str)], services: Vec<ServiceConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.gateway.node_name = Some("gw-test".to_string());
    config.retries = RetryConfig {
        operation_timeout_ms: 2_000,
        max_retry_count: 3,
        max_retry_backoff_ms: 20,
        retry_status_errors: Some(true),
        do_not_retry: Vec::new(),
    };
    config.routes = routes
        .iter()
        .map(|(prefix, service)| RouteConfig::new(*prefix, *service))
        .collect();
    config.services = services;
    config
}

/// A running gateway.
pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<ProxyConfig>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: ProxyConfig) -> Gateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    Gateway {
        addr,
        shutdown,
        updates,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
