//! Topology-aware HTTP service gateway library.

// Core subsystems
pub mod client;
pub mod config;
pub mod gateway;
pub mod http;
pub mod proxy;
pub mod resolver;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use gateway::{GatewayDispatcher, GatewayRoute};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
