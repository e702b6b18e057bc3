//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::resilience::FailureKind;

/// Root configuration for the service gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Gateway identity used in forwarding headers.
    pub gateway: GatewayConfig,

    /// Transport timeouts for backend connections.
    pub timeouts: TimeoutConfig,

    /// Global retry tuning. Routes may override it.
    pub retries: RetryConfig,

    /// Ordered route table; the first matching prefix wins.
    pub routes: Vec<RouteConfig>,

    /// Logical services known to the built-in resolver.
    pub services: Vec<ServiceConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest inbound body the gateway buffers for replay, in bytes.
    pub max_body_size: usize,

    /// Time granted to in-flight calls after shutdown starts, in seconds.
    /// Calls still retrying afterwards are cancelled and answer 503.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 4 * 1024 * 1024,
            drain_timeout_secs: 30,
        }
    }
}

/// Gateway identity settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Node identifier for `Via` and `Forwarded: by=`. Falls back to `$HOSTNAME`.
    pub node_name: Option<String>,
}

impl GatewayConfig {
    /// Resolve the node identifier, consulting the environment when unset.
    pub fn node_name(&self) -> String {
        self.node_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "service-gateway".to_string())
    }
}

/// Timeout configuration for backend connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            idle_secs: 90,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum time for one attempt, reset for every retry.
    pub operation_timeout_ms: u64,

    /// Number of times a failed call is retried against the same endpoint.
    pub max_retry_count: u32,

    /// Upper bound for the jittered delay between two retries.
    pub max_retry_backoff_ms: u64,

    /// Whether 5xx responses from a backend are retried.
    ///
    /// Has no default: the global section must set it explicitly. A route
    /// override that leaves it unset inherits the global value.
    pub retry_status_errors: Option<bool>,

    /// Failure kinds that are never retried.
    pub do_not_retry: Vec<FailureKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 12_000,
            max_retry_count: 9,
            max_retry_backoff_ms: 3_000,
            retry_status_errors: None,
            do_not_retry: Vec::new(),
        }
    }
}

/// Per-route retry tuning layered over the global `[retries]` section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryOverride {
    pub operation_timeout_ms: Option<u64>,
    pub max_retry_count: Option<u32>,
    pub max_retry_backoff_ms: Option<u64>,
    pub retry_status_errors: Option<bool>,
    /// Replaces the global list when set.
    pub do_not_retry: Option<Vec<FailureKind>>,
}

impl RetryOverride {
    /// Effective settings: fields set here win, the rest come from `global`.
    pub fn merged_over(&self, global: &RetryConfig) -> RetryConfig {
        RetryConfig {
            operation_timeout_ms: self.operation_timeout_ms.unwrap_or(global.operation_timeout_ms),
            max_retry_count: self.max_retry_count.unwrap_or(global.max_retry_count),
            max_retry_backoff_ms: self.max_retry_backoff_ms.unwrap_or(global.max_retry_backoff_ms),
            retry_status_errors: self.retry_status_errors.or(global.retry_status_errors),
            do_not_retry: self
                .do_not_retry
                .clone()
                .unwrap_or_else(|| global.do_not_retry.clone()),
        }
    }
}

/// One gateway entry: a path prefix bound to a logical service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path on the gateway that forwards to the service (e.g. "/orders").
    pub path_match: String,

    /// Logical service name (e.g. "fabric:/Shop/Orders").
    pub service_name: String,

    /// Listener of the replica the client should connect to.
    #[serde(default)]
    pub listener_name: Option<String>,

    /// Derive a named partition key from the request.
    #[serde(default)]
    pub named_partition: Option<PartitionSource>,

    /// Derive an Int64 partition key from the request.
    #[serde(default)]
    pub int64_partition: Option<PartitionSource>,

    /// Route-specific retry settings. Unset fields keep the global value.
    #[serde(default)]
    pub retries: Option<RetryOverride>,
}

impl RouteConfig {
    /// Create a route without partitioning or overrides.
    pub fn new(path_match: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            path_match: path_match.into(),
            service_name: service_name.into(),
            listener_name: None,
            named_partition: None,
            int64_partition: None,
            retries: None,
        }
    }
}

/// Where a partition key is read from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSource {
    /// Value of a request header.
    Header(String),
    /// Value of a query string parameter.
    Query(String),
    /// Zero-based segment of the path below the route prefix.
    PathSegment(usize),
    /// Fixed key.
    Constant(String),
}

/// A logical service served by the built-in resolver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Logical service name.
    pub name: String,

    /// Published endpoints of the service's replicas/instances.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// A published endpoint of a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Address as published by the backend (e.g. "http://+:8080/").
    pub address: String,

    /// Listener name, when the replica exposes several.
    #[serde(default)]
    pub listener: Option<String>,

    /// Partition served by this endpoint. Unset for singleton services.
    #[serde(default)]
    pub partition: Option<PartitionConfig>,
}

/// Partition ownership of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionConfig {
    /// Named partition.
    Named { name: String },
    /// Inclusive Int64 key range.
    Int64Range { low: i64, high: i64 },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let doc = r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [retries]
            retry_status_errors = false
            do_not_retry = ["protocol_violation"]

            [[routes]]
            path_match = "/orders"
            service_name = "fabric:/Shop/Orders"
            named_partition = { header = "x-tenant" }

            [[services]]
            name = "fabric:/Shop/Orders"

            [[services.endpoints]]
            address = "http://+:8081/"
            partition = { kind = "named", name = "eu" }
        "#;

        let config: ProxyConfig = toml::from_str(doc).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.retries.retry_status_errors, Some(false));
        assert_eq!(config.retries.max_retry_count, 9);
        assert_eq!(config.retries.do_not_retry, vec![FailureKind::ProtocolViolation]);
        assert_eq!(
            config.routes[0].named_partition,
            Some(PartitionSource::Header("x-tenant".into()))
        );
        assert_eq!(
            config.services[0].endpoints[0].partition,
            Some(PartitionConfig::Named { name: "eu".into() })
        );
    }

    #[test]
    fn route_override_fills_gaps_from_global_section() {
        let doc = r#"
            [retries]
            retry_status_errors = true
            max_retry_count = 2
            max_retry_backoff_ms = 50

            [[routes]]
            path_match = "/orders"
            service_name = "fabric:/Shop/Orders"

            [routes.retries]
            do_not_retry = ["timeout"]
        "#;

        let config: ProxyConfig = toml::from_str(doc).unwrap();
        let effective = config.routes[0]
            .retries
            .as_ref()
            .unwrap()
            .merged_over(&config.retries);
        assert_eq!(effective.max_retry_count, 2);
        assert_eq!(effective.max_retry_backoff_ms, 50);
        assert_eq!(effective.retry_status_errors, Some(true));
        assert_eq!(effective.do_not_retry, vec![FailureKind::Timeout]);
    }

    #[test]
    fn explicit_node_name_wins() {
        let config = GatewayConfig {
            node_name: Some("edge-1".into()),
        };
        assert_eq!(config.node_name(), "edge-1");
    }
}
