//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that published endpoint addresses are dialable
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject routes that configure two partition-key strategies
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::client::EndpointAddress;
use crate::config::schema::{PartitionConfig, ProxyConfig, RetryConfig, RouteConfig};

/// A semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("retries.retry_status_errors must be set explicitly")]
    MissingStatusRetryPolicy,

    #[error("{scope}: operation_timeout_ms must be greater than zero")]
    ZeroOperationTimeout { scope: String },

    #[error("route '{0}': path_match must start with '/'")]
    PathMatch(String),

    #[error("route '{0}': only one partition key resolver may be set")]
    ConflictingPartitionRules(String),

    #[error("route '{0}': duplicate path_match")]
    DuplicateRoute(String),

    #[error("route '{route}': service_name must not be empty")]
    EmptyServiceName { route: String },

    #[error("service '{service}': endpoint '{address}' is not dialable ({reason})")]
    EndpointAddress {
        service: String,
        address: String,
        reason: String,
    },

    #[error("service '{service}': partition range {low}..={high} is empty")]
    PartitionRange { service: String, low: i64, high: i64 },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.retries.retry_status_errors.is_none() {
        errors.push(ValidationError::MissingStatusRetryPolicy);
    }
    validate_retries("retries", &config.retries, &mut errors);

    let mut seen = HashSet::new();
    for route in &config.routes {
        validate_route(route, &mut errors);
        if !seen.insert(route.path_match.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicateRoute(route.path_match.clone()));
        }
    }

    for service in &config.services {
        for endpoint in &service.endpoints {
            if let Err(e) = EndpointAddress::parse(&endpoint.address) {
                errors.push(ValidationError::EndpointAddress {
                    service: service.name.clone(),
                    address: endpoint.address.clone(),
                    reason: e.to_string(),
                });
            }
            if let Some(PartitionConfig::Int64Range { low, high }) = endpoint.partition {
                if low > high {
                    errors.push(ValidationError::PartitionRange {
                        service: service.name.clone(),
                        low,
                        high,
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Route-level checks shared with programmatic route construction.
pub fn validate_route(route: &RouteConfig, errors: &mut Vec<ValidationError>) {
    if !route.path_match.starts_with('/') {
        errors.push(ValidationError::PathMatch(route.path_match.clone()));
    }
    if route.service_name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName {
            route: route.path_match.clone(),
        });
    }
    if route.named_partition.is_some() && route.int64_partition.is_some() {
        errors.push(ValidationError::ConflictingPartitionRules(
            route.path_match.clone(),
        ));
    }
    if let Some(retries) = &route.retries {
        if retries.operation_timeout_ms == Some(0) {
            errors.push(ValidationError::ZeroOperationTimeout {
                scope: format!("route '{}'", route.path_match),
            });
        }
    }
}

fn validate_retries(scope: &str, retries: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if retries.operation_timeout_ms == 0 {
        errors.push(ValidationError::ZeroOperationTimeout {
            scope: scope.to_string(),
        });
    }
}
