//! Endpoint resolution subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceIdentity (name + partition key)
//!     → EndpointResolver::resolve (optionally excluding a stale token)
//!     → ResolvedPartition { token, endpoints }
//!     → selector.rs picks one endpoint for the route's listener
//!     → client cache dials EndpointAddress::parse(endpoint.address)
//! ```
//!
//! # Design Decisions
//! - Resolution is a trait; the gateway never hard-codes addresses
//! - Tokens are opaque and compared for equality only
//! - Resolver failures are fatal for the request (never retried in a loop)

pub mod selector;
pub mod static_resolver;

use std::fmt;

use async_trait::async_trait;

pub use selector::{EndpointSelector, RoundRobin};
pub use static_resolver::StaticResolver;

/// Partition key part of a service identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PartitionKey {
    /// Singleton (unpartitioned) service.
    #[default]
    None,
    /// Named partition.
    Named(String),
    /// Uniform Int64 partition.
    Int64(i64),
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::None => write!(f, "singleton"),
            PartitionKey::Named(name) => write!(f, "named:{name}"),
            PartitionKey::Int64(key) => write!(f, "int64:{key}"),
        }
    }
}

/// Logical identity of a backend: stable while physical addresses move.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    service_name: String,
    partition: PartitionKey,
}

impl ServiceIdentity {
    pub fn new(service_name: impl Into<String>, partition: PartitionKey) -> Self {
        Self {
            service_name: service_name.into(),
            partition,
        }
    }

    pub fn singleton(service_name: impl Into<String>) -> Self {
        Self::new(service_name, PartitionKey::None)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.service_name, self.partition)
    }
}

/// Opaque marker of the resolution epoch that produced an address set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolutionToken(u64);

impl ResolutionToken {
    pub fn new(epoch: u64) -> Self {
        Self(epoch)
    }
}

/// An endpoint exactly as published by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// Published address; may contain a wildcard host.
    pub address: String,
    /// Listener name when the replica exposes several.
    pub listener: Option<String>,
}

impl ResolvedEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl Into<String>) -> Self {
        self.listener = Some(listener.into());
        self
    }
}

/// Result of one resolution.
#[derive(Debug, Clone)]
pub struct ResolvedPartition {
    pub token: ResolutionToken,
    pub endpoints: Vec<ResolvedEndpoint>,
}

/// Resolution failures. All of them are fatal for the current request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("service '{0}' is not known to the resolver")]
    ServiceNotFound(String),

    #[error("service '{service}' has no partition for key {key}")]
    PartitionNotFound { service: String, key: PartitionKey },

    #[error("resolver unavailable: {0}")]
    Unavailable(String),
}

/// Maps a logical service identity to its current endpoints.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Resolve `identity`. When `prior` is given, the caller considers the
    /// addresses of that token stale and asks for a newer resolution if one exists.
    async fn resolve(
        &self,
        identity: &ServiceIdentity,
        prior: Option<&ResolutionToken>,
    ) -> Result<ResolvedPartition, ResolveError>;
}
