//! Config-backed resolver.
//!
//! # Responsibilities
//! - Group configured endpoints by service name
//! - Match endpoints against the identity's partition key
//! - Bump the resolution epoch whenever the table is replaced (hot reload)

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::config::{PartitionConfig, ServiceConfig};
use crate::resolver::{
    EndpointResolver, PartitionKey, ResolutionToken, ResolveError, ResolvedEndpoint,
    ResolvedPartition, ServiceIdentity,
};

#[derive(Debug, Clone)]
struct TableEndpoint {
    endpoint: ResolvedEndpoint,
    partition: Option<PartitionConfig>,
}

impl TableEndpoint {
    fn serves(&self, key: &PartitionKey) -> bool {
        match (&self.partition, key) {
            (None, PartitionKey::None) => true,
            (Some(PartitionConfig::Named { name }), PartitionKey::Named(wanted)) => name == wanted,
            (Some(PartitionConfig::Int64Range { low, high }), PartitionKey::Int64(wanted)) => {
                (*low..=*high).contains(wanted)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    epoch: u64,
    services: HashMap<String, Vec<TableEndpoint>>,
}

/// Resolver serving the `[[services]]` section of the configuration.
#[derive(Debug)]
pub struct StaticResolver {
    table: ArcSwap<Table>,
    epochs: AtomicU64,
}

impl StaticResolver {
    /// Create a resolver from configuration.
    pub fn new(services: &[ServiceConfig]) -> Self {
        let resolver = Self {
            table: ArcSwap::from_pointee(Table::default()),
            epochs: AtomicU64::new(0),
        };
        resolver.replace(services);
        resolver
    }

    /// Replace the whole service table. Addresses handed out before become stale.
    pub fn replace(&self, services: &[ServiceConfig]) {
        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;

        let mut grouped: HashMap<String, Vec<TableEndpoint>> = HashMap::new();
        for service in services {
            let entry = grouped.entry(service.name.clone()).or_default();
            for endpoint in &service.endpoints {
                entry.push(TableEndpoint {
                    endpoint: ResolvedEndpoint {
                        address: endpoint.address.clone(),
                        listener: endpoint.listener.clone(),
                    },
                    partition: endpoint.partition.clone(),
                });
            }
        }

        tracing::info!(epoch, services = grouped.len(), "Resolver table loaded");
        self.table.store(Arc::new(Table {
            epoch,
            services: grouped,
        }));
    }

    /// Current resolution epoch.
    pub fn current_token(&self) -> ResolutionToken {
        ResolutionToken::new(self.table.load().epoch)
    }
}

#[async_trait]
impl EndpointResolver for StaticResolver {
    async fn resolve(
        &self,
        identity: &ServiceIdentity,
        prior: Option<&ResolutionToken>,
    ) -> Result<ResolvedPartition, ResolveError> {
        let table = self.table.load();
        let token = ResolutionToken::new(table.epoch);

        if prior == Some(&token) {
            // Nothing newer to offer; the caller gets the same epoch again.
            tracing::debug!(service = %identity, "Re-resolution found no newer table");
        }

        let endpoints = table
            .services
            .get(identity.service_name())
            .ok_or_else(|| ResolveError::ServiceNotFound(identity.service_name().to_string()))?;

        let matching: Vec<ResolvedEndpoint> = endpoints
            .iter()
            .filter(|e| e.serves(identity.partition()))
            .map(|e| e.endpoint.clone())
            .collect();

        if matching.is_empty() {
            return Err(ResolveError::PartitionNotFound {
                service: identity.service_name().to_string(),
                key: identity.partition().clone(),
            });
        }

        Ok(ResolvedPartition {
            token,
            endpoints: matching,
        })
    }
}
