//! Per-address client cache.
//!
//! # Responsibilities
//! - Hand out one live client per resolved address
//! - Converge concurrent get-or-create calls on a single client
//! - Never return a client that was invalidated or fails validation
//!
//! # Design Decisions
//! - Creation happens inside the map's entry lock; factories must not do I/O
//! - Network I/O always happens outside the cache, on a cloned `Arc`

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::client::{ClientError, ClientFactory, CommunicationClient, EndpointAddress};
use crate::observability::metrics;

/// A client handed out by the cache.
#[derive(Debug)]
pub struct CachedClient<C> {
    client: C,
    invalidated: AtomicBool,
}

impl<C: CommunicationClient> CachedClient<C> {
    fn new(client: C) -> Self {
        Self {
            client,
            invalidated: AtomicBool::new(false),
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }
}

impl<C> Deref for CachedClient<C> {
    type Target = C;
    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Cache of communication clients keyed by normalized address.
pub struct ClientCache<F: ClientFactory> {
    factory: F,
    clients: DashMap<EndpointAddress, Arc<CachedClient<F::Client>>>,
}

impl<F: ClientFactory> ClientCache<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            clients: DashMap::new(),
        }
    }

    /// Return the cached client for `address`, creating it if needed.
    pub fn get_or_create(
        &self,
        address: &EndpointAddress,
    ) -> Result<Arc<CachedClient<F::Client>>, ClientError> {
        if let Some(existing) = self.clients.get(address).map(|e| e.value().clone()) {
            if self.validate(&existing, address) {
                return Ok(existing);
            }
        }

        match self.clients.entry(address.clone()) {
            Entry::Occupied(mut entry) => {
                if self.validate(entry.get(), address) {
                    return Ok(entry.get().clone());
                }
                let fresh = Arc::new(self.create(address)?);
                let stale = entry.insert(fresh.clone());
                self.retire(&stale);
                Ok(fresh)
            }
            Entry::Vacant(entry) => {
                let fresh = Arc::new(self.create(address)?);
                entry.insert(fresh.clone());
                Ok(fresh)
            }
        }
    }

    /// True if `client` may still be used for `address`.
    pub fn validate(&self, client: &CachedClient<F::Client>, address: &EndpointAddress) -> bool {
        let valid = !client.is_invalidated() && self.factory.validate(client, address);
        tracing::debug!(
            client_endpoint = %client.address(),
            passed_endpoint = %address,
            valid,
            "Validating client"
        );
        valid
    }

    /// Drop `client` from the cache and release its resources.
    ///
    /// A newer client for the same address, created by someone else in the
    /// meantime, is left untouched.
    pub fn invalidate(&self, client: &Arc<CachedClient<F::Client>>) {
        self.clients
            .remove_if(client.address(), |_, cached| Arc::ptr_eq(cached, client));
        self.retire(client);
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn create(&self, address: &EndpointAddress) -> Result<CachedClient<F::Client>, ClientError> {
        tracing::info!(endpoint = %address, "Creating client");
        let client = self.factory.create(address)?;
        metrics::record_client_created();
        Ok(CachedClient::new(client))
    }

    fn retire(&self, client: &CachedClient<F::Client>) {
        if client.invalidated.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(endpoint = %client.address(), "Aborting client");
        self.factory.invalidate(client);
        metrics::record_client_invalidated();
    }
}
