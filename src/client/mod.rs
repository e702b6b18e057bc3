//! Backend communication subsystem.
//!
//! # Data Flow
//! ```text
//! ResolvedEndpoint.address
//!     → address.rs (normalize: wildcard host, trailing '/')
//!     → cache.rs (get_or_create / validate / invalidate)
//!     → communication.rs (hyper-util pool bound to that address)
//!     → send(request) → Response | TransportError (error.rs)
//! ```
//!
//! # Design Decisions
//! - One client per address; a client is never shared across addresses
//! - Validity is address equality, not a liveness check
//! - Factories are injected, so tests can count constructions

pub mod address;
pub mod cache;
pub mod communication;
pub mod error;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

pub use address::{AddressError, EndpointAddress};
pub use cache::{CachedClient, ClientCache};
pub use communication::{HttpClientFactory, HttpCommunicationClient};
pub use error::{ClientError, TransportError};

/// A transport client bound to exactly one endpoint address.
#[async_trait]
pub trait CommunicationClient: Send + Sync + 'static {
    /// Address this client dials.
    fn address(&self) -> &EndpointAddress;

    /// Execute one request. The request URI must be absolute.
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError>;
}

/// Creates, validates and releases communication clients.
pub trait ClientFactory: Send + Sync + 'static {
    type Client: CommunicationClient;

    /// Build a client for `address`. Must not perform network I/O.
    fn create(&self, address: &EndpointAddress) -> Result<Self::Client, ClientError>;

    /// True if `client` may serve requests for `address`.
    fn validate(&self, client: &Self::Client, address: &EndpointAddress) -> bool {
        client.address() == address
    }

    /// Release whatever `client` holds. Called once per client.
    fn invalidate(&self, client: &Self::Client);
}
