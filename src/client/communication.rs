//! HTTP communication client backed by a hyper-util connection pool.
//!
//! Both `http` and `https` endpoints are dialed through the same connector;
//! TLS to the backend uses rustls with the webpki root store.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};

use crate::client::{ClientError, ClientFactory, CommunicationClient, EndpointAddress, TransportError};
use crate::config::TimeoutConfig;

/// Client bound to a single endpoint address.
///
/// Owns its own connection pool. Redirects are never followed; a 3xx from the
/// backend is relayed to the caller unchanged.
#[derive(Debug)]
pub struct HttpCommunicationClient {
    address: EndpointAddress,
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

#[async_trait]
impl CommunicationClient for HttpCommunicationClient {
    fn address(&self) -> &EndpointAddress {
        &self.address
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let response = self.client.request(request).await?;
        Ok(response.map(Body::new))
    }
}

/// Creates [`HttpCommunicationClient`]s. Creation never touches the network.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
            idle_timeout: Duration::from_secs(timeouts.idle_secs),
        }
    }
}

impl ClientFactory for HttpClientFactory {
    type Client = HttpCommunicationClient;

    fn create(&self, address: &EndpointAddress) -> Result<Self::Client, ClientError> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(self.connect_timeout));
        connector.set_nodelay(true);
        connector.enforce_http(false);

        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| ClientError::Create {
                address: address.to_string(),
                reason: format!("tls setup failed: {e}"),
            })?
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.idle_timeout)
            .pool_timer(TokioTimer::new())
            .build(connector);

        Ok(HttpCommunicationClient {
            address: address.clone(),
            client,
        })
    }

    fn invalidate(&self, client: &Self::Client) {
        // Pooled connections close once the last handle to the client is dropped.
        tracing::debug!(address = %client.address, "Releasing connection pool");
    }
}
