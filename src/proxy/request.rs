//! Inbound request snapshot and outbound request construction.

use std::net::IpAddr;

use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::FromRequest;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use axum::http::{Method, Request};
use tokio_util::sync::CancellationToken;

use crate::client::{AddressError, EndpointAddress};
use crate::proxy::NodeIdentity;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_PATH_BASE: HeaderName = HeaderName::from_static("x-forwarded-pathbase");

/// Inbound headers that are set by the transport or must not reach the backend.
const EXCLUDED_REQUEST_HEADERS: [&str; 11] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "content-length",
    "host",
    "date",
    "expect",
    "range",
    "if-modified-since",
    "if-range",
    "transfer-encoding",
];

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("invalid forwarding header: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error(transparent)]
    Http(#[from] axum::http::Error),
}

/// Everything needed to replay an inbound request against any endpoint.
///
/// The body is read once, when the context is captured.
#[derive(Debug)]
pub struct ProxyRequestContext {
    method: Method,
    path_base: String,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    remote: Option<IpAddr>,
    host: Option<String>,
    scheme: String,
    body: Bytes,
    cancel: CancellationToken,
}

impl ProxyRequestContext {
    /// Snapshot `request`, which matched the route mounted at `path_base`.
    ///
    /// `path_base` has no trailing slash; the root route uses `""`.
    pub async fn capture(
        request: Request<Body>,
        path_base: &str,
        remote: Option<IpAddr>,
    ) -> Result<Self, BytesRejection> {
        let uri = request.uri();
        let path = uri
            .path()
            .strip_prefix(path_base)
            .unwrap_or(uri.path())
            .to_string();
        let query = uri.query().map(str::to_string);
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()));
        let scheme = uri.scheme_str().unwrap_or("http").to_string();
        let method = request.method().clone();
        let headers = request.headers().clone();

        let body = Bytes::from_request(request, &()).await?;

        Ok(Self {
            method,
            path_base: path_base.to_string(),
            path,
            query,
            headers,
            remote,
            host,
            scheme,
            body,
            cancel: CancellationToken::new(),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path below the route prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_base(&self) -> &str {
        &self.path_base
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Tie this request to `parent`: cancelling the parent cancels the call.
    pub fn within(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Cancelled when the inbound request goes away or its parent is cancelled.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Build the request for one attempt against `address`.
    pub fn outbound_request(
        &self,
        address: &EndpointAddress,
        node: &NodeIdentity,
    ) -> Result<Request<Body>, TranslateError> {
        let target = match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        };
        let uri = address.join(&target)?;

        let mut headers = HeaderMap::with_capacity(self.headers.len() + 6);
        for (name, value) in &self.headers {
            if !EXCLUDED_REQUEST_HEADERS.contains(&name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }
        self.add_forwarding_headers(&mut headers, node)?;

        let body = if self.body.is_empty() {
            Body::empty()
        } else {
            Body::from(self.body.clone())
        };

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .body(body)?;
        *request.headers_mut() = headers;
        Ok(request)
    }

    fn add_forwarding_headers(
        &self,
        headers: &mut HeaderMap,
        node: &NodeIdentity,
    ) -> Result<(), InvalidHeaderValue> {
        headers.append(header::VIA, node.via().clone());

        let mut forwarded = vec![format!("by=_{}", node.name())];
        match self.remote {
            Some(IpAddr::V6(ip)) => forwarded.push(format!("for=\"[{ip}]\"")),
            Some(IpAddr::V4(ip)) => forwarded.push(format!("for={ip}")),
            None => {}
        }
        if let Some(host) = &self.host {
            forwarded.push(format!("host={host}"));
        }
        forwarded.push(format!("proto={}", self.scheme));
        headers.append(header::FORWARDED, HeaderValue::from_str(&forwarded.join(";"))?);

        // Keep the values of the first proxy in the chain.
        if !headers.contains_key(X_FORWARDED_HOST) {
            if let Some(host) = &self.host {
                headers.insert(X_FORWARDED_HOST, HeaderValue::from_str(host)?);
            }
        }
        if !headers.contains_key(X_FORWARDED_PROTO) {
            headers.insert(X_FORWARDED_PROTO, HeaderValue::from_str(&self.scheme)?);
        }

        if let Some(remote) = self.remote {
            let existing: Vec<&str> = self
                .headers
                .get_all(X_FORWARDED_FOR)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            let chain = if existing.is_empty() {
                remote.to_string()
            } else {
                format!("{},{}", existing.join(","), remote)
            };
            headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(&chain)?);
        }

        if !self.path_base.is_empty() && !headers.contains_key(X_FORWARDED_PATH_BASE) {
            headers.insert(X_FORWARDED_PATH_BASE, HeaderValue::from_str(&self.path_base)?);
        }
        Ok(())
    }
}
