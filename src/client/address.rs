//! Normalized endpoint addresses.
//!
//! Backends publish addresses the way they listen, which is not always the way
//! they can be dialed. `EndpointAddress` is the dialable, comparable form:
//! - scheme must be `http` or `https`
//! - wildcard hosts (`+`, `*`, `0.0.0.0`, `[::]`) become `localhost`
//! - the path always ends with `/` so relative paths join below it

use std::fmt;

use axum::http::Uri;
use url::{Host, Url};

/// Reasons a published address cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("the endpoint address is empty")]
    Empty,

    #[error("unsupported scheme '{0}', only http and https endpoints can be dialed")]
    UnsupportedScheme(String),

    #[error("the endpoint address '{address}' is not valid: {reason}")]
    Invalid { address: String, reason: String },
}

/// A dialable endpoint address with a trailing separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress(Url);

impl EndpointAddress {
    /// Normalize a published address.
    pub fn parse(published: &str) -> Result<Self, AddressError> {
        let published = published.trim();
        if published.is_empty() {
            return Err(AddressError::Empty);
        }

        let invalid = |reason: String| AddressError::Invalid {
            address: published.to_string(),
            reason,
        };

        let (scheme, rest) = published
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme".to_string()))?;
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(AddressError::UnsupportedScheme(scheme));
        }

        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        let authority = rewrite_wildcard_host(authority);

        let mut url = Url::parse(&format!("{scheme}://{authority}{path}"))
            .map_err(|e| invalid(e.to_string()))?;

        let unspecified = match url.host() {
            Some(Host::Ipv4(ip)) => ip.is_unspecified(),
            Some(Host::Ipv6(ip)) => ip.is_unspecified(),
            Some(Host::Domain(_)) => false,
            None => return Err(invalid("missing host".to_string())),
        };
        if unspecified {
            url.set_host(Some("localhost"))
                .map_err(|e| invalid(e.to_string()))?;
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self(url))
    }

    /// True for endpoints reached over TLS.
    pub fn is_https(&self) -> bool {
        self.0.scheme() == "https"
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Absolute URI for `path_and_query` below this address.
    pub fn join(&self, path_and_query: &str) -> Result<Uri, AddressError> {
        let target = format!("{}{}", self.0.as_str(), path_and_query.trim_start_matches('/'));
        target.parse::<Uri>().map_err(|e| AddressError::Invalid {
            address: target.clone(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// `+` and `*` mean "all interfaces" and cannot be dialed literally.
fn rewrite_wildcard_host(authority: &str) -> String {
    for wildcard in ["+", "*"] {
        if authority == wildcard {
            return "localhost".to_string();
        }
        if let Some(port) = authority
            .strip_prefix(wildcard)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            return format!("localhost:{port}");
        }
    }
    authority.to_string()
}
