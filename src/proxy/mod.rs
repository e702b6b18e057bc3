//! Request/response translation between the inbound and backend hops.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → request.rs (snapshot once: method, path below prefix, headers, body)
//!     → request.rs (per attempt: outbound request + forwarding headers)
//! Backend response
//!     → response.rs (copy status/headers, stream body, append Via)
//! ```
//!
//! # Design Decisions
//! - The body is buffered once so every retry sends identical bytes
//! - `X-Forwarded-Host`, `X-Forwarded-Proto` and `X-Forwarded-PathBase` keep the
//!   first proxy's values; `X-Forwarded-For` and `Via` accumulate

pub mod request;
pub mod response;

use axum::http::header::{HeaderValue, InvalidHeaderValue};

pub use request::{ProxyRequestContext, TranslateError};
pub use response::relay_response;

/// How this gateway names itself in `Via` and `Forwarded`.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    name: String,
    via: HeaderValue,
}

impl NodeIdentity {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidHeaderValue> {
        let name = name.into();
        let via = HeaderValue::from_str(&format!("1.1 {name}"))?;
        Ok(Self { name, via })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn via(&self) -> &HeaderValue {
        &self.via
    }
}
