//! Backend response relay.

use axum::body::Body;
use axum::http::header;
use axum::http::Response;

use crate::proxy::NodeIdentity;

/// Backend headers that describe the backend hop, not the relayed message.
const EXCLUDED_RESPONSE_HEADERS: [header::HeaderName; 4] = [
    header::CONNECTION,
    header::DATE,
    header::SERVER,
    header::TRANSFER_ENCODING,
];

/// Turn a backend response into the inbound response.
///
/// Status and headers are copied, the body is streamed through untouched.
pub fn relay_response(response: Response<Body>, node: &NodeIdentity) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    for name in &EXCLUDED_RESPONSE_HEADERS {
        parts.headers.remove(name);
    }
    parts.headers.append(header::VIA, node.via().clone());
    Response::from_parts(parts, body)
}
