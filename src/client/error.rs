//! Transport-level failures of a single attempt.

use std::error::Error as StdError;
use std::io;

use hyper_util::client::legacy;

/// An attempt that produced no backend response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// Failure to construct a communication client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("cannot create client for {address}: {reason}")]
    Create { address: String, reason: String },
}

impl From<legacy::Error> for TransportError {
    fn from(err: legacy::Error) -> Self {
        let details = describe(&err);
        if err.is_connect() {
            return TransportError::Connect(details);
        }

        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(e) = cause.downcast_ref::<hyper::Error>() {
                if e.is_timeout() {
                    return TransportError::Timeout(details);
                }
                if e.is_incomplete_message()
                    || e.is_closed()
                    || e.is_canceled()
                    || e.is_body_write_aborted()
                {
                    return TransportError::ConnectionClosed(details);
                }
                if e.is_parse() || e.is_parse_status() {
                    return TransportError::Protocol(details);
                }
            }
            if let Some(e) = cause.downcast_ref::<io::Error>() {
                match e.kind() {
                    io::ErrorKind::ConnectionRefused => return TransportError::Connect(details),
                    io::ErrorKind::TimedOut => return TransportError::Timeout(details),
                    io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof => {
                        return TransportError::ConnectionClosed(details)
                    }
                    _ => {}
                }
            }
            source = cause.source();
        }

        TransportError::Other(details)
    }
}

/// Render an error with its whole source chain.
fn describe(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
