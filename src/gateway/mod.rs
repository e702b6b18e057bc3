//! Gateway subsystem: maps path prefixes to logical services.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → dispatcher.rs (first route whose prefix matches, segment-aware)
//!     → route.rs + partition.rs (service identity for this request)
//!     → resilience::RetryOrchestrator (resolve, attempt, retry)
//!     → proxy::relay_response, or a synthesized JSON failure
//! ```
//!
//! # Design Decisions
//! - Routes are evaluated in configuration order; no longest-prefix search
//! - A route may derive a named or an Int64 partition key, never both
//! - A partition key that cannot be derived rejects the request with 400

pub mod dispatcher;
pub mod partition;
pub mod route;

pub use dispatcher::{routes_from_config, GatewayDispatcher, GatewayError};
pub use partition::{PartitionKeyError, PartitionRule};
pub use route::{GatewayRoute, GatewayRouteBuilder, RouteError};
