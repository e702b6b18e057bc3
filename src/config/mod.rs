//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → routes compiled into the gateway dispatcher,
//!       services loaded into the static resolver
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the dispatcher, resolver bumps its epoch
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - Almost every field has a default; the 5xx retry policy does not
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    EndpointConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    PartitionConfig, PartitionSource, ProxyConfig, RetryConfig, RetryOverride, RouteConfig,
    ServiceConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
