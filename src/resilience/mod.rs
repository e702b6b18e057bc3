//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Proxied request:
//!     → orchestrator.rs (resolve endpoint, pick cached client)
//!     → timeouts.rs (bound the attempt by the operation timeout)
//!     → classifier.rs (success, retry same endpoint, re-resolve, or fatal)
//!     → backoff.rs (jittered delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Retries replay the buffered request body; any method may be retried
//! - A 404 is treated as a stale address unless the backend marks it intentional
//! - Every wait is cancellable by the caller
//! - Callers may plug failure handlers in ahead of the built-in rules

pub mod backoff;
pub mod classifier;
pub mod orchestrator;
pub mod retries;
pub mod timeouts;

pub use classifier::{
    classify, AttemptResult, Failure, FailureHandler, FailureHandlers, Outcome, Verdict,
};
pub use orchestrator::{InvokeError, RetryOrchestrator};
pub use retries::{FailureKind, RetryOptions};
