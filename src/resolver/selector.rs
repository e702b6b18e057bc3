//! Endpoint selection within a resolved partition.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::resolver::ResolvedEndpoint;

/// Strategy for choosing one endpoint of a resolved set.
pub trait EndpointSelector: Send + Sync + std::fmt::Debug {
    /// Pick an endpoint published on `listener`, or `None` when none qualifies.
    fn select<'a>(
        &self,
        endpoints: &'a [ResolvedEndpoint],
        listener: Option<&str>,
    ) -> Option<&'a ResolvedEndpoint>;
}

/// Round-robin selector.
/// Stores an internal counter to rotate through candidate endpoints.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointSelector for RoundRobin {
    fn select<'a>(
        &self,
        endpoints: &'a [ResolvedEndpoint],
        listener: Option<&str>,
    ) -> Option<&'a ResolvedEndpoint> {
        let candidates: Vec<&ResolvedEndpoint> = match listener {
            Some(name) => endpoints
                .iter()
                .filter(|e| e.listener.as_deref() == Some(name))
                .collect(),
            None => {
                // Prefer the default listener, fall back to whatever is published.
                let default: Vec<_> = endpoints.iter().filter(|e| e.listener.is_none()).collect();
                if default.is_empty() {
                    endpoints.iter().collect()
                } else {
                    default
                }
            }
        };

        if candidates.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index])
    }
}
