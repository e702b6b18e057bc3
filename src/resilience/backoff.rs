//! Uniformly jittered backoff.

use std::time::Duration;

use rand::Rng;

/// Delay drawn uniformly from `[0, max)`, independently for every retry.
///
/// Uses the calling thread's generator; no RNG state is shared between tasks.
pub fn jittered_delay(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let factor: f64 = rand::thread_rng().gen();
    max.mul_f64(factor)
}
