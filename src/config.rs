/*!
Configuration (§6 "Configuration", §12 ambient configuration).

Bundles what a deployment must decide before a node can run the phase engine at all: the signing
mode, starting view, long-term keypair, initial topology, and the round-timeout estimator's
parameters (§5 "Suspension points": `UpdateTimeout`/`Timeout`).
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::identity::KeyPair;
use crate::suite::Suite;
use crate::view::ViewNumber;

/// Whether a round signs a pre-agreed log value or a combined Merkle root (§2 component 8, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMode {
    PubKey,
    MerkleTree,
}

/// A node's fixed configuration for the lifetime of the process (§6 "Configuration").
#[derive_where::derive_where(Debug, Clone)]
pub struct Config<S: Suite> {
    pub mode: SigningMode,
    pub starting_view: ViewNumber,
    pub keypair: KeyPair<S>,
    pub timeout: TimeoutEstimator,
    /// Dev-only: turns a failed root verification into a panic instead of a structured
    /// [`crate::error::VerificationError`], to reproduce the source's unconditional-panic
    /// behavior in a test harness (§9 open question, resolved in favor of a kill-switch).
    /// Defaults to `false`.
    pub panic_on_verification_failure: bool,
}

impl<S: Suite> Config<S> {
    pub fn new(mode: SigningMode, starting_view: ViewNumber, keypair: KeyPair<S>) -> Self {
        Self {
            mode,
            starting_view,
            keypair,
            timeout: TimeoutEstimator::default(),
            panic_on_verification_failure: false,
        }
    }
}

/// A running estimate of how long to wait for children's Commit/Response messages before
/// proceeding with a partial set (§4.3 step 2, §5 "Timeout").
///
/// Tracked as an exponential moving average over observed round completion latencies, generalizing
/// the source's single `UpdateTimeout`/`Timeout` pair into explicit, inspectable parameters.
#[derive(Debug)]
pub struct TimeoutEstimator {
    current_nanos: AtomicU64,
    floor: Duration,
    ceiling: Duration,
    /// Weight given to a fresh observation, in the range `(0.0, 1.0]`; closer to `1.0` adapts
    /// faster but is noisier.
    alpha: f64,
}

impl TimeoutEstimator {
    pub fn new(initial: Duration, floor: Duration, ceiling: Duration, alpha: f64) -> Self {
        Self {
            current_nanos: AtomicU64::new(initial.as_nanos() as u64),
            floor,
            ceiling,
            alpha,
        }
    }

    /// The timeout to use for the next wait.
    pub fn current(&self) -> Duration {
        Duration::from_nanos(self.current_nanos.load(Ordering::Relaxed))
    }

    /// Folds a freshly observed round latency into the estimate, clamped to `[floor, ceiling]`.
    pub fn update(&self, observed: Duration) {
        let current = self.current().as_nanos() as f64;
        let observed = observed.as_nanos() as f64;
        let next = self.alpha * observed + (1.0 - self.alpha) * current;
        let clamped = (next as u64).clamp(self.floor.as_nanos() as u64, self.ceiling.as_nanos() as u64);
        self.current_nanos.store(clamped, Ordering::Relaxed);
    }
}

impl Default for TimeoutEstimator {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(500),
            Duration::from_millis(50),
            Duration::from_secs(10),
            0.2,
        )
    }
}

impl Clone for TimeoutEstimator {
    fn clone(&self) -> Self {
        Self {
            current_nanos: AtomicU64::new(self.current_nanos.load(Ordering::Relaxed)),
            floor: self.floor,
            ceiling: self.ceiling,
            alpha: self.alpha,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_moves_toward_observation_but_stays_clamped() {
        let estimator = TimeoutEstimator::new(
            Duration::from_millis(500),
            Duration::from_millis(100),
            Duration::from_secs(2),
            0.5,
        );
        estimator.update(Duration::from_millis(900));
        assert!(estimator.current() > Duration::from_millis(500));
        assert!(estimator.current() < Duration::from_millis(900));

        for _ in 0..50 {
            estimator.update(Duration::from_secs(30));
        }
        assert_eq!(estimator.current(), Duration::from_secs(2));
    }
}
