//! Simulated network transit latency.
//!
//! Every prepare/accept call a proposer issues first incurs an unconditional
//! randomized delay, modeling the network hop to the acceptor. The delay is
//! sampled from a seeded [`ChaCha8Rng`], so a run is reproducible from its
//! seed, and the [`JitterConfig::fast_local`] preset collapses the delay to
//! zero for deterministic tests.

use std::time::Duration;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Latency range applied before every prepare/accept call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterConfig {
    /// Minimum transit delay.
    pub min_delay: Duration,
    /// Maximum transit delay (inclusive).
    pub max_delay: Duration,
}

impl JitterConfig {
    /// No latency at all. Intended for deterministic tests.
    pub const fn fast_local() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

impl Default for JitterConfig {
    /// The reference transit latency: uniform 20–50ms.
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(50),
        }
    }
}

/// Per-proposer latency source.
///
/// Each proposer owns its own jitter stream so that samples drawn by one
/// worker never perturb another worker's sequence.
#[derive(Debug)]
pub struct NetworkJitter {
    config: JitterConfig,
    rng: ChaCha8Rng,
}

impl NetworkJitter {
    /// Create a jitter source with its own seeded RNG stream.
    pub fn new(config: JitterConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Suspend for one sampled transit delay.
    ///
    /// The delay is not cancellable and applies regardless of what the
    /// subsequent call returns.
    pub async fn transit(&mut self) {
        if self.config.max_delay.is_zero() {
            return;
        }
        let min = self.config.min_delay.as_micros() as u64;
        let max = self.config.max_delay.as_micros() as u64;
        let delay = Duration::from_micros(self.rng.gen_range(min..=max));
        tokio::time::sleep(delay).await;
    }
}
