//! Simulated environment.
//!
//! Time is virtual: it only moves when a test calls [`SimEnv::advance`] or
//! when something sleeps, in which case the clock jumps forward by the
//! sleep duration. Randomness comes from a ChaCha20 stream seeded once, so
//! every id, session key and IV is reproducible from the seed.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sealpost_core::{Environment, Timestamp};

/// Wall clock reading at simulation start: 2024-01-01T00:00:00Z.
pub const SIM_EPOCH_MILLIS: u64 = 1_704_067_200_000;

struct SimState {
    rng: ChaCha20Rng,
    elapsed: Duration,
}

/// Deterministic environment for simulation.
#[derive(Clone)]
pub struct SimEnv {
    seed: u64,
    start: Instant,
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        tracing::debug!(seed, "simulation environment seeded");
        Self {
            seed,
            start: Instant::now(),
            state: Arc::new(Mutex::new(SimState {
                rng: ChaCha20Rng::seed_from_u64(seed),
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Seed this environment was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Move virtual time forward.
    pub fn advance(&self, duration: Duration) {
        self.lock().elapsed += duration;
    }

    /// Virtual time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn wall_clock(&self) -> Timestamp {
        Timestamp::from_millis(SIM_EPOCH_MILLIS).saturating_add(self.elapsed())
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        tokio::task::yield_now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv")
            .field("seed", &self.seed)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);

        assert_eq!(a.random_u128(), b.random_u128());
        assert_ne!(a.random_u128(), SimEnv::with_seed(43).random_u128());
    }

    #[test]
    fn clones_share_clock_and_stream() {
        let env = SimEnv::with_seed(1);
        let clone = env.clone();

        clone.advance(Duration::from_secs(5));
        assert_eq!(env.elapsed(), Duration::from_secs(5));
        assert_eq!(env.wall_clock().as_millis(), SIM_EPOCH_MILLIS + 5_000);
    }

    #[tokio::test]
    async fn sleep_jumps_virtual_time() {
        let env = SimEnv::with_seed(1);
        let before = env.now();

        env.sleep(Duration::from_secs(3600)).await;

        assert_eq!(env.now() - before, Duration::from_secs(3600));
    }
}
