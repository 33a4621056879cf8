//! Time and randomness behind one trait.
//!
//! Broker, directory, janitor and client code never read the system clock or
//! the OS RNG directly. The server plugs in `SystemEnv`; the harness plugs in
//! a seeded environment with a virtual clock, so a failing run replays from
//! its seed, session keys and IVs included.
//!
//! # Invariants
//!
//! - `now()` is monotonic
//! - a seeded implementation yields the same byte stream for the same seed
//! - clones share one clock and one stream

use std::time::{Duration, Instant};

use rand::{CryptoRng, RngCore};

use crate::ids::Timestamp;

/// Source of time and randomness.
///
/// `random_bytes` must be a CSPRNG in production: session keys, message IVs
/// and every id come from it. Methods do not fail; an implementation that
/// loses its entropy source must stop the process instead of degrading.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic time for timeouts.
    fn now(&self) -> Instant;

    /// Wall-clock time for persisted timestamps.
    ///
    /// Only used for display ordering and inactivity accounting. Session
    /// currency never depends on it.
    fn wall_clock(&self) -> Timestamp;

    /// Wait for `duration`. Only the janitor tick sleeps.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` from the environment's entropy.
    ///
    /// Seeded implementations should log their seed.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// A random `u64`.
    fn random_u64(&self) -> u64 {
        let mut raw = [0u8; 8];
        self.random_bytes(&mut raw);
        u64::from_be_bytes(raw)
    }

    /// A random `u128`, used for chat, session and message ids.
    fn random_u128(&self) -> u128 {
        let mut raw = [0u8; 16];
        self.random_bytes(&mut raw);
        u128::from_be_bytes(raw)
    }
}

/// Adapts an [`Environment`] into a `rand` CSPRNG.
///
/// Lets the pure crypto functions draw from the environment's entropy, so
/// simulated runs stay deterministic while production uses OS entropy.
#[derive(Clone)]
pub struct EnvRng<E: Environment> {
    env: E,
}

impl<E: Environment> EnvRng<E> {
    /// Wrap an environment.
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: Environment> RngCore for EnvRng<E> {
    fn next_u32(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        self.env.random_bytes(&mut raw);
        u32::from_le_bytes(raw)
    }

    fn next_u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        self.env.random_bytes(&mut raw);
        u64::from_le_bytes(raw)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.env.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.env.random_bytes(dest);
        Ok(())
    }
}

// Sound only because `Environment::random_bytes` is required to be a CSPRNG.
impl<E: Environment> CryptoRng for EnvRng<E> {}
