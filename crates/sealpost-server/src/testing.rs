//! Deterministic environment for unit tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sealpost_core::{Environment, Timestamp};

/// Seeded RNG, settable wall clock, sleeps yield immediately.
#[derive(Clone)]
pub struct TestEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    wall_millis: Arc<AtomicU64>,
    epoch: Instant,
}

impl TestEnv {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            wall_millis: Arc::new(AtomicU64::new(1_000)),
            epoch: Instant::now(),
        }
    }

    pub fn set_wall_clock(&self, at: Timestamp) {
        self.wall_millis.store(at.as_millis(), Ordering::SeqCst);
    }
}

impl Environment for TestEnv {
    fn now(&self) -> Instant {
        self.epoch + Duration::from_millis(self.wall_millis.load(Ordering::SeqCst))
    }

    fn wall_clock(&self) -> Timestamp {
        Timestamp::from_millis(self.wall_millis.load(Ordering::SeqCst))
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::task::yield_now()
    }

    #[allow(clippy::unwrap_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}
