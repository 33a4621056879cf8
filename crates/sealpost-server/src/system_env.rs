//! Environment backed by the operating system.
//!
//! Monotonic time for timeouts, the system clock for persisted timestamps,
//! tokio timers for the janitor tick and `getrandom` for every id, session
//! key and IV.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sealpost_core::{Environment, Timestamp};

/// Production [`Environment`].
///
/// Randomness never degrades: if the OS entropy source fails the process
/// aborts rather than minting a predictable session key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// The system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> Timestamp {
        // Clocks set before 1970 read as the epoch.
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp::from_millis(u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX))
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(e) = getrandom::fill(buffer) {
            tracing::error!(error = %e, len = buffer.len(), "OS entropy unavailable, aborting");
            std::process::abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn wall_clock_reads_unix_millis() {
        let env = SystemEnv::new();
        let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis();

        let read = u128::from(env.wall_clock().as_millis());

        // 2020-01-01T00:00:00Z
        assert!(read > 1_577_836_800_000);
        assert!(read >= before);
    }

    #[test]
    fn ids_do_not_repeat() {
        let env = SystemEnv::new();
        let ids: HashSet<u128> = (0..256).map(|_| env.random_u128()).collect();

        assert_eq!(ids.len(), 256);
    }

    #[tokio::test]
    async fn sleep_uses_real_time() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(20)).await;

        assert!(env.now() - start >= Duration::from_millis(20));
    }
}
