//! Shared fixtures for client integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sealpost_client::{AuthSession, ClientContext, SessionLifecycleMonitor};
use sealpost_core::{
    ChatId, Environment, MemoryChatStore, MemoryPresence, Timestamp, UserId,
};
use sealpost_server::{BrokerConfig, ChatDirectory, SessionKeyBroker};

pub const ALICE: UserId = UserId(0xa11ce);
pub const BOB: UserId = UserId(0xb0b);
pub const PASSWORD: &str = "correct horse battery staple";

// Test environment using a seeded RNG and a manually advanced wall clock
#[derive(Clone)]
pub struct TestEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    wall_millis: Arc<AtomicU64>,
}

impl TestEnv {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            wall_millis: Arc::new(AtomicU64::new(1_700_000_000_000)),
        }
    }
}

impl Environment for TestEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> Timestamp {
        Timestamp::from_millis(self.wall_millis.fetch_add(1, Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

/// In-process store, broker and presence wired together.
pub struct Fixture {
    pub env: TestEnv,
    pub store: Arc<MemoryChatStore>,
    pub presence: MemoryPresence,
    pub broker: Arc<SessionKeyBroker<MemoryChatStore, TestEnv>>,
    pub directory: ChatDirectory<MemoryChatStore, TestEnv>,
}

impl Fixture {
    pub fn new(seed: u64) -> Self {
        let env = TestEnv::with_seed(seed);
        let store = Arc::new(MemoryChatStore::new());
        let broker = Arc::new(SessionKeyBroker::new(
            Arc::clone(&store),
            env.clone(),
            BrokerConfig::default(),
        ));
        let directory = ChatDirectory::new(Arc::clone(&store), env.clone());

        Self { env, store, presence: MemoryPresence::new(), broker, directory }
    }

    pub fn ctx(&self) -> ClientContext<TestEnv> {
        ClientContext::new(
            self.store.clone(),
            self.broker.clone(),
            Arc::new(self.presence.clone()),
            self.env.clone(),
        )
    }

    pub async fn register(&self, user: UserId) -> AuthSession {
        AuthSession::register(self.store.as_ref(), &self.env, user, PASSWORD).await.unwrap()
    }

    pub async fn chat(&self, a: UserId, b: UserId) -> ChatId {
        self.directory.befriend(a, b).await.unwrap().chat_id.unwrap()
    }

    pub fn monitor(&self, auth: &AuthSession, chat: ChatId) -> SessionLifecycleMonitor<TestEnv> {
        SessionLifecycleMonitor::new(self.ctx(), auth, chat)
    }
}
