//! End-to-end scenarios run against a simulated [`World`].
//!
//! Each scenario drives the real client, broker, directory and janitor
//! against one seeded world and checks its oracle at the end. A broken
//! oracle is reported as [`ScenarioError::Violated`]; anything else is an
//! operation that should have succeeded and did not.
//!
//! ```text
//! Scenario::run(seed)
//!   ├─ World::new(seed)      (SimEnv + ChaoticStore + Server)
//!   ├─ register / connect / befriend
//!   ├─ drive monitors, watchers, sweeps
//!   └─ oracle                (Violated on mismatch)
//! ```

use std::time::Duration;

use sealpost_client::{ClientError, MessageBody, MonitorState};
use sealpost_core::{ChatStore, Environment, StoreError, UserId};
use sealpost_server::DirectoryError;
use thiserror::Error;

use crate::world::World;

/// First simulated user.
pub const ALICE: UserId = UserId(1);
/// Second simulated user.
pub const BOB: UserId = UserId(2);

/// Why a scenario did not pass.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// A client operation failed.
    #[error("client: {0}")]
    Client(#[from] ClientError),

    /// A directory operation failed.
    #[error("directory: {0}")]
    Directory(#[from] DirectoryError),

    /// A direct store access failed.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Everything ran but the outcome was wrong.
    #[error("{scenario}: {reason}")]
    Violated {
        /// Scenario that failed.
        scenario: Scenario,
        /// What the oracle saw.
        reason: String,
    },
}

/// Outcome of a passing scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Scenario that ran.
    pub scenario: Scenario,
    /// World seed.
    pub seed: u64,
    /// Virtual time consumed.
    pub elapsed: Duration,
    /// Sessions stored across all chats the scenario touched.
    pub sessions: usize,
    /// Messages left in the store at the end.
    pub messages_left: usize,
}

/// Built-in scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Both peers online: exactly one session, both can read each other.
    SharedSession,
    /// Both peers go offline: session expired, messages purged, chat kept.
    AbandonedChat,
    /// Idle past the timeout: chat swept, reopening creates a new one.
    InactiveChat,
    /// A wrong password never unlocks the identity.
    WrongPassword,
}

impl Scenario {
    /// Every scenario, in run order.
    pub const ALL: [Self; 4] =
        [Self::SharedSession, Self::AbandonedChat, Self::InactiveChat, Self::WrongPassword];

    /// Short name used in logs and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Self::SharedSession => "shared-session",
            Self::AbandonedChat => "abandoned-chat",
            Self::InactiveChat => "inactive-chat",
            Self::WrongPassword => "wrong-password",
        }
    }

    /// Run against a fresh world seeded with `seed`.
    ///
    /// # Errors
    ///
    /// `ScenarioError::Violated` if the oracle fails, any other variant if
    /// an operation the scenario relies on failed.
    pub async fn run(self, seed: u64) -> Result<ScenarioReport, ScenarioError> {
        tracing::info!(scenario = self.name(), seed, "scenario start");

        let mut world = World::new(seed);
        let sessions = match self {
            Self::SharedSession => shared_session(&mut world).await?,
            Self::AbandonedChat => abandoned_chat(&mut world).await?,
            Self::InactiveChat => inactive_chat(&mut world).await?,
            Self::WrongPassword => wrong_password(&mut world).await?,
        };

        let report = ScenarioReport {
            scenario: self,
            seed,
            elapsed: world.env().elapsed(),
            sessions,
            messages_left: world.memory().message_count()?,
        };
        tracing::info!(scenario = self.name(), ?report, "scenario passed");
        Ok(report)
    }

    fn violated(self, reason: impl Into<String>) -> ScenarioError {
        ScenarioError::Violated { scenario: self, reason: reason.into() }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| format!("unknown scenario '{s}'"))
    }
}

async fn shared_session(world: &mut World) -> Result<usize, ScenarioError> {
    const SCENARIO: Scenario = Scenario::SharedSession;

    world.register(ALICE).await?;
    world.register(BOB).await?;
    let chat = world
        .befriend(ALICE, BOB)
        .await?
        .chat_id
        .ok_or_else(|| SCENARIO.violated("accepted request has no chat"))?;
    world.connect(ALICE);
    world.connect(BOB);

    let mut alice = world.monitor(ALICE, chat)?;
    let mut bob = world.monitor(BOB, chat)?;
    alice.open().await;
    bob.open().await;

    let (Some(a), Some(b)) = (alice.active_session(), bob.active_session()) else {
        return Err(SCENARIO.violated(format!(
            "monitors not active: alice={:?} bob={:?}",
            alice.state(),
            bob.state()
        )));
    };
    if a != b {
        return Err(SCENARIO.violated(format!("peers hold different sessions {a} and {b}")));
    }

    alice.send(b"hello bob").await?;
    bob.send(b"hello alice").await?;

    let expectations = [(&bob, b"hello bob".as_slice()), (&alice, b"hello alice".as_slice())];
    for (reader, expected) in expectations {
        let seen = reader.read_recent(10).await?;
        if !seen.iter().any(|m| m.body == MessageBody::Plaintext(expected.to_vec())) {
            return Err(SCENARIO.violated("peer message not readable"));
        }
    }

    let sessions = world.memory().session_count(chat)?;
    if sessions != 1 {
        return Err(SCENARIO.violated(format!("{sessions} sessions stored, expected 1")));
    }
    Ok(sessions)
}

async fn abandoned_chat(world: &mut World) -> Result<usize, ScenarioError> {
    const SCENARIO: Scenario = Scenario::AbandonedChat;

    world.register(ALICE).await?;
    world.register(BOB).await?;
    let chat = world
        .befriend(ALICE, BOB)
        .await?
        .chat_id
        .ok_or_else(|| SCENARIO.violated("accepted request has no chat"))?;
    world.connect(ALICE);
    world.connect(BOB);

    let mut alice = world.monitor(ALICE, chat)?;
    if !matches!(alice.open().await, MonitorState::Active { .. }) {
        return Err(SCENARIO.violated(format!("alice not active: {:?}", alice.state())));
    }
    let session = alice.active_session();
    for text in [b"one".as_slice(), b"two".as_slice(), b"three".as_slice()] {
        alice.send(text).await?;
    }

    world.disconnect(ALICE);
    world.disconnect(BOB);

    let keyring = world
        .login_of(ALICE)
        .map(|login| login.keyring())
        .ok_or_else(|| SCENARIO.violated("alice has no login"))?;
    let watcher = world.watcher(chat).await?.evicting_from(keyring.clone());
    let report = watcher.run().await?;

    if report.session != session || report.purged != 3 {
        return Err(SCENARIO.violated(format!("unexpected cleanup {report:?}")));
    }
    if let Some(id) = session
        && keyring.session_key(id)?.is_some()
    {
        return Err(SCENARIO.violated("expired session key still cached"));
    }

    let store = world.memory();
    if store.load_chat(chat).await?.is_none() {
        return Err(SCENARIO.violated("cleanup removed the chat"));
    }
    if store.latest_session(chat).await?.is_some_and(|s| s.is_active()) {
        return Err(SCENARIO.violated("session still active after cleanup"));
    }
    Ok(store.session_count(chat)?)
}

async fn inactive_chat(world: &mut World) -> Result<usize, ScenarioError> {
    const SCENARIO: Scenario = Scenario::InactiveChat;

    let request = world.befriend(ALICE, BOB).await?;
    let old = request.chat_id.ok_or_else(|| SCENARIO.violated("accepted request has no chat"))?;

    let timeout = world.server().janitor().config().inactivity_timeout;
    world.env().advance(timeout + Duration::from_secs(1));

    let sweep = world.server().janitor().sweep().await?;
    if sweep.removed != [old] {
        return Err(SCENARIO.violated(format!("sweep removed {:?}", sweep.removed)));
    }

    let directory = world.server().directory();
    if !matches!(directory.resolve(old).await, Err(DirectoryError::NotFound { .. })) {
        return Err(SCENARIO.violated("swept chat still resolves"));
    }

    let reopened = directory.open_chat(request.id, BOB).await?;
    if reopened == old {
        return Err(SCENARIO.violated("reopened chat reused the swept id"));
    }
    let chat = directory.resolve(reopened).await?;
    if chat.idle_since() != world.env().wall_clock() {
        return Err(SCENARIO.violated("reopened chat is not fresh"));
    }
    Ok(world.memory().session_count(reopened)?)
}

async fn wrong_password(world: &mut World) -> Result<usize, ScenarioError> {
    const SCENARIO: Scenario = Scenario::WrongPassword;

    world.register(ALICE).await?;
    world.logout(ALICE);

    match world.login(ALICE, "not the password").await {
        Err(ClientError::LoginFailed) => {},
        other => return Err(SCENARIO.violated(format!("wrong password gave {other:?}"))),
    }
    if world.login_of(ALICE).is_some() {
        return Err(SCENARIO.violated("failed login left a session behind"));
    }

    world.login(ALICE, crate::world::SIM_PASSWORD).await?;
    Ok(0)
}
