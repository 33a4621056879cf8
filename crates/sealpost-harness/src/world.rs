//! Simulated world: one server, a set of users, their logins and
//! connections.
//!
//! The world owns every [`AuthSession`] and [`PresenceGuard`], so logging a
//! user out or cutting their connection is a single call and the effects
//! (keyring cleared, presence offline) follow from drop.

use std::{collections::HashMap, sync::Arc};

use sealpost_client::{
    AuthSession, CleanupWatcher, ClientContext, ClientError, SessionLifecycleMonitor,
};
use sealpost_core::{
    ChatId, ChatStore, FriendRequest, MemoryChatStore, PresenceGuard, PresenceTracker, UserId,
    UserIdentity,
};
use sealpost_server::{DirectoryError, Server, ServerError, ServerRuntimeConfig};

use crate::{chaotic_store::ChaoticStore, sim_env::SimEnv};

/// Password every simulated user registers with.
pub const SIM_PASSWORD: &str = "sealpost simulation password";

/// Store type used by the simulation.
pub type SimStore = ChaoticStore<MemoryChatStore>;

/// One server and its users.
pub struct World {
    env: SimEnv,
    memory: Arc<MemoryChatStore>,
    store: Arc<SimStore>,
    server: Server<SimStore, SimEnv>,
    logins: HashMap<UserId, AuthSession>,
    connections: HashMap<UserId, PresenceGuard>,
}

impl World {
    /// A world with default server configuration.
    pub fn new(seed: u64) -> Self {
        let (env, memory, store) = Self::parts(seed);
        let server = Server::with_defaults(Arc::clone(&store), env.clone());
        Self::assemble(env, memory, store, server)
    }

    /// A world with a custom server configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configuration is invalid.
    pub fn with_config(seed: u64, config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let (env, memory, store) = Self::parts(seed);
        let server = Server::new(Arc::clone(&store), env.clone(), config)?;
        Ok(Self::assemble(env, memory, store, server))
    }

    fn parts(seed: u64) -> (SimEnv, Arc<MemoryChatStore>, Arc<SimStore>) {
        let env = SimEnv::with_seed(seed);
        let memory = Arc::new(MemoryChatStore::new());
        let store = Arc::new(ChaoticStore::new(Arc::clone(&memory), seed));
        (env, memory, store)
    }

    fn assemble(
        env: SimEnv,
        memory: Arc<MemoryChatStore>,
        store: Arc<SimStore>,
        server: Server<SimStore, SimEnv>,
    ) -> Self {
        Self { env, memory, store, server, logins: HashMap::new(), connections: HashMap::new() }
    }

    /// Simulation environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The fault-injecting store every component talks to.
    pub fn store(&self) -> &Arc<SimStore> {
        &self.store
    }

    /// The store underneath the fault injection, for assertions.
    pub fn memory(&self) -> &Arc<MemoryChatStore> {
        &self.memory
    }

    /// The server.
    pub fn server(&self) -> &Server<SimStore, SimEnv> {
        &self.server
    }

    /// Collaborators as a client sees them.
    pub fn ctx(&self) -> ClientContext<SimEnv> {
        ClientContext::new(
            self.store.clone(),
            self.server.broker(),
            Arc::new(self.server.presence().clone()),
            self.env.clone(),
        )
    }

    /// Register `user` with [`SIM_PASSWORD`] and keep them logged in.
    pub async fn register(&mut self, user: UserId) -> Result<(), ClientError> {
        let session =
            AuthSession::register(self.store.as_ref(), &self.env, user, SIM_PASSWORD).await?;
        self.logins.insert(user, session);
        Ok(())
    }

    /// Store an identity created elsewhere (e.g. generated once and shared
    /// across test cases), without logging in.
    pub async fn adopt_identity(&self, identity: &UserIdentity) -> Result<(), ClientError> {
        self.store.insert_identity(identity).await?;
        Ok(())
    }

    /// Log `user` in, replacing any previous login.
    pub async fn login(&mut self, user: UserId, password: &str) -> Result<(), ClientError> {
        let session = AuthSession::login(self.store.as_ref(), user, password).await?;
        self.logins.insert(user, session);
        Ok(())
    }

    /// Log `user` out. Returns whether they were logged in.
    pub fn logout(&mut self, user: UserId) -> bool {
        self.logins.remove(&user).map(AuthSession::logout).is_some()
    }

    /// The login of `user`.
    pub fn login_of(&self, user: UserId) -> Option<&AuthSession> {
        self.logins.get(&user)
    }

    /// Bring `user` online. Idempotent.
    pub fn connect(&mut self, user: UserId) {
        if !self.connections.contains_key(&user) {
            let guard = self.server.presence().connect(user);
            self.connections.insert(user, guard);
        }
    }

    /// Drop `user`'s connection. Idempotent.
    pub fn disconnect(&mut self, user: UserId) {
        self.connections.remove(&user);
    }

    /// Whether `user` is online.
    pub fn is_online(&self, user: UserId) -> bool {
        self.server.presence().presence(user).is_online()
    }

    /// Befriend two users and return the accepted request.
    pub async fn befriend(&self, a: UserId, b: UserId) -> Result<FriendRequest, DirectoryError> {
        self.server.directory().befriend(a, b).await
    }

    /// A monitor for `user`'s view of `chat`.
    ///
    /// # Errors
    ///
    /// `ClientError::LoggedOut` if `user` has no login.
    pub fn monitor(
        &self,
        user: UserId,
        chat: ChatId,
    ) -> Result<SessionLifecycleMonitor<SimEnv>, ClientError> {
        let login = self.logins.get(&user).ok_or(ClientError::LoggedOut)?;
        Ok(SessionLifecycleMonitor::new(self.ctx(), login, chat))
    }

    /// A cleanup watcher for `chat`.
    pub async fn watcher(&self, chat: ChatId) -> Result<CleanupWatcher<SimEnv>, ClientError> {
        CleanupWatcher::new(self.ctx(), chat).await
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("env", &self.env)
            .field("logged_in", &self.logins.keys().collect::<Vec<_>>())
            .field("online", &self.connections.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
