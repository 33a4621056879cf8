//! Sealpost core: data model, environment and collaborator contracts.
//!
//! Everything the session-keyed transport needs to know about the outside
//! world lives behind a trait in this crate:
//!
//! - [`env::Environment`]: time and randomness
//! - [`store::ChatStore`]: the persistent document store
//! - [`presence::PresenceTracker`]: online/offline liveness per user
//! - [`broker::KeyBroker`]: the trusted session key coordinator
//!
//! In-memory implementations ([`store::MemoryChatStore`],
//! [`presence::MemoryPresence`]) back the tests, the simulation harness and
//! embedded deployments.
//!
//! # Architecture
//!
//! ```text
//! sealpost-core
//!   ├─ ids / model     (typed ids, Chat, Session, Message, ...)
//!   ├─ Environment     (clock + CSPRNG, EnvRng adapter)
//!   ├─ ChatStore       (documents, conditional session insert)
//!   ├─ PresenceTracker (watch channels, drop-to-offline guards)
//!   └─ KeyBroker       (getOrCreate / store / expire contract)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod env;
pub mod ids;
pub mod model;
pub mod presence;
pub mod store;

pub use broker::{BrokerError, KeyBroker, SessionLookup, SessionWrite};
pub use env::{EnvRng, Environment};
pub use ids::{ChatId, FriendRequestId, MessageId, SessionId, Timestamp, UserId};
pub use model::{
    Chat, FriendRequest, FriendRequestStatus, Message, Participants, SameParticipant, Session,
    SessionStatus, UserIdentity, WrappedKeys,
};
pub use presence::{MemoryPresence, Presence, PresenceGuard, PresenceTracker};
pub use store::{ChatStore, ChatUpdate, MemoryChatStore, StoreError, touch_chat};
