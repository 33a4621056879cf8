//! Deterministic simulation harness for Sealpost.
//!
//! A [`World`] wires the real server components and clients together over a
//! seeded [`SimEnv`] and a fault-injecting [`ChaoticStore`]. Everything that
//! would normally vary between runs (ids, session keys, IVs, the clock) is
//! derived from the seed, so a failing seed replays exactly.
//!
//! ## Architecture
//!
//! ```text
//! sealpost-harness
//!   ├─ SimEnv        (virtual clock, ChaCha20 stream)
//!   ├─ ChaoticStore  (injects StoreError::Unavailable)
//!   ├─ World         (Server + AuthSessions + PresenceGuards)
//!   └─ Scenario      (end-to-end runs with oracles)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chaotic_store;
pub mod scenario;
pub mod sim_env;
pub mod world;

pub use chaotic_store::ChaoticStore;
pub use scenario::{ALICE, BOB, Scenario, ScenarioError, ScenarioReport};
pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv};
pub use world::{SIM_PASSWORD, SimStore, World};
