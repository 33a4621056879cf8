//! Typed identifiers and timestamps.
//!
//! Ids are opaque newtypes so a chat id can never be passed where a session
//! id is expected. All of them display as zero-padded hex.

use std::time::Duration;

use serde::{Deserialize, Serialize};

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident($inner:ty, $width:literal)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!("{:0", $width, "x}"), self.0)
            }
        }
    };
}

hex_id!(
    /// User identifier.
    UserId(u64, 16)
);
hex_id!(
    /// Chat identifier.
    ChatId(u128, 32)
);
hex_id!(
    /// Session identifier (one per minted session key).
    SessionId(u128, 32)
);
hex_id!(
    /// Message identifier.
    MessageId(u128, 32)
);
hex_id!(
    /// Friend request identifier.
    FriendRequestId(u128, 32)
);

/// Wall-clock time in unix milliseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create from unix milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Unix milliseconds.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// This timestamp advanced by `duration`.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// This timestamp moved back by `duration`, clamped at the epoch.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_as_padded_hex() {
        assert_eq!(UserId(0x2a).to_string(), "000000000000002a");
        assert_eq!(ChatId(0xff).to_string(), format!("{:0>32}", "ff"));
    }

    #[test]
    fn saturating_since_clamps_future() {
        let early = Timestamp::from_millis(1_000);
        let late = Timestamp::from_millis(4_500);

        assert_eq!(late.saturating_since(early), Duration::from_millis(3_500));
        assert_eq!(early.saturating_since(late), Duration::ZERO);
    }

    #[test]
    fn saturating_add_advances() {
        let t = Timestamp::from_millis(10);
        assert_eq!(t.saturating_add(Duration::from_secs(1)).as_millis(), 1_010);
    }

    #[test]
    fn saturating_sub_stops_at_epoch() {
        let t = Timestamp::from_millis(1_500);
        assert_eq!(t.saturating_sub(Duration::from_secs(1)).as_millis(), 500);
        assert_eq!(t.saturating_sub(Duration::from_secs(2)), Timestamp::default());
    }
}
