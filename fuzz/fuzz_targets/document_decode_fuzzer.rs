//! Fuzz target for stored document decoding.
//!
//! Every read from the store decodes CBOR that may have been damaged or
//! written by something other than this codebase.
//!
//! # Invariants
//!
//! - NEVER panic on arbitrary bytes
//! - A decoded chat always has two distinct participants
//! - Whatever decodes re-encodes to a document that decodes to the same value

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealpost_core::{
    Chat, FriendRequest, Message, Session, UserIdentity,
    store::document::{decode_document, encode_document},
};
use serde::{Serialize, de::DeserializeOwned};

fn stable<T>(bytes: &[u8]) -> Option<T>
where
    T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let decoded: T = decode_document(bytes).ok()?;
    let encoded = encode_document(&decoded).expect("decoded document re-encodes");
    let again: T = decode_document(&encoded).expect("re-encoded document decodes");
    assert_eq!(decoded, again);
    Some(decoded)
}

fuzz_target!(|data: &[u8]| {
    if let Some(chat) = stable::<Chat>(data) {
        let [low, high] = chat.participants.to_array();
        assert_ne!(low, high, "decoded chat with a single participant");
    }
    stable::<Session>(data);
    stable::<Message>(data);
    stable::<FriendRequest>(data);
    stable::<UserIdentity>(data);
});
