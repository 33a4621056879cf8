//! Fuzz target for the message codec.
//!
//! Stored messages arrive as two base64 fields written by whoever can reach
//! the store. Decoding and decrypting them must fail cleanly.
//!
//! # Strategy
//!
//! - Raw fields: arbitrary strings for ciphertext and IV
//! - Near misses: a genuine ciphertext with one byte flipped
//! - Wrong key: a genuine ciphertext opened under another key
//!
//! # Invariants
//!
//! - NEVER panic on malformed base64 or a short IV
//! - A flipped byte MUST fail authentication
//! - Only the encrypting key recovers the plaintext

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealpost_crypto::{SealedMessage, SessionKey, decrypt, encrypt};

#[derive(Debug, Arbitrary)]
enum Input {
    Raw { ciphertext: String, iv: String, key: [u8; 32] },
    Flipped { plaintext: Vec<u8>, key: [u8; 32], iv: [u8; 12], position: usize, mask: u8 },
    WrongKey { plaintext: Vec<u8>, key: [u8; 32], other: [u8; 32], iv: [u8; 12] },
}

/// Replays a fixed IV so the target stays deterministic.
struct FixedRng([u8; 12]);

impl rand_core::RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    fn next_u64(&mut self) -> u64 {
        u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for (out, byte) in dest.iter_mut().zip(self.0.iter().cycle()) {
            *out = *byte;
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl rand_core::CryptoRng for FixedRng {}

fuzz_target!(|input: Input| {
    match input {
        Input::Raw { ciphertext, iv, key } => {
            if let Ok(sealed) = SealedMessage::from_base64(&ciphertext, &iv) {
                let _ = decrypt(&sealed, &SessionKey::from_bytes(key));
            }
        },
        Input::Flipped { plaintext, key, iv, position, mask } => {
            if mask == 0 {
                return;
            }
            let key = SessionKey::from_bytes(key);
            let Ok(sealed) = encrypt(&plaintext, &key, &mut FixedRng(iv)) else {
                return;
            };

            let mut bytes = sealpost_crypto::decode_base64(&sealed.ciphertext_base64())
                .unwrap_or_default();
            if bytes.is_empty() {
                return;
            }
            let index = position % bytes.len();
            bytes[index] ^= mask;

            let tampered = SealedMessage::from_base64(
                &sealpost_crypto::encode_base64(&bytes),
                &sealed.iv_base64(),
            );
            if let Ok(tampered) = tampered {
                assert!(decrypt(&tampered, &key).is_err(), "flipped ciphertext authenticated");
            }
        },
        Input::WrongKey { plaintext, key, other, iv } => {
            let key = SessionKey::from_bytes(key);
            let Ok(sealed) = encrypt(&plaintext, &key, &mut FixedRng(iv)) else {
                return;
            };

            let opened = decrypt(&sealed, &key);
            assert_eq!(opened.as_deref().ok(), Some(plaintext.as_slice()));

            if other != *key.as_bytes() {
                assert!(
                    decrypt(&sealed, &SessionKey::from_bytes(other)).is_err(),
                    "foreign key opened the message"
                );
            }
        },
    }
});
