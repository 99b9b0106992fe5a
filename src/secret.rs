// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Sealing of store passwords while they sit in memory.
//!
//! Passwords handed to the builder are sealed immediately and only revealed
//! for the duration of a store load. The sealing primitive sits behind the
//! [`Sealer`] trait so callers can inject their own; [`SessionSealer`] is the
//! default.

use crate::error::{Error, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Opaque password token produced by a [`Sealer`].
///
/// The bytes are meaningless without the sealer that produced them and are
/// wiped when the token is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealedSecret {
    bytes: Vec<u8>,
}

impl SealedSecret {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealedSecret(<redacted>)")
    }
}

/// A String wrapper that securely zeroizes its contents on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingString(String);

impl ZeroizingString {
    pub fn new(value: String) -> Self {
        Self(value)
    }
}

impl std::ops::Deref for ZeroizingString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ZeroizingString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ZeroizingString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ZeroizingString(<redacted>)")
    }
}

/// Seals plaintext passwords into opaque tokens and reveals them again.
///
/// Implementations must tolerate concurrent `reveal` calls; builders share one
/// sealer across threads.
pub trait Sealer: Send + Sync {
    fn seal(&self, plaintext: &str) -> SealedSecret;

    fn reveal(&self, token: &SealedSecret) -> Result<ZeroizingString>;
}

/// AES-256-GCM sealer keyed with a random per-instance key.
///
/// The key only lives on the heap of this process. Tokens are laid out as
/// `[nonce:12][ciphertext+tag]` and cannot be opened by another instance.
pub struct SessionSealer {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl SessionSealer {
    pub fn new() -> Result<Self> {
        let rng = SystemRandom::new();
        let mut key_bytes = Zeroizing::new([0u8; 32]);
        rng.fill(&mut key_bytes[..])
            .map_err(|_| Error::Secret("Failed to generate session key".into()))?;

        let key = UnboundKey::new(&AES_256_GCM, &key_bytes[..])
            .map_err(|_| Error::Secret("Failed to create session key".into()))?;

        Ok(Self {
            key: LessSafeKey::new(key),
            rng,
        })
    }
}

impl Sealer for SessionSealer {
    fn seal(&self, plaintext: &str) -> SealedSecret {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        // An empty token is rejected on reveal.
        if self.rng.fill(&mut nonce_bytes).is_err() {
            return SealedSecret::from_bytes(Vec::new());
        }

        let mut in_out = plaintext.as_bytes().to_vec();
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        if self
            .key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .is_err()
        {
            in_out.zeroize();
            return SealedSecret::from_bytes(Vec::new());
        }

        let mut bytes = Vec::with_capacity(NONCE_LEN + in_out.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&in_out);
        SealedSecret::from_bytes(bytes)
    }

    fn reveal(&self, token: &SealedSecret) -> Result<ZeroizingString> {
        let data = token.as_bytes();
        if data.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(Error::Secret("Invalid sealed secret format".into()));
        }

        let mut nonce_array = [0u8; NONCE_LEN];
        nonce_array.copy_from_slice(&data[..NONCE_LEN]);
        let nonce = Nonce::assume_unique_for_key(nonce_array);

        let mut buffer = Zeroizing::new(data[NONCE_LEN..].to_vec());
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| Error::Secret("Authentication failed".into()))?;

        match String::from_utf8(plaintext.to_vec()) {
            Ok(s) => Ok(ZeroizingString(s)),
            Err(e) => {
                let mut raw = e.into_bytes();
                raw.zeroize();
                Err(Error::Secret("Sealed secret is not valid UTF-8".into()))
            }
        }
    }
}
