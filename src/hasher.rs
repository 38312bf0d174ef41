// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Process-wide hasher registry.
//!
//! `hash_alg` is a small integer identifying a registered hash function,
//! the same way `multihash::Code` identifies a hash function by its
//! multicodec value; the two built-in registrations below reuse those
//! codes (`0x00` identity, `0x12` sha2-256) so a [`crate::Config::hash_alg`]
//! doubles as a multicodec if a caller wants to round-trip it through
//! a `Cid`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

/// Multicodec value for the identity hash, reused as the built-in
/// `hash_alg` for the identity hasher.
pub const IDENTITY_HASH_ALG: u64 = 0x00;
/// Multicodec value for sha2-256, reused as the built-in `hash_alg` for
/// the sha2-256 hasher.
pub const SHA2_256_HASH_ALG: u64 = 0x12;

/// A registered hash function. Implementations may be asynchronous:
/// a host-provided hasher is free to call out to another service.
#[async_trait]
pub trait Hasher: Send + Sync {
    /// Hashes `key`. The returned byte string's length must always equal
    /// the `hash_bytes` this hasher was registered under.
    async fn hash(&self, key: &[u8]) -> Vec<u8>;
}

struct IdentityHasher {
    hash_bytes: usize,
}

#[async_trait]
impl Hasher for IdentityHasher {
    async fn hash(&self, key: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; self.hash_bytes];
        let n = key.len().min(self.hash_bytes);
        out[..n].copy_from_slice(&key[..n]);
        out
    }
}

struct Sha2_256Hasher;

#[async_trait]
impl Hasher for Sha2_256Hasher {
    async fn hash(&self, key: &[u8]) -> Vec<u8> {
        Sha256::digest(key).to_vec()
    }
}

#[derive(Clone)]
pub(crate) struct HasherEntry {
    pub(crate) hash_bytes: usize,
    pub(crate) hasher: Arc<dyn Hasher>,
}

static REGISTRY: Lazy<RwLock<HashMap<u64, HasherEntry>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(
        IDENTITY_HASH_ALG,
        HasherEntry {
            hash_bytes: 32,
            hasher: Arc::new(IdentityHasher { hash_bytes: 32 }),
        },
    );
    map.insert(
        SHA2_256_HASH_ALG,
        HasherEntry {
            hash_bytes: 32,
            hasher: Arc::new(Sha2_256Hasher),
        },
    );
    RwLock::new(map)
});

/// Registers a hasher under `hash_alg`, overwriting any prior registration.
///
/// `hash_bytes` is the exact length every call to `hasher.hash` must
/// produce; the core relies on this to compute maximum tree depth and
/// never re-checks it per call.
pub fn register_hasher(hash_alg: u64, hash_bytes: usize, hasher: Arc<dyn Hasher>) {
    REGISTRY.write().unwrap().insert(
        hash_alg,
        HasherEntry {
            hash_bytes,
            hasher,
        },
    );
}

/// Registers an identity hasher producing `hash_bytes` of output, copying
/// up to `hash_bytes` of the key verbatim and zero-padding the rest. Useful
/// in tests that want to dictate the exact shape of the resulting tree.
pub fn register_identity_hasher(hash_alg: u64, hash_bytes: usize) {
    register_hasher(hash_alg, hash_bytes, Arc::new(IdentityHasher { hash_bytes }));
}

pub(crate) fn lookup(hash_alg: u64) -> Option<HasherEntry> {
    REGISTRY.read().unwrap().get(&hash_alg).cloned()
}
