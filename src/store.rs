// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The backing store contract, a cooperative cancellation token, and a
//! couple of reference implementations so the crate is usable without a
//! host-supplied store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cid::Cid;
use multihash::{Code, MultihashDigest};

/// A small cloneable cancellation token backed by a shared atomic flag.
///
/// Threaded verbatim through every public operation and every store call
/// (§5 "Cancellation"). Checking it is synchronous and cheap; the core
/// never polls it on its own, only before and during store calls.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation. Any store call already polling this token
    /// will fail with a cancellation error.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The four operations the core calls on any backing store, parameterised
/// over the store's own error type.
///
/// `save`/`load` exchange raw canonical bytes (the root/non-root
/// encodings in [`crate::wire`]) rather than a typed node, so a store
/// implementation never needs to know about `V`. Content-addressing
/// (computing the `Cid` from the bytes) is the store's job, mirroring how
/// a `Blockstore` in this ecosystem derives its key from the block it is
/// given rather than accepting a caller-chosen one.
#[async_trait]
pub trait Store: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn save(&self, bytes: Vec<u8>, cancel: &CancelToken) -> Result<Cid, Self::Error>;
    async fn load(&self, id: &Cid, cancel: &CancelToken) -> Result<Vec<u8>, Self::Error>;

    /// Identifier equality. Defaults to `Cid`'s own `PartialEq`; overridable
    /// for stores that consider differently-encoded CIDs of the same
    /// content interchangeable.
    fn is_equal(&self, a: &Cid, b: &Cid) -> bool {
        a == b
    }
}

/// Raised by [`MemoryStore`] when a `Cid` isn't present, or by either
/// reference store when a call observes a fired [`CancelToken`].
#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("cid {0} not found in store")]
    NotFound(Cid),
    #[error("operation cancelled")]
    Cancelled,
}

/// An in-memory, `Blake2b-256`-addressed [`Store`]. Intended for tests,
/// examples, and quick prototyping; not persistent.
#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Error = MemoryStoreError;

    async fn save(&self, bytes: Vec<u8>, cancel: &CancelToken) -> Result<Cid, Self::Error> {
        if cancel.is_cancelled() {
            return Err(MemoryStoreError::Cancelled);
        }
        let hash = Code::Blake2b256.digest(&bytes);
        let cid = Cid::new_v1(0x71 /* dag-cbor */, hash);
        self.blocks.write().unwrap().insert(cid, bytes);
        Ok(cid)
    }

    async fn load(&self, id: &Cid, cancel: &CancelToken) -> Result<Vec<u8>, Self::Error> {
        if cancel.is_cancelled() {
            return Err(MemoryStoreError::Cancelled);
        }
        self.blocks
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(MemoryStoreError::NotFound(*id))
    }
}

/// Call counters kept by [`TrackingStore`], analogous to a `BSStats`
/// struct kept by a tracking blockstore decorator.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub saves: AtomicU64,
    pub loads: AtomicU64,
}

impl StoreStats {
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }
}

/// Wraps any [`Store`] and counts `save`/`load` calls, so tests can assert
/// I/O counts directly (e.g. E1's "exactly one store save, zero loads")
/// instead of only inferring them from `size`/`get` results.
pub struct TrackingStore<S> {
    inner: S,
    pub stats: Arc<StoreStats>,
}

impl<S> TrackingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stats: Arc::new(StoreStats::default()),
        }
    }
}

#[async_trait]
impl<S: Store> Store for TrackingStore<S> {
    type Error = S::Error;

    async fn save(&self, bytes: Vec<u8>, cancel: &CancelToken) -> Result<Cid, Self::Error> {
        self.stats.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(bytes, cancel).await
    }

    async fn load(&self, id: &Cid, cancel: &CancelToken) -> Result<Vec<u8>, Self::Error> {
        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(id, cancel).await
    }

    fn is_equal(&self, a: &Cid, b: &Cid) -> bool {
        self.inner.is_equal(a, b)
    }
}
