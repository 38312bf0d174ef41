// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A single HAMT node: the bitmap-plus-compacted-element-array at the
//! heart of this crate, and the recursive find/set/delete/collapse logic
//! that keeps it canonical.

use std::future::Future;
use std::pin::Pin;

use cid::Cid;
use log::{debug, trace};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bits;
use crate::element::Element;
use crate::error::Error;
use crate::store::{CancelToken, Store};
use crate::wire;

/// Boxed recursive future: every `async fn` here that calls itself
/// (directly, or through a `store.load` + recurse) is declared this way
/// instead of as a bare `async fn`, since an unboxed `async fn` cannot
/// recurse (its future would be infinitely sized). Non-recursive entry
/// points (`set`, `get`, `delete`, `has`) stay as ordinary `async fn`s.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A node of the tree: bitmap occupancy, a compacted element array, and
/// (once saved) the identifier the backing store returned for it.
///
/// `depth` is 0 at the root. `hash_alg`/`bit_width`/`bucket_size` are
/// copied onto every node of a tree for convenience; only the root
/// actually serialises them (see [`crate::wire`]).
#[derive(Debug, Clone)]
pub struct Node<V> {
    pub(crate) hash_alg: u64,
    pub(crate) hash_bytes: usize,
    pub(crate) bit_width: u32,
    pub(crate) bucket_size: u32,
    pub(crate) depth: u32,
    pub(crate) bitmap: Vec<u8>,
    pub(crate) data: Vec<Element<V>>,
    pub(crate) id: Option<Cid>,
}

/// Outcome of a recursive delete at one node. Stands in for the "returns a
/// depth-0 placeholder node" trick the source algorithm uses: the parent
/// only ever needs to know whether its child is gone, unchanged, a normal
/// new version, or must be merged inline, so an enum says that directly
/// instead of encoding it in a throwaway [`Node`] shape.
pub(crate) enum DeleteOutcome<V> {
    /// The key wasn't present (or the recursive call produced no change);
    /// the parent keeps its existing link/bucket as-is.
    Unchanged,
    /// A normal new version of this node, already saved.
    Node(Node<V>),
    /// This node collapsed: zero links, `bucket_size` entries left. The
    /// parent must either bubble this further up or splice it in as a
    /// bucket at its own slot for this child (`collapseInline`).
    Collapsed(Vec<(Vec<u8>, V)>),
}

fn check_cancel<E>(cancel: &CancelToken) -> Result<(), Error<E>> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

impl<V> Node<V> {
    pub(crate) fn empty(
        hash_alg: u64,
        hash_bytes: usize,
        bit_width: u32,
        bucket_size: u32,
        depth: u32,
    ) -> Self {
        Node {
            hash_alg,
            hash_bytes,
            bit_width,
            bucket_size,
            depth,
            bitmap: vec![0u8; bits::bitmap_len(bit_width)],
            data: Vec::new(),
            id: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        hash_alg: u64,
        hash_bytes: usize,
        bit_width: u32,
        bucket_size: u32,
        depth: u32,
        bitmap: Vec<u8>,
        data: Vec<Element<V>>,
        id: Option<Cid>,
    ) -> Self {
        Node {
            hash_alg,
            hash_bytes,
            bit_width,
            bucket_size,
            depth,
            bitmap,
            data,
            id,
        }
    }

    /// The identifier returned by the store after the most recent save.
    /// `None` only for a node hydrated via `from_serializable` that was
    /// never itself saved.
    pub fn id(&self) -> Option<Cid> {
        self.id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    pub fn hash_alg(&self) -> u64 {
        self.hash_alg
    }

    /// Number of key/value pairs held directly in this node's own
    /// buckets (not counting anything behind a link).
    pub fn direct_entry_count(&self) -> usize {
        self.data.iter().map(Element::bucket_len).sum()
    }

    /// Number of links to child nodes held directly in this node.
    pub fn direct_node_count(&self) -> usize {
        self.data
            .iter()
            .filter(|e| matches!(e, Element::Link(_)))
            .count()
    }

    pub(crate) fn max_depth(&self) -> u32 {
        (self.hash_bytes as u32 * 8) / self.bit_width
    }

    fn has_no_links(&self) -> bool {
        self.data.iter().all(|e| matches!(e, Element::Bucket(_)))
    }

    fn total_entries(&self) -> usize {
        self.data.iter().map(Element::bucket_len).sum()
    }

    fn slot<E>(&self, hash: &[u8]) -> Result<u32, Error<E>> {
        bits::mask(hash, self.depth, self.bit_width).ok_or(Error::DepthExhausted {
            depth: self.depth,
            max_depth: self.max_depth(),
        })
    }

    fn rebuilt(&self, bitmap: Vec<u8>, data: Vec<Element<V>>) -> Node<V> {
        Node {
            hash_alg: self.hash_alg,
            hash_bytes: self.hash_bytes,
            bit_width: self.bit_width,
            bucket_size: self.bucket_size,
            depth: self.depth,
            bitmap,
            data,
            id: None,
        }
    }

    /// Canonical encoding of this node in isolation, usable with
    /// [`crate::from_serializable`] or handed to an out-of-band store.
    pub fn to_serializable(&self) -> Vec<u8>
    where
        V: Serialize + Clone,
    {
        let result = if self.depth == 0 {
            wire::encode_root::<V, std::convert::Infallible>(
                self.hash_alg,
                self.bucket_size,
                &self.bitmap,
                &self.data,
            )
        } else {
            wire::encode_non_root::<V, std::convert::Infallible>(&self.bitmap, &self.data)
        };
        result.expect("encoding an in-memory node never fails")
    }
}

impl<V> Node<V>
where
    V: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    async fn hash_key<E>(&self, key: &[u8]) -> Result<Vec<u8>, Error<E>> {
        let entry = crate::hasher::lookup(self.hash_alg)
            .ok_or_else(|| Error::config(format!("unregistered hash_alg {}", self.hash_alg)))?;
        let hash = entry.hasher.hash(key).await;
        if hash.len() != self.hash_bytes {
            return Err(Error::bug(format!(
                "hasher for hash_alg {} produced {} bytes, expected {}",
                self.hash_alg,
                hash.len(),
                self.hash_bytes
            )));
        }
        Ok(hash)
    }

    pub(crate) async fn save_root<S: Store>(
        self,
        store: &S,
        cancel: &CancelToken,
    ) -> Result<Node<V>, Error<S::Error>> {
        self.save(store, cancel).await
    }

    async fn save<S: Store>(self, store: &S, cancel: &CancelToken) -> Result<Node<V>, Error<S::Error>> {
        check_cancel(cancel)?;
        let bytes = if self.depth == 0 {
            wire::encode_root(self.hash_alg, self.bucket_size, &self.bitmap, &self.data)?
        } else {
            wire::encode_non_root(&self.bitmap, &self.data)?
        };
        let id = store.save(bytes, cancel).await.map_err(Error::Store)?;
        trace!("hamt node saved at depth {}: {}", self.depth, id);
        Ok(Node {
            id: Some(id),
            ..self
        })
    }

    async fn load_child<S: Store>(
        &self,
        store: &S,
        cid: Cid,
        cancel: &CancelToken,
    ) -> Result<Node<V>, Error<S::Error>> {
        check_cancel(cancel)?;
        let bytes = store.load(&cid, cancel).await.map_err(Error::Store)?;
        let decoded = wire::decode_non_root::<V, S::Error>(&bytes)?;
        let bit_width = wire::bit_width_from_bitmap_len(decoded.bitmap.len())?;
        if bit_width != self.bit_width {
            return Err(Error::serialization(format!(
                "child at {cid} has bit_width {bit_width}, tree uses {}",
                self.bit_width
            )));
        }
        Ok(Node {
            hash_alg: self.hash_alg,
            hash_bytes: self.hash_bytes,
            bit_width: self.bit_width,
            bucket_size: self.bucket_size,
            depth: self.depth + 1,
            bitmap: decoded.bitmap,
            data: decoded.data,
            id: Some(cid),
        })
    }

    /// Hydrates a child of this node from already-fetched bytes, without
    /// going through a store's `load`. The child inherits this node's
    /// `hash_alg`/`bit_width`/`bucket_size` and sits one depth deeper; it
    /// has no recorded id since the caller, not a store, produced the
    /// bytes.
    pub fn from_child_serializable<E>(&self, bytes: &[u8]) -> Result<Node<V>, Error<E>> {
        let decoded = wire::decode_non_root::<V, E>(bytes)?;
        let bit_width = wire::bit_width_from_bitmap_len(decoded.bitmap.len())?;
        if bit_width != self.bit_width {
            return Err(Error::serialization(format!(
                "child bit_width {bit_width} disagrees with tree bit_width {}",
                self.bit_width
            )));
        }
        Ok(Node {
            hash_alg: self.hash_alg,
            hash_bytes: self.hash_bytes,
            bit_width: self.bit_width,
            bucket_size: self.bucket_size,
            depth: self.depth + 1,
            bitmap: decoded.bitmap,
            data: decoded.data,
            id: None,
        })
    }

    /// Inserts or updates `key`. Returns the new root; `self` is
    /// untouched and its identifier remains valid.
    pub async fn set<S: Store>(
        &self,
        store: &S,
        key: &[u8],
        value: V,
        cancel: &CancelToken,
    ) -> Result<Node<V>, Error<S::Error>> {
        let hash = self.hash_key(key).await?;
        self.set_hashed(store, &hash, key, value, cancel).await
    }

    fn set_hashed<'a, S: Store>(
        &'a self,
        store: &'a S,
        hash: &'a [u8],
        key: &'a [u8],
        value: V,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Node<V>, Error<S::Error>>> {
        Box::pin(async move {
            check_cancel(cancel)?;
            let bitpos = self.slot(hash)?;

            if !bits::bitmap_has(&self.bitmap, bitpos) {
                let at = bits::index(&self.bitmap, bitpos);
                let mut data = self.data.clone();
                data.insert(at, Element::Bucket(vec![(key.to_vec(), value)]));
                let bitmap = bits::set_bit(&self.bitmap, bitpos, true);
                return self.rebuilt(bitmap, data).save(store, cancel).await;
            }

            let at = bits::index(&self.bitmap, bitpos);
            match &self.data[at] {
                Element::Bucket(entries) => {
                    if let Some(pos) = entries.iter().position(|(k, _)| k.as_slice() == key) {
                        if entries[pos].1 == value {
                            return Ok(self.clone());
                        }
                        let mut entries = entries.clone();
                        entries[pos].1 = value;
                        let mut data = self.data.clone();
                        data[at] = Element::Bucket(entries);
                        return self.rebuilt(self.bitmap.clone(), data).save(store, cancel).await;
                    }

                    if entries.len() < self.bucket_size as usize {
                        let mut entries = entries.clone();
                        entries.push((key.to_vec(), value));
                        entries.sort_by(|a, b| a.0.cmp(&b.0));
                        let mut data = self.data.clone();
                        data[at] = Element::Bucket(entries);
                        return self.rebuilt(self.bitmap.clone(), data).save(store, cancel).await;
                    }

                    // Bucket is full: split into a child node one level deeper,
                    // then retry the insert through the freshly-created link.
                    let next_depth = self.depth + 1;
                    if next_depth > self.max_depth() {
                        return Err(Error::DepthExhausted {
                            depth: next_depth,
                            max_depth: self.max_depth(),
                        });
                    }
                    debug!("hamt bucket split at depth {} bitpos {}", self.depth, bitpos);
                    let mut child = Node::empty(
                        self.hash_alg,
                        self.hash_bytes,
                        self.bit_width,
                        self.bucket_size,
                        next_depth,
                    )
                    .save(store, cancel)
                    .await?;
                    for (k, v) in entries {
                        child = child.set(store, k, v.clone(), cancel).await?;
                    }
                    let mut data = self.data.clone();
                    data[at] = Element::Link(child.id.expect("just saved"));
                    let relinked = self.rebuilt(self.bitmap.clone(), data);
                    relinked.set_hashed(store, hash, key, value, cancel).await
                }
                Element::Link(cid) => {
                    let cid = *cid;
                    let child = self.load_child(store, cid, cancel).await?;
                    let new_child = child.set_hashed(store, hash, key, value, cancel).await?;
                    let new_id = new_child.id.expect("set always saves");
                    if store.is_equal(&new_id, &cid) {
                        return Ok(self.clone());
                    }
                    let mut data = self.data.clone();
                    data[at] = Element::Link(new_id);
                    self.rebuilt(self.bitmap.clone(), data).save(store, cancel).await
                }
            }
        })
    }

    /// Looks up `key`. `Ok(None)` is a plain miss, not an error.
    pub async fn get<S: Store>(
        &self,
        store: &S,
        key: &[u8],
        cancel: &CancelToken,
    ) -> Result<Option<V>, Error<S::Error>> {
        let hash = self.hash_key(key).await?;
        self.get_hashed(store, &hash, key, cancel).await
    }

    fn get_hashed<'a, S: Store>(
        &'a self,
        store: &'a S,
        hash: &'a [u8],
        key: &'a [u8],
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Option<V>, Error<S::Error>>> {
        Box::pin(async move {
            check_cancel(cancel)?;
            let bitpos = self.slot(hash)?;
            if !bits::bitmap_has(&self.bitmap, bitpos) {
                return Ok(None);
            }
            let at = bits::index(&self.bitmap, bitpos);
            match &self.data[at] {
                Element::Bucket(entries) => {
                    Ok(entries.iter().find(|(k, _)| k.as_slice() == key).map(|(_, v)| v.clone()))
                }
                Element::Link(cid) => {
                    let child = self.load_child(store, *cid, cancel).await?;
                    child.get_hashed(store, hash, key, cancel).await
                }
            }
        })
    }

    /// `get(...).is_some()`.
    pub async fn has<S: Store>(
        &self,
        store: &S,
        key: &[u8],
        cancel: &CancelToken,
    ) -> Result<bool, Error<S::Error>> {
        Ok(self.get(store, key, cancel).await?.is_some())
    }

    /// Removes `key`, if present. Returns the new root; if the key was
    /// absent, returns a node identical to (and with the same identifier
    /// as) `self`.
    pub async fn delete<S: Store>(
        &self,
        store: &S,
        key: &[u8],
        cancel: &CancelToken,
    ) -> Result<Node<V>, Error<S::Error>> {
        let hash = self.hash_key(key).await?;
        match self.delete_hashed(store, &hash, key, cancel).await? {
            DeleteOutcome::Unchanged => Ok(self.clone()),
            DeleteOutcome::Node(n) => Ok(n),
            DeleteOutcome::Collapsed(entries) => {
                // Only reachable at the true root: a child can only bubble
                // a collapse up to a parent that has no other entries, and
                // the root is where that chain necessarily terminates.
                debug!("hamt root absorbed fully collapsed subtree");
                let bitpos = self.slot::<S::Error>(&hash)?;
                let mut bitmap = vec![0u8; bits::bitmap_len(self.bit_width)];
                bitmap = bits::set_bit(&bitmap, bitpos, true);
                self.rebuilt(bitmap, vec![Element::Bucket(entries)])
                    .save(store, cancel)
                    .await
            }
        }
    }

    fn delete_hashed<'a, S: Store>(
        &'a self,
        store: &'a S,
        hash: &'a [u8],
        key: &'a [u8],
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<DeleteOutcome<V>, Error<S::Error>>> {
        Box::pin(async move {
            check_cancel(cancel)?;
            let bitpos = self.slot(hash)?;
            if !bits::bitmap_has(&self.bitmap, bitpos) {
                return Ok(DeleteOutcome::Unchanged);
            }
            let at = bits::index(&self.bitmap, bitpos);

            match &self.data[at] {
                Element::Bucket(entries) => {
                    let Some(pos) = entries.iter().position(|(k, _)| k.as_slice() == key) else {
                        return Ok(DeleteOutcome::Unchanged);
                    };

                    if self.depth > 0
                        && self.has_no_links()
                        && self.total_entries() == self.bucket_size as usize + 1
                    {
                        debug!("hamt node collapsing upward at depth {}", self.depth);
                        let mut remaining = Vec::with_capacity(self.bucket_size as usize);
                        for (i, e) in self.data.iter().enumerate() {
                            if let Element::Bucket(es) = e {
                                for (j, entry) in es.iter().enumerate() {
                                    if i == at && j == pos {
                                        continue;
                                    }
                                    remaining.push(entry.clone());
                                }
                            }
                        }
                        remaining.sort_by(|a, b| a.0.cmp(&b.0));
                        return Ok(DeleteOutcome::Collapsed(remaining));
                    }

                    let mut data = self.data.clone();
                    if entries.len() == 1 {
                        data.remove(at);
                        let bitmap = bits::set_bit(&self.bitmap, bitpos, false);
                        let saved = self.rebuilt(bitmap, data).save(store, cancel).await?;
                        Ok(DeleteOutcome::Node(saved))
                    } else {
                        let mut entries = entries.clone();
                        entries.remove(pos);
                        data[at] = Element::Bucket(entries);
                        let saved = self.rebuilt(self.bitmap.clone(), data).save(store, cancel).await?;
                        Ok(DeleteOutcome::Node(saved))
                    }
                }
                Element::Link(cid) => {
                    let cid = *cid;
                    let child = self.load_child(store, cid, cancel).await?;
                    match child.delete_hashed(store, hash, key, cancel).await? {
                        DeleteOutcome::Unchanged => Ok(DeleteOutcome::Unchanged),
                        DeleteOutcome::Collapsed(entries) => {
                            if self.data.len() == 1 && self.total_entries() == 0 {
                                // This node itself now holds nothing but the
                                // collapsed child: bubble it up as-is.
                                Ok(DeleteOutcome::Collapsed(entries))
                            } else {
                                debug!("hamt inline collapse at depth {}", self.depth);
                                let mut data = self.data.clone();
                                data[at] = Element::Bucket(entries);
                                let saved =
                                    self.rebuilt(self.bitmap.clone(), data).save(store, cancel).await?;
                                Ok(DeleteOutcome::Node(saved))
                            }
                        }
                        DeleteOutcome::Node(new_child) => {
                            let new_id = new_child.id.expect("delete always saves on change");
                            if store.is_equal(&new_id, &cid) {
                                return Ok(DeleteOutcome::Unchanged);
                            }
                            let mut data = self.data.clone();
                            data[at] = Element::Link(new_id);
                            let saved = self.rebuilt(self.bitmap.clone(), data).save(store, cancel).await?;
                            Ok(DeleteOutcome::Node(saved))
                        }
                    }
                }
            }
        })
    }

    /// Total number of key/value pairs reachable from this node.
    pub fn size<'a, S: Store>(
        &'a self,
        store: &'a S,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<u64, Error<S::Error>>> {
        Box::pin(async move {
            check_cancel(cancel)?;
            let mut total = 0u64;
            for e in &self.data {
                match e {
                    Element::Bucket(entries) => total += entries.len() as u64,
                    Element::Link(cid) => {
                        let child = self.load_child(store, *cid, cancel).await?;
                        total += child.size(store, cancel).await?;
                    }
                }
            }
            Ok(total)
        })
    }

    /// Asynchronous structural self-test (§4.9): not a hot-path operation,
    /// intended for test suites and debugging. `false` signals a bug in
    /// this implementation, not a caller mistake.
    pub fn is_invariant<'a, S: Store>(
        &'a self,
        store: &'a S,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<bool, Error<S::Error>>> {
        Box::pin(async move {
            check_cancel(cancel)?;
            if self.data.len() != bits::popcount(&self.bitmap) {
                return Ok(false);
            }
            for e in &self.data {
                if let Element::Bucket(entries) = e {
                    if entries.is_empty() || entries.len() > self.bucket_size as usize {
                        return Ok(false);
                    }
                    if !entries.windows(2).all(|w| w[0].0 < w[1].0) {
                        return Ok(false);
                    }
                }
            }
            if self.depth > 0 && self.has_no_links() && self.total_entries() <= self.bucket_size as usize
            {
                return Ok(false);
            }
            if self.depth > self.max_depth() {
                return Ok(false);
            }
            for e in &self.data {
                if let Element::Link(cid) = e {
                    let child = self.load_child(store, *cid, cancel).await?;
                    if child.depth != self.depth + 1 {
                        return Ok(false);
                    }
                    if !child.is_invariant(store, cancel).await? {
                        return Ok(false);
                    }
                }
            }
            Ok(true)
        })
    }
}
