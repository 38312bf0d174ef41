// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Depth-first enumeration over a tree (§4.6).
//!
//! Collected into a `Vec` rather than exposed as a lazy stream: the store
//! is asynchronous, and a lazy cursor would need to hold live borrows
//! across an arbitrary number of in-flight loads for a data structure
//! whose whole point is that any node, including every intermediate one
//! visited along the way, is already cheaply addressable on its own.

use std::future::Future;
use std::pin::Pin;

use cid::Cid;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::element::Element;
use crate::error::Error;
use crate::node::Node;
use crate::store::{CancelToken, Store};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

impl<V> Node<V>
where
    V: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    /// All keys, depth-first, slot order. Local (per-bucket) order is
    /// lexicographic; no ordering is guaranteed across sibling subtrees.
    pub async fn keys<S: Store>(
        &self,
        store: &S,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<u8>>, Error<S::Error>> {
        Ok(self
            .entries(store, cancel)
            .await?
            .into_iter()
            .map(|(k, _)| k)
            .collect())
    }

    /// All values, in the same order as [`Node::keys`].
    pub async fn values<S: Store>(
        &self,
        store: &S,
        cancel: &CancelToken,
    ) -> Result<Vec<V>, Error<S::Error>> {
        Ok(self
            .entries(store, cancel)
            .await?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// Every key/value pair reachable from this node, depth-first.
    pub fn entries<'a, S: Store>(
        &'a self,
        store: &'a S,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Vec<(Vec<u8>, V)>, Error<S::Error>>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut out = Vec::new();
            for element in &self.data {
                match element {
                    Element::Bucket(entries) => out.extend(entries.iter().cloned()),
                    Element::Link(cid) => {
                        let child = self.load_child_for_iter(store, *cid, cancel).await?;
                        out.extend(child.entries(store, cancel).await?);
                    }
                }
            }
            Ok(out)
        })
    }

    /// This node's own id (if saved) followed depth-first by the id of
    /// every child reachable through a link. Useful for GC-style walks
    /// over everything a root pins in the store.
    pub fn ids<'a, S: Store>(
        &'a self,
        store: &'a S,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Vec<Cid>, Error<S::Error>>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut out = Vec::new();
            if let Some(id) = self.id {
                out.push(id);
            }
            for element in &self.data {
                if let Element::Link(cid) = element {
                    let child = self.load_child_for_iter(store, *cid, cancel).await?;
                    out.extend(child.ids(store, cancel).await?);
                }
            }
            Ok(out)
        })
    }

    async fn load_child_for_iter<S: Store>(
        &self,
        store: &S,
        cid: Cid,
        cancel: &CancelToken,
    ) -> Result<Node<V>, Error<S::Error>> {
        let bytes = store.load(&cid, cancel).await.map_err(Error::Store)?;
        let mut child = self.from_child_serializable(&bytes)?;
        child.id = Some(cid);
        Ok(child)
    }
}
