// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! An immutable, asynchronous, content-addressed Hash Array Mapped Trie.
//!
//! Every [`Node`] is independently addressable through a caller-supplied
//! [`Store`]: nodes are never mutated in place, each [`Node::set`] or
//! [`Node::delete`] returns a brand new root while every previously
//! returned root remains valid and loadable, and two trees holding the
//! same logical key/value pairs always encode to the same bytes and
//! therefore the same id (§1, §2 of the design this crate implements).
//!
//! ```
//! # async_std::task::block_on(async {
//! use chamt::{create, Config, MemoryStore, CancelToken};
//!
//! let store = MemoryStore::new();
//! let cancel = CancelToken::new();
//! let root: chamt::Node<String> = create(&store, Config::default(), &cancel).await?;
//! let root = root.set(&store, b"foo", "bar".to_string(), &cancel).await?;
//! assert_eq!(root.get(&store, b"foo", &cancel).await?, Some("bar".to_string()));
//! # Ok::<(), chamt::Error<<MemoryStore as chamt::Store>::Error>>(())
//! # }).unwrap();
//! ```

mod bits;
mod config;
mod element;
mod error;
mod hamt;
mod hasher;
mod node;
mod store;
mod wire;

// Depth-first enumeration lives in its own module but extends `Node`
// directly; nothing further needs to be re-exported from it.
mod iter;

pub use config::{Config, DEFAULT_BIT_WIDTH, DEFAULT_BUCKET_SIZE};
pub use error::Error;
pub use hamt::{create, from_serializable, load};
pub use hasher::{register_hasher, register_identity_hasher, Hasher, IDENTITY_HASH_ALG, SHA2_256_HASH_ALG};
pub use node::Node;
pub use store::{CancelToken, MemoryStore, MemoryStoreError, Store, StoreStats, TrackingStore};
pub use wire::{is_root_serializable, is_serializable};
