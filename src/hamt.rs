// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Root-level entry points (§6.3): creating a fresh tree, loading an
//! existing one by id, and hydrating one from bytes the caller already
//! has in hand.

use cid::Cid;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::error::Error;
use crate::node::Node;
use crate::store::{CancelToken, Store};
use crate::wire;

/// Saves a fresh, empty root under `config` and returns it.
pub async fn create<S: Store, V>(
    store: &S,
    config: Config,
    cancel: &CancelToken,
) -> Result<Node<V>, Error<S::Error>>
where
    V: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    let hash_bytes = config.validate()?;
    let empty = Node::empty(config.hash_alg, hash_bytes, config.bit_width, config.bucket_size, 0);
    empty.save_root(store, cancel).await
}

/// Loads the node at `id`. At `depth` 0 (the default — a genuine root),
/// the tree's own `config` is recovered from the encoded bytes and
/// `config` is ignored if given. At depth > 0, `config` must be supplied:
/// a non-root encoding carries no configuration of its own.
pub async fn load<S: Store, V>(
    store: &S,
    id: &Cid,
    depth: u32,
    config: Option<Config>,
    cancel: &CancelToken,
) -> Result<Node<V>, Error<S::Error>>
where
    V: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let bytes = store.load(id, cancel).await.map_err(Error::Store)?;

    if depth == 0 {
        let decoded = wire::decode_root::<V, S::Error>(&bytes)?;
        let bit_width = wire::bit_width_from_bitmap_len(decoded.bitmap.len())?;
        let probe = Config {
            hash_alg: decoded.hash_alg,
            bit_width,
            bucket_size: decoded.bucket_size,
        };
        let hash_bytes = probe.validate()?;
        Ok(Node::from_parts(
            probe.hash_alg,
            hash_bytes,
            bit_width,
            probe.bucket_size,
            0,
            decoded.bitmap,
            decoded.data,
            Some(*id),
        ))
    } else {
        let config = config.ok_or_else(|| {
            Error::config("loading a non-root node requires an explicit config")
        })?;
        let hash_bytes = config.validate()?;
        let decoded = wire::decode_non_root::<V, S::Error>(&bytes)?;
        let bit_width = wire::bit_width_from_bitmap_len(decoded.bitmap.len())?;
        if bit_width != config.bit_width {
            return Err(Error::serialization(format!(
                "node at {id} has bit_width {bit_width}, config specifies {}",
                config.bit_width
            )));
        }
        Ok(Node::from_parts(
            config.hash_alg,
            hash_bytes,
            bit_width,
            config.bucket_size,
            depth,
            decoded.bitmap,
            decoded.data,
            Some(*id),
        ))
    }
}

/// Hydrates a node from `bytes` without touching the store. `id`, if
/// given, is attached as the node's own identifier (the caller vouches
/// that `bytes` really is what that id addresses); otherwise the node
/// behaves as freshly-built, unsaved data.
pub fn from_serializable<V>(
    id: Option<Cid>,
    bytes: &[u8],
    depth: u32,
    config: Option<Config>,
) -> Result<Node<V>, Error<std::convert::Infallible>>
where
    V: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    if depth == 0 {
        let decoded = wire::decode_root::<V, std::convert::Infallible>(bytes)?;
        let bit_width = wire::bit_width_from_bitmap_len(decoded.bitmap.len())?;
        let probe = Config {
            hash_alg: decoded.hash_alg,
            bit_width,
            bucket_size: decoded.bucket_size,
        };
        let hash_bytes = probe.validate()?;
        Ok(Node::from_parts(
            probe.hash_alg,
            hash_bytes,
            bit_width,
            probe.bucket_size,
            0,
            decoded.bitmap,
            decoded.data,
            id,
        ))
    } else {
        let config = config.ok_or_else(|| {
            Error::config("hydrating a non-root node requires an explicit config")
        })?;
        let hash_bytes = config.validate()?;
        let decoded = wire::decode_non_root::<V, std::convert::Infallible>(bytes)?;
        let bit_width = wire::bit_width_from_bitmap_len(decoded.bitmap.len())?;
        if bit_width != config.bit_width {
            return Err(Error::serialization(format!(
                "node has bit_width {bit_width}, config specifies {}",
                config.bit_width
            )));
        }
        Ok(Node::from_parts(
            config.hash_alg,
            hash_bytes,
            bit_width,
            config.bucket_size,
            depth,
            decoded.bitmap,
            decoded.data,
            id,
        ))
    }
}
