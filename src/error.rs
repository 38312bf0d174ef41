// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Errors that can occur while operating on a [`crate::Node`].
///
/// Generic over `E`, the backing [`crate::Store`]'s own error type, so that
/// a store failure can be threaded through without being swallowed or
/// wrapped in an opaque string.
#[derive(Debug, Error)]
pub enum Error<E> {
    /// `bit_width` outside `3..=16`, `bucket_size < 2`, or an unregistered
    /// `hash_alg`. Fatal at construction time; nothing is persisted.
    #[error("invalid HAMT configuration: {0}")]
    Config(String),

    /// Loaded bytes did not match the expected root/non-root shape, the
    /// bitmap length didn't agree with the declared `bit_width`, or a
    /// bucket/link slot decoded to neither shape.
    #[error("malformed HAMT node: {0}")]
    Serialization(String),

    /// `depth` exceeded `floor(hash_bytes * 8 / bit_width)`: the hash has
    /// been fully consumed and the tree cannot descend any further.
    #[error("hash exhausted at depth {depth} (max {max_depth})")]
    DepthExhausted { depth: u32, max_depth: u32 },

    /// Failure returned by the backing store's `save` or `load`.
    #[error("store error: {0}")]
    Store(E),

    /// A public operation's cancellation handle fired while a store call
    /// was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// An invariant that the implementation itself is responsible for
    /// upholding was violated. Always a bug, never a caller mistake.
    #[error("HAMT invariant violated: {0}")]
    Bug(String),
}

impl<E> Error<E> {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn serialization(msg: impl Into<String>) -> Self {
        Error::Serialization(msg.into())
    }

    pub(crate) fn bug(msg: impl Into<String>) -> Self {
        Error::Bug(msg.into())
    }
}
