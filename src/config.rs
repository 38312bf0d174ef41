// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::error::Error;
use crate::hasher::SHA2_256_HASH_ALG;

/// Default bits of hash consumed per level (`2^8 = 256` slots per node).
pub const DEFAULT_BIT_WIDTH: u32 = 8;
/// Default maximum bucket occupancy before a slot splits into a child node.
pub const DEFAULT_BUCKET_SIZE: u32 = 5;

/// Per-tree configuration, fixed for the lifetime of a tree: every node of
/// a given root shares the same `hash_alg`/`bit_width`/`bucket_size`.
///
/// Only the root serialises this; non-root nodes inherit it from whichever
/// root the caller descended from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Identifier of a hasher registered via [`crate::register_hasher`].
    pub hash_alg: u64,
    /// Bits of hash consumed per level. Must be in `3..=16`.
    pub bit_width: u32,
    /// Maximum entries tolerated at a single slot before it splits into a
    /// child node. Must be `>= 2`.
    pub bucket_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hash_alg: SHA2_256_HASH_ALG,
            bit_width: DEFAULT_BIT_WIDTH,
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

impl Config {
    /// Checks `bit_width`/`bucket_size` bounds and that `hash_alg` is
    /// registered, returning the hasher's declared `hash_bytes`.
    pub(crate) fn validate<E>(&self) -> Result<usize, Error<E>> {
        if !(3..=16).contains(&self.bit_width) {
            return Err(Error::config(format!(
                "bit_width must be in 3..=16, got {}",
                self.bit_width
            )));
        }
        if self.bucket_size < 2 {
            return Err(Error::config(format!(
                "bucket_size must be >= 2, got {}",
                self.bucket_size
            )));
        }
        crate::hasher::lookup(self.hash_alg)
            .map(|entry| entry.hash_bytes)
            .ok_or_else(|| Error::config(format!("unregistered hash_alg {}", self.hash_alg)))
    }

    /// `floor(hash_bytes * 8 / bit_width)`: the deepest depth this tree
    /// can reach before the hash is exhausted.
    pub(crate) fn max_depth(&self, hash_bytes: usize) -> u32 {
        (hash_bytes as u32 * 8) / self.bit_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate::<()>().is_ok());
    }

    #[test]
    fn rejects_bit_width_out_of_range() {
        let cfg = Config {
            bit_width: 2,
            ..Config::default()
        };
        assert!(cfg.validate::<()>().is_err());
        let cfg = Config {
            bit_width: 17,
            ..Config::default()
        };
        assert!(cfg.validate::<()>().is_err());
        // Both bounds of the documented range are accepted, resolving the
        // two-source disagreement noted in the spec's design notes in
        // favor of 16 (not a stale 8).
        let cfg = Config {
            bit_width: 16,
            ..Config::default()
        };
        assert!(cfg.validate::<()>().is_ok());
    }

    #[test]
    fn rejects_small_bucket_size() {
        let cfg = Config {
            bucket_size: 1,
            ..Config::default()
        };
        assert!(cfg.validate::<()>().is_err());
    }

    #[test]
    fn rejects_unregistered_hash_alg() {
        let cfg = Config {
            hash_alg: 0xdead_beef,
            ..Config::default()
        };
        assert!(cfg.validate::<()>().is_err());
    }
}
