// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The sum type stored at each occupied slot of a [`crate::Node`]: either a
//! sorted bucket of key/value pairs, or a link to a child node one level
//! deeper.

use cid::Cid;
use libipld_core::ipld::Ipld;
use libipld_core::serde::to_ipld;
use serde::de::{self, DeserializeOwned};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::ByteBuf;

/// One occupied slot's contents.
///
/// A slot never holds both a bucket and a link (invariant 2 in the spec
/// this crate implements): the two cases are mutually exclusive variants,
/// not optional fields on a shared struct.
#[derive(Debug, Clone)]
pub(crate) enum Element<V> {
    /// Entries sharing every hash-slice index down to this depth, sorted
    /// by raw key bytes. 1..=`bucket_size` entries long.
    Bucket(Vec<(Vec<u8>, V)>),
    /// A child node one level deeper.
    Link(Cid),
}

impl<V: PartialEq> PartialEq for Element<V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Element::Bucket(a), Element::Bucket(b)) => a == b,
            (Element::Link(a), Element::Link(b)) => a == b,
            _ => false,
        }
    }
}

impl<V> Element<V> {
    pub(crate) fn bucket_len(&self) -> usize {
        match self {
            Element::Bucket(entries) => entries.len(),
            Element::Link(_) => 0,
        }
    }
}

/// Serialize a bucket as `[[keyBytes, value], ...]`, matching the wire
/// shape the spec defines for a non-link slot.
impl<V: Serialize> Serialize for Element<V> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Element::Bucket(entries) => {
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for (key, value) in entries {
                    seq.serialize_element(&(ByteBuf::from(key.clone()), value))?;
                }
                seq.end()
            }
            Element::Link(cid) => cid.serialize(serializer),
        }
    }
}

/// Deserialize by shape: a `Cid` decodes as a [`Element::Link`], anything
/// else must be the bucket's array-of-pairs shape. This is the Rust
/// equivalent of the store's `is_link` predicate: the decision is made by
/// attempting each shape rather than by consulting a caller-supplied flag.
impl<'de, V: DeserializeOwned> Deserialize<'de> for Element<V> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ipld = Ipld::deserialize(deserializer)?;
        match ipld {
            Ipld::Link(cid) => Ok(Element::Link(cid)),
            Ipld::List(items) => {
                let mut entries = Vec::with_capacity(items.len());
                for item in items {
                    let (key, value): (ByteBuf, V) =
                        Deserialize::deserialize(item).map_err(de::Error::custom)?;
                    entries.push((key.into_vec(), value));
                }
                Ok(Element::Bucket(entries))
            }
            other => Err(de::Error::custom(format!(
                "expected a link or a bucket array, got {other:?}"
            ))),
        }
    }
}

/// Converts a single key/value pair to the `Ipld` shape used by
/// [`crate::wire::is_serializable`] to sanity-check hand-built nodes
/// without requiring `V: DeserializeOwned`.
pub(crate) fn entry_to_ipld<V: Serialize>(key: &[u8], value: &V) -> Result<Ipld, String> {
    let value = to_ipld(value).map_err(|e| e.to_string())?;
    Ok(Ipld::List(vec![
        Ipld::Bytes(key.to_vec()),
        value,
    ]))
}
