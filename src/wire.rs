// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Canonical on-the-wire encodings.
//!
//! Root nodes carry the tree's configuration; non-root nodes don't, and
//! inherit it from whichever root the caller is descending from. Both
//! forms are encoded as canonical DAG-CBOR via `serde_ipld_dagcbor`, the
//! same codec family the rest of this ecosystem uses for CID-addressed
//! data: deterministic map-key and integer encoding is what makes
//! canonicalisation (identical logical state implies identical bytes)
//! hold in the first place.

use libipld_core::ipld::Ipld;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::element::Element;
use crate::error::Error;

#[derive(Serialize, Deserialize)]
struct RootWire<V> {
    #[serde(rename = "hashAlg")]
    hash_alg: u64,
    #[serde(rename = "bucketSize")]
    bucket_size: u32,
    hamt: (ByteBuf, Vec<Element<V>>),
}

type NonRootWire<V> = (ByteBuf, Vec<Element<V>>);

pub(crate) struct DecodedRoot<V> {
    pub(crate) hash_alg: u64,
    pub(crate) bucket_size: u32,
    pub(crate) bitmap: Vec<u8>,
    pub(crate) data: Vec<Element<V>>,
}

pub(crate) struct DecodedNode<V> {
    pub(crate) bitmap: Vec<u8>,
    pub(crate) data: Vec<Element<V>>,
}

/// Bits-of-bitmap -> `bit_width`, inverting [`crate::bits::bitmap_len`].
pub(crate) fn bit_width_from_bitmap_len<E>(len: usize) -> Result<u32, Error<E>> {
    let bits = len.checked_mul(8).ok_or_else(|| {
        Error::serialization("bitmap length overflow")
    })?;
    if !bits.is_power_of_two() {
        return Err(Error::serialization(format!(
            "bitmap length {len} does not correspond to a power-of-two slot count"
        )));
    }
    Ok(bits.trailing_zeros())
}

pub(crate) fn encode_root<V: Serialize + Clone, E>(
    hash_alg: u64,
    bucket_size: u32,
    bitmap: &[u8],
    data: &[Element<V>],
) -> Result<Vec<u8>, Error<E>> {
    let wire = RootWire {
        hash_alg,
        bucket_size,
        hamt: (ByteBuf::from(bitmap.to_vec()), data.to_vec()),
    };
    serde_ipld_dagcbor::to_vec(&wire)
        .map_err(|e| Error::serialization(format!("encoding root node: {e}")))
}

pub(crate) fn encode_non_root<V: Serialize + Clone, E>(
    bitmap: &[u8],
    data: &[Element<V>],
) -> Result<Vec<u8>, Error<E>> {
    let wire: NonRootWire<V> = (ByteBuf::from(bitmap.to_vec()), data.to_vec());
    serde_ipld_dagcbor::to_vec(&wire)
        .map_err(|e| Error::serialization(format!("encoding non-root node: {e}")))
}

pub(crate) fn decode_root<V: DeserializeOwned, E>(bytes: &[u8]) -> Result<DecodedRoot<V>, Error<E>> {
    let wire: RootWire<V> = serde_ipld_dagcbor::from_slice(bytes)
        .map_err(|e| Error::serialization(format!("decoding root node: {e}")))?;
    Ok(DecodedRoot {
        hash_alg: wire.hash_alg,
        bucket_size: wire.bucket_size,
        bitmap: wire.hamt.0.into_vec(),
        data: wire.hamt.1,
    })
}

pub(crate) fn decode_non_root<V: DeserializeOwned, E>(
    bytes: &[u8],
) -> Result<DecodedNode<V>, Error<E>> {
    let wire: NonRootWire<V> = serde_ipld_dagcbor::from_slice(bytes)
        .map_err(|e| Error::serialization(format!("decoding non-root node: {e}")))?;
    Ok(DecodedNode {
        bitmap: wire.0.into_vec(),
        data: wire.1,
    })
}

/// `x` decodes as `{hashAlg: integer, bucketSize: integer, hamt: [bitmap, elements]}`.
pub fn is_root_serializable(bytes: &[u8]) -> bool {
    let Ok(ipld) = serde_ipld_dagcbor::from_slice::<Ipld>(bytes) else {
        return false;
    };
    let Ipld::Map(map) = &ipld else { return false };
    let hash_alg_ok = matches!(map.get("hashAlg"), Some(Ipld::Integer(n)) if *n >= 0);
    let bucket_size_ok = matches!(map.get("bucketSize"), Some(Ipld::Integer(n)) if *n >= 0);
    hash_alg_ok && bucket_size_ok && matches!(map.get("hamt"), Some(inner) if node_shape_ok(inner))
}

/// `x` is either root-shaped, or the non-root `[bitmap, elements]` shape
/// with a byte-string first element and array second element.
pub fn is_serializable(bytes: &[u8]) -> bool {
    if is_root_serializable(bytes) {
        return true;
    }
    let Ok(ipld) = serde_ipld_dagcbor::from_slice::<Ipld>(bytes) else {
        return false;
    };
    node_shape_ok(&ipld)
}

fn node_shape_ok(ipld: &Ipld) -> bool {
    let Ipld::List(items) = ipld else { return false };
    if items.len() != 2 {
        return false;
    }
    matches!(items[0], Ipld::Bytes(_)) && matches!(items[1], Ipld::List(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_width_inference_matches_spec_table() {
        assert_eq!(bit_width_from_bitmap_len::<()>(1).unwrap(), 3);
        assert_eq!(bit_width_from_bitmap_len::<()>(32).unwrap(), 8);
        assert_eq!(bit_width_from_bitmap_len::<()>(8192).unwrap(), 16);
    }

    #[test]
    fn bit_width_inference_rejects_non_power_of_two() {
        assert!(bit_width_from_bitmap_len::<()>(3).is_err());
    }

    #[test]
    fn empty_root_roundtrips() {
        let bitmap = vec![0u8; 32];
        let data: Vec<Element<String>> = vec![];
        let bytes = encode_root::<String, ()>(SHA2_256, 5, &bitmap, &data).unwrap();
        assert!(is_root_serializable(&bytes));
        assert!(is_serializable(&bytes));
        let decoded: DecodedRoot<String> = decode_root(&bytes).unwrap();
        assert_eq!(decoded.hash_alg, SHA2_256);
        assert_eq!(decoded.bucket_size, 5);
        assert_eq!(decoded.bitmap, bitmap);
        assert!(decoded.data.is_empty());
    }

    const SHA2_256: u64 = 0x12;

    #[test]
    fn non_root_without_hamt_wrapper_is_serializable_but_not_root() {
        let bitmap = vec![0u8; 1];
        let data: Vec<Element<String>> = vec![];
        let bytes = encode_non_root::<String, ()>(&bitmap, &data).unwrap();
        assert!(!is_root_serializable(&bytes));
        assert!(is_serializable(&bytes));
    }

    #[test]
    fn garbage_bytes_are_not_serializable() {
        assert!(!is_serializable(b"not cbor at all, just garbage"));
    }
}
