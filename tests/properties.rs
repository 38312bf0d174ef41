// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! `quickcheck` properties for the canonicalisation and round-trip
//! invariants in §8 of the design this crate implements.

use std::collections::HashMap;

use chamt::{create, CancelToken, Config, MemoryStore, Node};
use quickcheck::{Arbitrary, Gen, TestResult};
use quickcheck_macros::quickcheck;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Keys drawn from a small alphabet so the tree actually branches and
/// collides within a reasonable number of quickcheck iterations, and so
/// shrinking stays legible.
#[derive(Clone, Debug)]
struct SmallKey(Vec<u8>);

impl Arbitrary for SmallKey {
    fn arbitrary(g: &mut Gen) -> Self {
        let len = 1 + (u8::arbitrary(g) % 3);
        SmallKey((0..len).map(|_| u8::arbitrary(g) % 6).collect())
    }
}

async fn build(pairs: &[(SmallKey, u8)]) -> (MemoryStore, CancelToken, Node<u8>) {
    let store = MemoryStore::new();
    let cancel = CancelToken::new();
    let mut root = create(&store, Config::default(), &cancel).await.unwrap();
    for (k, v) in pairs {
        root = root.set(&store, &k.0, *v, &cancel).await.unwrap();
    }
    (store, cancel, root)
}

// Property 1: canonicalisation. The same logical set of pairs, inserted
// in any order, produces the same root id.
#[quickcheck]
fn canonical_regardless_of_insertion_order(pairs: Vec<(SmallKey, u8)>, seed: u64) -> TestResult {
    if pairs.len() > 16 {
        return TestResult::discard();
    }
    async_std::task::block_on(async {
        let (_store_a, _cancel_a, root_a) = build(&pairs).await;

        let mut shuffled = pairs.clone();
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        shuffled.shuffle(&mut rng);
        let (_store_b, _cancel_b, root_b) = build(&shuffled).await;

        TestResult::from_bool(root_a.id() == root_b.id())
    })
}

// Property 2: delete(set(M,k,v), k) == M when k was absent from M.
#[quickcheck]
fn deleting_a_fresh_insert_restores_original_root(
    pairs: Vec<(SmallKey, u8)>,
    key: SmallKey,
    value: u8,
) -> TestResult {
    if pairs.len() > 16 {
        return TestResult::discard();
    }
    async_std::task::block_on(async {
        let (store, cancel, root) = build(&pairs).await;
        if root.has(&store, &key.0, &cancel).await.unwrap() {
            return TestResult::discard();
        }
        let before = root.id();
        let inserted = root.set(&store, &key.0, value, &cancel).await.unwrap();
        let restored = inserted.delete(&store, &key.0, &cancel).await.unwrap();
        TestResult::from_bool(restored.id() == before)
    })
}

// Property 3: get(set(M,k,v), k) == v; re-applying the identical set is
// an identity operation (same resulting root id).
#[quickcheck]
fn set_then_get_and_idempotent_reset(pairs: Vec<(SmallKey, u8)>, key: SmallKey, value: u8) -> TestResult {
    if pairs.len() > 16 {
        return TestResult::discard();
    }
    async_std::task::block_on(async {
        let (store, cancel, root) = build(&pairs).await;
        let once = root.set(&store, &key.0, value, &cancel).await.unwrap();
        if once.get(&store, &key.0, &cancel).await.unwrap() != Some(value) {
            return TestResult::failed();
        }
        let twice = once.set(&store, &key.0, value, &cancel).await.unwrap();
        TestResult::from_bool(twice.id() == once.id())
    })
}

// Property 4: overwriting a key always surfaces the newest value.
#[quickcheck]
fn overwrite_then_get_sees_latest(pairs: Vec<(SmallKey, u8)>, key: SmallKey, v1: u8, v2: u8) -> TestResult {
    if pairs.len() > 16 {
        return TestResult::discard();
    }
    async_std::task::block_on(async {
        let (store, cancel, root) = build(&pairs).await;
        let root = root.set(&store, &key.0, v1, &cancel).await.unwrap();
        let root = root.set(&store, &key.0, v2, &cancel).await.unwrap();
        TestResult::from_bool(root.get(&store, &key.0, &cancel).await.unwrap() == Some(v2))
    })
}

// Property 5: size equals the number of distinct keys inserted (last
// write per key wins, matching a HashMap oracle).
#[quickcheck]
fn size_matches_distinct_key_count(pairs: Vec<(SmallKey, u8)>) -> TestResult {
    if pairs.len() > 16 {
        return TestResult::discard();
    }
    async_std::task::block_on(async {
        let (store, cancel, root) = build(&pairs).await;
        let mut oracle: HashMap<Vec<u8>, u8> = HashMap::new();
        for (k, v) in &pairs {
            oracle.insert(k.0.clone(), *v);
        }
        TestResult::from_bool(root.size(&store, &cancel).await.unwrap() as usize == oracle.len())
    })
}

// Property 6: a freshly built tree always reports its own invariants hold.
#[quickcheck]
fn built_trees_satisfy_is_invariant(pairs: Vec<(SmallKey, u8)>) -> TestResult {
    if pairs.len() > 16 {
        return TestResult::discard();
    }
    async_std::task::block_on(async {
        let (store, cancel, root) = build(&pairs).await;
        TestResult::from_bool(root.is_invariant(&store, &cancel).await.unwrap())
    })
}
