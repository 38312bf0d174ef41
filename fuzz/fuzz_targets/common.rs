// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use arbitrary::Arbitrary;
use chamt::{create, CancelToken, Config, MemoryStore};

#[derive(Debug, Arbitrary)]
pub struct Operation {
    key: u64,
    method: Method,
}

#[derive(Debug, Arbitrary)]
pub enum Method {
    Insert(u64),
    Remove,
    Get,
}

pub fn run(operations: Vec<Operation>, conf: Config) {
    async_std::task::block_on(async move {
        let store = MemoryStore::new();
        let cancel = CancelToken::new();
        let mut root = match create(&store, conf, &cancel).await {
            Ok(root) => root,
            // An `Arbitrary`-generated `Config` can be out of bounds; that's
            // a validation error, not a fuzz finding.
            Err(_) => return,
        };
        let mut oracle = ahash::AHashMap::new();

        for Operation { key, method } in operations {
            let key_bytes = key.to_be_bytes();
            match method {
                Method::Insert(v) => {
                    oracle.insert(key, v);
                    root = root.set(&store, &key_bytes, v, &cancel).await.unwrap();
                }
                Method::Remove => {
                    let expected = oracle.remove(&key);
                    let had = root.has(&store, &key_bytes, &cancel).await.unwrap();
                    assert_eq!(had, expected.is_some());
                    root = root.delete(&store, &key_bytes, &cancel).await.unwrap();
                }
                Method::Get => {
                    let expected = oracle.get(&key).copied();
                    let actual = root.get(&store, &key_bytes, &cancel).await.unwrap();
                    assert_eq!(actual, expected);
                }
            }
        }

        assert_eq!(root.size(&store, &cancel).await.unwrap() as usize, oracle.len());
        assert!(root.is_invariant(&store, &cancel).await.unwrap());
    });
}
