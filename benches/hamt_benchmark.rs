// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use chamt::{create, load, CancelToken, Config, MemoryStore};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde::{Deserialize, Serialize};

const ITEM_COUNT: u8 = 40;

const TEST_CONFIG: Config = Config {
    hash_alg: chamt::SHA2_256_HASH_ALG,
    bit_width: 5,
    bucket_size: 3,
};

// Struct to simulate a reasonable amount of data per value in the tree.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
struct BenchData {
    v1: Vec<u8>,
    v2: Vec<u8>,
    v3: Vec<u8>,
    v: u64,
    a: [u8; 32],
    a2: [u8; 32],
}

impl BenchData {
    fn new(val: u8) -> Self {
        Self {
            v1: vec![val; 8],
            v2: vec![val; 20],
            v3: vec![val; 10],
            v: 8,
            a: [val; 32],
            a2: [val; 32],
        }
    }
}

fn insert(c: &mut Criterion) {
    c.bench_function("chamt bulk insert (no reload)", |b| {
        b.iter(|| {
            async_std::task::block_on(async {
                let store = MemoryStore::new();
                let cancel = CancelToken::new();
                let mut root = create::<_, BenchData>(&store, TEST_CONFIG, &cancel).await.unwrap();

                for i in 0..black_box(ITEM_COUNT) {
                    root = root
                        .set(&store, black_box(&vec![i; 20]), black_box(BenchData::new(i)), &cancel)
                        .await
                        .unwrap();
                }
            })
        })
    });
}

fn insert_load_reload(c: &mut Criterion) {
    c.bench_function("chamt bulk insert with save and reload per step", |b| {
        b.iter(|| {
            async_std::task::block_on(async {
                let store = MemoryStore::new();
                let cancel = CancelToken::new();
                let empty = create::<_, BenchData>(&store, TEST_CONFIG, &cancel).await.unwrap();
                let mut id = empty.id().unwrap();

                for i in 0..black_box(ITEM_COUNT) {
                    let root = load::<_, BenchData>(&store, &id, 0, None, &cancel).await.unwrap();
                    let root = root
                        .set(&store, black_box(&vec![i; 20]), black_box(BenchData::new(i)), &cancel)
                        .await
                        .unwrap();
                    id = root.id().unwrap();
                }
            })
        })
    });
}

fn delete(c: &mut Criterion) {
    let store = MemoryStore::new();
    let cancel = CancelToken::new();
    let root_id = async_std::task::block_on(async {
        let mut root = create::<_, BenchData>(&store, TEST_CONFIG, &cancel).await.unwrap();
        for i in 0..ITEM_COUNT {
            root = root.set(&store, &vec![i; 20], BenchData::new(i), &cancel).await.unwrap();
        }
        root.id().unwrap()
    });

    c.bench_function("chamt deleting all entries", |b| {
        b.iter(|| {
            async_std::task::block_on(async {
                let mut root = load::<_, BenchData>(&store, &root_id, 0, None, &cancel).await.unwrap();
                for i in 0..black_box(ITEM_COUNT) {
                    root = root.delete(&store, black_box(&vec![i; 20]), &cancel).await.unwrap();
                }
            })
        })
    });
}

fn enumerate(c: &mut Criterion) {
    let store = MemoryStore::new();
    let cancel = CancelToken::new();
    let root_id = async_std::task::block_on(async {
        let mut root = create::<_, BenchData>(&store, TEST_CONFIG, &cancel).await.unwrap();
        for i in 0..ITEM_COUNT {
            root = root.set(&store, &vec![i; 20], BenchData::new(i), &cancel).await.unwrap();
        }
        root.id().unwrap()
    });

    c.bench_function("chamt entries enumeration", |b| {
        b.iter(|| {
            async_std::task::block_on(async {
                let root = load::<_, BenchData>(&store, &root_id, 0, None, &cancel).await.unwrap();
                black_box(root.entries(&store, &cancel).await.unwrap());
            })
        })
    });
}

criterion_group!(benches, insert, insert_load_reload, delete, enumerate);
criterion_main!(benches);
