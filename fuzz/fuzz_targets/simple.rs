// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

#![no_main]
use chamt::Config;
use libfuzzer_sys::fuzz_target;

mod common;

fuzz_target!(|data: Vec<common::Operation>| {
    let conf = Config {
        bit_width: 5,
        ..Default::default()
    };
    common::run(data, conf);
});
