//! Benchmarks for method context serialization, lookup and archive indexing.
//!
//! - Serializing and parsing a context with a few hundred recorded queries
//! - Replaying token resolution from a large map
//! - Identity hashing
//! - Building a table of contents over an in-memory archive

extern crate superpmi;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use superpmi::prelude::*;

fn token(index: u32) -> ResolvedToken {
    ResolvedToken::new(
        ContextHandle(0x1000),
        ModuleHandle(0x2000),
        Token::new(0x0600_0000 | index),
        CorInfoTokenKind::METHOD,
    )
}

/// A context resembling a medium-sized method: 256 resolved tokens plus names and attributes.
fn busy_context() -> MethodContext {
    let mut mc = MethodContext::new();
    for index in 1..=256 {
        let handle = MethodHandle(0x10_0000 + index as usize * 8);
        let mut resolved = token(index);
        resolved.h_method = handle;
        resolved.method_spec = vec![0x0A, 0x01, (index & 0xFF) as u8];
        mc.rec_resolve_token(&resolved, 0);
        mc.rec_get_method_attribs(handle, index);
        mc.rec_get_method_name(handle, &format!("Method{index}"));
    }
    mc
}

fn bench_serialize(c: &mut Criterion) {
    let mc = busy_context();

    c.bench_function("mc_to_bytes", |b| {
        b.iter(|| black_box(mc.to_bytes().unwrap()));
    });
}

fn bench_parse(c: &mut Criterion) {
    let bytes = busy_context().to_bytes().unwrap();

    c.bench_function("mc_from_bytes", |b| {
        b.iter(|| black_box(MethodContext::from_bytes(black_box(&bytes)).unwrap()));
    });
}

fn bench_replay_lookup(c: &mut Criterion) {
    let mc = busy_context();

    c.bench_function("mc_rep_resolve_token", |b| {
        let mut index = 0;
        b.iter(|| {
            index = index % 256 + 1;
            let mut query = token(index);
            mc.rep_resolve_token(&mut query).unwrap();
            black_box(query.h_method)
        });
    });
}

fn bench_hash(c: &mut Criterion) {
    let bytes = busy_context().to_bytes().unwrap();

    c.bench_function("mc_hash", |b| {
        b.iter(|| black_box(MethodContextHash::of_bytes(black_box(&bytes))));
    });
}

fn bench_toc_build(c: &mut Criterion) {
    let record = busy_context().to_bytes().unwrap();
    let data: Vec<u8> = (0..500).flat_map(|_| record.iter().copied()).collect();
    let archive = Archive::from_mem(data);

    c.bench_function("toc_build_500", |b| {
        b.iter(|| black_box(TableOfContents::build(&archive).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_serialize,
    bench_parse,
    bench_replay_lookup,
    bench_hash,
    bench_toc_build
);
criterion_main!(benches);
