//! Benchmarks for message encode/decode.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use kshell_proto::{Message, Protocol};

fn build(params: usize, payload: usize) -> Message {
    let mut msg = Protocol::new(0xC0FFEE01, 1, 0).message(7, 0, 42);
    let data = vec![0xA5u8; payload];
    for i in 0..params {
        msg.add_param(i as u16, &data).unwrap();
    }
    msg
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for (params, payload) in [(1, 16), (16, 64), (64, 4096)] {
        let msg = build(params, payload);
        let label = format!("{params}x{payload}");

        group.bench_function(BenchmarkId::new("to_bytes", &label), |b| {
            b.iter(|| msg.to_bytes());
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let proto = Protocol::new(0xC0FFEE01, 1, 0);

    for (params, payload) in [(1, 16), (16, 64), (64, 4096)] {
        let bytes = build(params, payload).to_bytes();
        let label = format!("{params}x{payload}");

        group.bench_function(BenchmarkId::new("decode", &label), |b| {
            b.iter(|| Message::decode(&bytes, &proto).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
