// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transmit Window Throughput Benchmark
//!
//! Measures the cost of the producer hot path — `add()` churning through
//! the ring, evicting the trail once the window fills — and the repair
//! consumer hot path — `retransmit_push`/`retransmit_try_peek`/
//! `retransmit_remove_head` draining NAK-triggered repairs.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_precision_loss)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pgm_sender::buffer::PacketBuffer;
use pgm_sender::txw::TransmitWindow;
use std::hint::black_box as bb;

fn make_skb(tstamp_us: u64, sqn: u32) -> std::sync::Arc<PacketBuffer> {
    let skb = PacketBuffer::new(1500, 32, tstamp_us);
    skb.put(1400);
    skb.set_sequence(sqn);
    skb
}

fn bench_add_steady_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("txw_add");

    for capacity in [64usize, 1024, 8192] {
        let txw = TransmitWindow::new(capacity);
        // Warm the ring up to capacity so every further add evicts a trail.
        for i in 0..capacity as u32 {
            txw.add(make_skb(0, i));
        }

        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            let mut next = capacity as u32;
            b.iter(|| {
                let skb = make_skb(0, next);
                bb(txw.add(skb));
                next = next.wrapping_add(1);
            });
        });
    }

    group.finish();
}

fn bench_peek(c: &mut Criterion) {
    let mut group = c.benchmark_group("txw_peek");

    let capacity = 4096usize;
    let txw = TransmitWindow::new(capacity);
    for i in 0..capacity as u32 {
        txw.add(make_skb(0, i));
    }

    group.bench_function("peek_recent", |b| {
        b.iter(|| bb(txw.peek(bb(txw.lead()))));
    });

    group.finish();
}

fn bench_retransmit_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("txw_retransmit_cycle");

    let capacity = 4096usize;
    let txw = TransmitWindow::new(capacity);
    for i in 0..capacity as u32 {
        txw.add(make_skb(0, i));
    }

    group.bench_function("push_peek_remove", |b| {
        let mut sqn = 0u32;
        b.iter(|| {
            txw.retransmit_push(bb(sqn % capacity as u32), false, 0);
            let peeked = txw.retransmit_try_peek();
            bb(&peeked);
            txw.retransmit_remove_head();
            sqn = sqn.wrapping_add(1);
        });
    });

    group.finish();
}

criterion_group!(
    txw_benches,
    bench_add_steady_state,
    bench_peek,
    bench_retransmit_cycle
);
criterion_main!(txw_benches);
