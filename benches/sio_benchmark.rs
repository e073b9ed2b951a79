use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use sio_rs::sio::{KeyFlags, Session, SessionConfig, SortKey, sort_records};

const RECORD_LENGTH: usize = 32;

/// Pseudo-random 32-byte records: a 10-digit key, a 6-digit number, padding.
fn make_records(count: usize) -> Vec<u8> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut data = Vec::with_capacity(count * RECORD_LENGTH);
    for i in 0..count {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let rec = format!(
            "{:010}{:>6}{:016}",
            (state >> 33) % 10_000_000_000,
            (state >> 13) % 1_000_000,
            i
        );
        data.extend_from_slice(rec.as_bytes());
    }
    data
}

fn config(budget: usize, keys: Vec<SortKey>) -> SessionConfig {
    let dir = std::env::temp_dir();
    let mut cfg = SessionConfig::new(RECORD_LENGTH, keys);
    cfg.memory_budget = budget;
    cfg.working_dir = Some(dir);
    cfg
}

fn sort_all(data: &[u8], cfg: SessionConfig) -> u64 {
    let mut input = data.chunks_exact(RECORD_LENGTH);
    let mut sum = 0u64;
    let stats = sort_records(
        cfg,
        None,
        |slot| match input.next() {
            Some(rec) => {
                slot.copy_from_slice(rec);
                Ok(true)
            }
            None => Ok(false),
        },
        |rec| {
            sum = sum.wrapping_add(rec[0] as u64);
            Ok(())
        },
    )
    .unwrap();
    stats.records_out + sum
}

fn bench_in_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("sio_in_memory");
    for count in [10_000, 100_000] {
        let data = make_records(count);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("char_key", count),
            &data,
            |b, data| {
                b.iter(|| {
                    sort_all(
                        black_box(data),
                        config(64 << 20, vec![SortKey::ascending(0, 10)]),
                    )
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("numeric_key", count),
            &data,
            |b, data| {
                b.iter(|| {
                    sort_all(
                        black_box(data),
                        config(64 << 20, vec![SortKey::new(10, 16, KeyFlags::NUMERIC)]),
                    )
                })
            },
        );
    }
    group.finish();
}

fn bench_spilling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sio_spill");
    group.sample_size(10);
    let data = make_records(200_000);
    group.throughput(Throughput::Bytes(data.len() as u64));
    for budget_kb in [256, 1024] {
        group.bench_with_input(
            BenchmarkId::new("budget_kb", budget_kb),
            &data,
            |b, data| {
                b.iter(|| {
                    sort_all(
                        black_box(data),
                        config(budget_kb << 10, vec![SortKey::ascending(0, 10)]),
                    )
                })
            },
        );
    }
    group.finish();
}

fn bench_put_only(c: &mut Criterion) {
    let data = make_records(50_000);
    c.bench_function("sio_put_presorted", |b| {
        let mut sorted: Vec<&[u8]> = data.chunks_exact(RECORD_LENGTH).collect();
        sorted.sort_by(|x, y| x[..10].cmp(&y[..10]));
        b.iter(|| {
            let mut s = Session::init(config(64 << 20, vec![SortKey::ascending(0, 10)]), None)
                .unwrap();
            for rec in &sorted {
                s.put_slot().copy_from_slice(rec);
                s.put_commit().unwrap();
            }
            black_box(s.stats().internal_sorts)
        })
    });
}

criterion_group!(benches, bench_in_memory, bench_spilling, bench_put_only);
criterion_main!(benches);
