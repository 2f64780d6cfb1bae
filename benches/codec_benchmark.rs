use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use bytes::BytesMut;
use fanout::core::codec::{decode, encode};
use fanout::core::filter::SubscriptionFilter;
use fanout::transport::frame::{encode_frame, try_decode_frame};

fn bench_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_codec");

    for &size in [16usize, 1024, 64 * 1024].iter() {
        let payload = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &payload, |b, payload| {
            b.iter(|| black_box(encode(black_box("Weather"), payload).unwrap()));
        });

        let message = encode("Weather", &payload).unwrap();
        group.bench_with_input(BenchmarkId::new("decode", size), &message, |b, message| {
            b.iter(|| black_box(decode(black_box(message)).unwrap()));
        });
    }
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut filter = SubscriptionFilter::new();
    for topic in ["Technology", "Weather", "Finance", "Sport", "Politics"] {
        filter.add_interest(topic).unwrap();
    }
    let hit = encode("Finance", "Message for Finance").unwrap();
    let miss = encode("Travel", "Message for Travel").unwrap();

    c.bench_function("filter_accepts_hit", |b| {
        b.iter(|| black_box(filter.accepts(black_box(&hit))))
    });
    c.bench_function("filter_accepts_miss", |b| {
        b.iter(|| black_box(filter.accepts(black_box(&miss))))
    });
}

fn bench_framing(c: &mut Criterion) {
    let message = encode("Technology", vec![0u8; 512]).unwrap();
    let mut group = c.benchmark_group("length_prefix");
    group.throughput(Throughput::Elements(64));

    group.bench_function("encode_decode_64_frames", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(64 * (message.len() + 4));
            for _ in 0..64 {
                encode_frame(&message, &mut buf).unwrap();
            }
            let mut count = 0;
            while let Some(frame) = try_decode_frame(&mut buf).unwrap() {
                black_box(frame);
                count += 1;
            }
            assert_eq!(count, 64);
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode_decode, bench_filter, bench_framing);
criterion_main!(benches);
