//! Benchmarks for the receive path
//!
//! Covers the per-byte cost of framing, 10-bit unpacking of signal payloads
//! and full decode of a realistic mixed stream.

use bioharness::test_utils::{
    DeviceTime, breathing_payload, ecg_payload, frame_bytes, hxm_beats, hxm_payload, pack_bits,
    summary_payload,
};
use bioharness::{FrameParser, Message, unpack_bits};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// One minute of traffic: ECG at 4 Hz packet rate, breathing and summary at 1 Hz
fn mixed_stream() -> Vec<u8> {
    let mut bytes = Vec::new();
    for second in 0..60u32 {
        let time = DeviceTime::new(2012, 6, 14, 36_000_000 + second * 1000);
        for quarter in 0..4u32 {
            let seq = (second * 4 + quarter) as u8;
            let raw: Vec<u16> = (0..63).map(|i| (i * 7 % 1024) as u16).collect();
            bytes.extend(frame_bytes(0x22, &ecg_payload(seq, time, &raw)));
        }
        bytes.extend(frame_bytes(0x21, &breathing_payload(second as u8, time, &[512; 18])));
        bytes.extend(frame_bytes(0x2B, &summary_payload(second as u8, time, 72, 160, 345, 10, 12, 80, 300, 90, 100)));
        let beats = hxm_beats(u64::from(second), |n| n * 1000);
        bytes.extend(frame_bytes(0x26, &hxm_payload(60, second as u8, beats, 0, 0, 0)));
    }
    bytes
}

fn bench_framing(c: &mut Criterion) {
    let bytes = mixed_stream();

    let mut group = c.benchmark_group("framing");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("feed_mixed_stream", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            let frames = parser.feed(black_box(&bytes), |frame| {
                black_box(frame);
            });
            black_box(frames)
        })
    });

    group.bench_function("feed_byte_at_a_time", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            let mut frames = 0;
            for byte in &bytes {
                frames += parser.feed(std::slice::from_ref(black_box(byte)), |_| {});
            }
            black_box(frames)
        })
    });

    group.finish();
}

fn bench_unpack_bits(c: &mut Criterion) {
    let raw: Vec<u16> = (0..63).map(|i| (i * 13 % 1024) as u16).collect();
    let packed = pack_bits(&raw, 10);

    let mut group = c.benchmark_group("unpack_bits");
    group.throughput(Throughput::Elements(raw.len() as u64));
    group.bench_function("ecg_10bit", |b| b.iter(|| black_box(unpack_bits(black_box(&packed), 10, false))));
    group.bench_function("ecg_10bit_signed", |b| b.iter(|| black_box(unpack_bits(black_box(&packed), 10, true))));
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut parser = FrameParser::new();
    let mut frames = Vec::new();
    parser.feed(&mixed_stream(), |frame| frames.push(frame));

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("decode_mixed_frames", |b| {
        b.iter(|| {
            for frame in &frames {
                let message = Message::decode(black_box(frame)).expect("fixture frames decode");
                black_box(message);
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_framing, bench_unpack_bits, bench_decode);
criterion_main!(benches);
