//! Criterion benchmarks for the camlink header and payload codec.
//!
//! The header codec runs twice per exchange (request and reply), so it sits
//! on every request's critical path.  Record encoders run once per
//! structured reply.
//!
//! Run with:
//! ```bash
//! cargo bench --package camlink-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use camlink_core::protocol::codec::{decode_header, encode_header, Record};
use camlink_core::protocol::messages::{
    CameraInfo, ExposureParms, FrameInfo, MessageHeader, Opcode, RingInfo,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_header() -> MessageHeader {
    MessageHeader {
        msg: Opcode::RingImageNData.code(),
        msgid: 0x1234_5678,
        rc: -1,
        data_len: 1_228_844,
    }
}

fn make_camera_info() -> CameraInfo {
    CameraInfo {
        model: "DCC1545M".to_string(),
        serial: "4102657421".to_string(),
        sensor_width: 1280,
        sensor_height: 1024,
        bits_per_pixel: 8,
        pixel_pitch_um: 5.2,
    }
}

fn make_frame_info() -> FrameInfo {
    FrameInfo {
        sequence: 17,
        width: 1280,
        height: 1024,
        pitch: 1280,
        timestamp_us: 1_700_000_000_000_000,
        exposure_ms: 12.5,
        saturated: [3, 0, 0],
    }
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_header(c: &mut Criterion) {
    let header = make_header();
    let bytes = encode_header(&header);

    let mut group = c.benchmark_group("header");
    group.bench_function("encode", |b| b.iter(|| encode_header(black_box(&header))));
    group.bench_function("decode", |b| {
        b.iter(|| decode_header(black_box(&bytes)).expect("decode must succeed"))
    });
    group.finish();
}

fn bench_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_encode");

    let camera = make_camera_info();
    group.bench_with_input(BenchmarkId::new("to_payload", "CameraInfo"), &camera, |b, r| {
        b.iter(|| black_box(r).to_payload())
    });
    let frame = make_frame_info();
    group.bench_with_input(BenchmarkId::new("to_payload", "FrameInfo"), &frame, |b, r| {
        b.iter(|| black_box(r).to_payload())
    });
    let exposure = ExposureParms::default();
    group.bench_with_input(BenchmarkId::new("to_payload", "ExposureParms"), &exposure, |b, r| {
        b.iter(|| black_box(r).to_payload())
    });
    let ring = RingInfo { size: 10, valid: 7, last: 6, show: 6 };
    group.bench_with_input(BenchmarkId::new("to_payload", "RingInfo"), &ring, |b, r| {
        b.iter(|| black_box(r).to_payload())
    });
    group.finish();

    let mut group = c.benchmark_group("record_decode");
    let frame_bytes = frame.to_payload();
    group.bench_function("FrameInfo", |b| {
        b.iter(|| FrameInfo::from_payload(black_box(&frame_bytes)).expect("decode must succeed"))
    });
    let exposure_bytes = exposure.to_payload();
    group.bench_function("ExposureParms", |b| {
        b.iter(|| {
            ExposureParms::from_payload(black_box(&exposure_bytes)).expect("decode must succeed")
        })
    });
    group.finish();
}

criterion_group!(benches, bench_header, bench_records);
criterion_main!(benches);
