// benches/frame_bench.rs

//! Benchmarks for the wire-frame codec.

use bytes::BytesMut;
use criterion::{Criterion, criterion_group, criterion_main};
use hivelink::core::commands::{CommandKind, CommandResult, CommandSpec};
use hivelink::core::protocol::{Frame, FrameCodec};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

fn command_frame() -> Frame {
    Frame::Command {
        spec: CommandSpec {
            id: "a1b2c3d4e5f60718".to_string(),
            kind: CommandKind::System,
            payload: "tar czf /tmp/report.tgz /var/log/hivelink".to_string(),
        },
    }
}

fn result_frame(stdout_len: usize) -> Frame {
    Frame::Result {
        result: CommandResult {
            command_id: "a1b2c3d4e5f60718".to_string(),
            minion_id: "00ff00ff00ff00ff".to_string(),
            exit_code: 0,
            stdout: "x".repeat(stdout_len),
            stderr: String::new(),
            timestamp: 1_700_000_000,
        },
    }
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");
    for (name, frame) in [
        ("command", command_frame()),
        ("result_1k", result_frame(1024)),
        ("result_64k", result_frame(64 * 1024)),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut buf = BytesMut::new();
                FrameCodec.encode(black_box(frame.clone()), &mut buf).unwrap();
                black_box(buf)
            })
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");
    for (name, frame) in [
        ("command", command_frame()),
        ("result_1k", result_frame(1024)),
        ("result_64k", result_frame(64 * 1024)),
    ] {
        let encoded = frame.encode_to_vec().unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut buf = BytesMut::from(encoded.as_slice());
                black_box(FrameCodec.decode(&mut buf).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
