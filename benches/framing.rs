//! Framing benchmarks
//!
//! Frame assembly cost when the transport delivers a stream in chunks of
//! various sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use openigtlink_codec::io::FrameAssembler;
use openigtlink_codec::protocol::types::{StringBody, TransformBody};
use openigtlink_codec::protocol::IgtlMessage;

fn stream() -> Vec<u8> {
    let mut bytes = Vec::new();
    for i in 0..100 {
        let pose = IgtlMessage::new(TransformBody::translation(i as f32, 0.0, 0.0), "Tracker")
            .unwrap()
            .encode()
            .unwrap();
        let text = IgtlMessage::new(StringBody::new(format!("frame {i}")), "Console")
            .unwrap()
            .encode()
            .unwrap();
        bytes.extend(pose);
        bytes.extend(text);
    }
    bytes
}

fn bench_chunked_assembly(c: &mut Criterion) {
    let bytes = stream();
    let mut group = c.benchmark_group("assemble_200_frames");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    for chunk in [1usize, 16, 1500, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut assembler = FrameAssembler::new(1 << 20);
                let mut frames = 0;
                for piece in bytes.chunks(chunk) {
                    assembler.push(piece);
                    while let Some(frame) = assembler.next_frame().unwrap() {
                        black_box(&frame);
                        frames += 1;
                    }
                }
                assert_eq!(frames, 200);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chunked_assembly);
criterion_main!(benches);
