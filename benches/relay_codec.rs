use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio_util::codec::Decoder;

use skyrelay::core::{NodeId, MAX_PAYLOAD_SIZE};
use skyrelay::relay::{fletcher16, RelayCodec, RelayFrame};

fn benchmark_fletcher16(c: &mut Criterion) {
    let data = vec![0xA5u8; MAX_PAYLOAD_SIZE + 3];

    c.bench_function("fletcher16_max_frame", |b| {
        b.iter(|| fletcher16(black_box(&data)));
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let frame = RelayFrame::new(NodeId::RELAY_A, NodeId::RELAY_B, vec![0x42; MAX_PAYLOAD_SIZE]).unwrap();
    let wire = frame.to_bytes().unwrap();

    c.bench_function("decode_max_frame", |b| {
        let mut codec = RelayCodec::default();
        b.iter(|| {
            let mut buf = BytesMut::from(&wire[..]);
            codec.decode(black_box(&mut buf)).unwrap()
        });
    });

    let mut noisy = vec![0x00u8; 64];
    for _ in 0..8 {
        noisy.extend_from_slice(&wire);
    }

    c.bench_function("decode_resync_batch_8", |b| {
        let mut codec = RelayCodec::default();
        b.iter(|| {
            let mut buf = BytesMut::from(&noisy[..]);
            let mut frames = 0;
            while let Ok(Some(_)) = codec.decode(&mut buf) {
                frames += 1;
            }
            black_box(frames)
        });
    });
}

criterion_group!(benches, benchmark_fletcher16, benchmark_decode);
criterion_main!(benches);
