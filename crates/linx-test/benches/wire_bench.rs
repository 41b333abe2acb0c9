//! Benchmarks for the LINX relay wire format

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};

use linx_core::{ParentChain, PublicKey, Scope};
use linx_wire::{Announcement, Envelope, FrameHeader, FrameKind, RelayCodec, RelayFrame, ENVELOPE_NONCE_SIZE, HEADER_SIZE};

fn announce() -> RelayFrame {
    RelayFrame::Announce(Announcement {
        scope: Scope::new("swarm1").unwrap(),
        public_key: PublicKey::from_bytes([7; 32]),
        parents: ParentChain::from_keys((0..8u8).map(|i| PublicKey::from_bytes([i; 32]))),
    })
}

fn send_offer(len: usize) -> RelayFrame {
    RelayFrame::SendOffer {
        to: PublicKey::from_bytes([9; 32]),
        envelope: Envelope {
            ciphertext: vec![0xAB; len],
            nonce: [1; ENVELOPE_NONCE_SIZE],
            sender: PublicKey::from_bytes([3; 32]),
        },
    }
}

fn bench_header_parse(c: &mut Criterion) {
    let bytes = FrameHeader::new(FrameKind::SendOffer, 1024).unwrap().to_bytes();

    c.bench_function("header_parse", |b| {
        b.iter(|| FrameHeader::parse(black_box(&bytes[..HEADER_SIZE])))
    });
}

fn bench_announce_roundtrip(c: &mut Criterion) {
    let frame = announce();
    let bytes = frame.serialize().unwrap();

    c.bench_function("announce_serialize", |b| {
        b.iter(|| black_box(&frame).serialize().unwrap())
    });
    c.bench_function("announce_parse", |b| {
        b.iter(|| RelayFrame::parse(black_box(&bytes)).unwrap())
    });
}

fn bench_codec_offer_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_offer_by_size");
    for size in [256, 1024, 4096] {
        let frame = send_offer(size);
        let mut encoded = BytesMut::new();
        RelayCodec.encode(frame.clone(), &mut encoded).unwrap();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_function(format!("encode_{}_bytes", size), |b| {
            b.iter(|| {
                let mut dst = BytesMut::with_capacity(encoded.len());
                RelayCodec.encode(black_box(frame.clone()), &mut dst).unwrap();
                dst
            })
        });
        group.bench_function(format!("decode_{}_bytes", size), |b| {
            b.iter(|| {
                let mut src = encoded.clone();
                RelayCodec.decode(black_box(&mut src)).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_header_parse,
    bench_announce_roundtrip,
    bench_codec_offer_sizes,
);
criterion_main!(benches);
