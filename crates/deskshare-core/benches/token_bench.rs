//! Criterion benchmarks for the share-token codec.
//!
//! Token encoding happens once per share and decoding once per redemption,
//! so neither is on a hot path.  These numbers exist to catch accidental
//! regressions (for example re-deriving a key per call).
//!
//! Run with:
//! ```bash
//! cargo bench --package deskshare-core --bench token_bench
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use deskshare_core::{AccessMode, EndpointDescriptor, Keyring, Scheme, TokenCodec};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_descriptor() -> EndpointDescriptor {
    EndpointDescriptor::new("192.168.1.17", AccessMode::FullControl)
        .expect("fixture host must be valid")
        .with_credential("aB3dE9xQ")
        .expect("fixture credential must be valid")
}

fn make_codec() -> TokenCodec {
    TokenCodec::new().with_key_provider(Arc::new(Keyring::generate()))
}

const SCHEMES: [Scheme; 3] = [
    Scheme::Substitution,
    Scheme::SealedEphemeral,
    Scheme::SealedKeyring,
];

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let codec = make_codec();
    let descriptor = make_descriptor();
    let mut group = c.benchmark_group("token_encode");

    for scheme in SCHEMES {
        group.bench_with_input(BenchmarkId::from_parameter(scheme), &scheme, |b, &scheme| {
            b.iter(|| codec.encode(black_box(&descriptor), scheme).unwrap())
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let codec = make_codec();
    let descriptor = make_descriptor();
    let mut group = c.benchmark_group("token_decode");

    for scheme in SCHEMES {
        let token = codec.encode(&descriptor, scheme).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(scheme), &token, |b, token| {
            b.iter(|| codec.decode(black_box(token)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
