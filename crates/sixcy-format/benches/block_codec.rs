//! Block pipeline throughput: encode and decode one 1 MiB chunk

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sixcy_codec::CodecId;
use sixcy_format::{decode_block, encode_block, BlockType};

fn chunk(len: usize) -> Vec<u8> {
    let mut state = 0x9E37_79B9u32;
    (0..len)
        .map(|i| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            if i % 3 == 0 {
                (state >> 24) as u8
            } else {
                b'a' + (i % 23) as u8
            }
        })
        .collect()
}

fn bench_block_pipeline(c: &mut Criterion) {
    let data = chunk(1024 * 1024);

    let mut group = c.benchmark_group("block_pipeline");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for codec in [CodecId::Zstd, CodecId::Lz4] {
        group.bench_function(format!("encode_{}", codec.name()), |b| {
            b.iter(|| {
                encode_block(
                    BlockType::Data,
                    0,
                    0,
                    black_box(&data),
                    codec.uuid(),
                    3,
                    None,
                )
                .unwrap()
            })
        });

        let (header, payload) =
            encode_block(BlockType::Data, 0, 0, &data, codec.uuid(), 3, None).unwrap();
        group.bench_function(format!("decode_{}", codec.name()), |b| {
            b.iter(|| decode_block(black_box(&header), black_box(&payload), None).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_block_pipeline);
criterion_main!(benches);
