use criterion::{black_box, criterion_group, criterion_main, Criterion};
use oggprobe::io_stream::SeekableSource;
use oggprobe::page::crc;
use oggprobe::{PageParser, ProbeConfig, ProbeController, SyncBuffer};
use std::io::Cursor;

fn page(flags: u8, sequence: u32, body: &[u8]) -> Vec<u8> {
    let mut lacing = vec![255u8; body.len() / 255];
    lacing.push((body.len() % 255) as u8);
    let mut out = Vec::new();
    out.extend_from_slice(b"OggS");
    out.push(0);
    out.push(flags);
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.push(lacing.len() as u8);
    out.extend_from_slice(&lacing);
    out.extend_from_slice(body);
    let sum = crc::checksum(&out);
    out[22..26].copy_from_slice(&sum.to_le_bytes());
    out
}

fn stream(pages: u32) -> Vec<u8> {
    let mut out = page(0x02, 0, b"\x01vorbis\x00\x00\x00\x00\x02");
    for seq in 1..pages {
        out.extend(page(0, seq, &vec![seq as u8; 4000]));
    }
    out
}

fn bench_page_parsing(c: &mut Criterion) {
    let data = stream(256);

    c.bench_function("parse_256_pages", |b| {
        b.iter(|| {
            let mut sync = SyncBuffer::new();
            sync.append(black_box(&data));
            let mut parser = PageParser::new();
            parser.signal_end_of_input();
            let mut n = 0;
            while let Ok(Some(_)) = parser.next_page(&mut sync) {
                n += 1;
            }
            n
        })
    });

    c.bench_function("checksum_1mb", |b| {
        let buf = vec![0x5au8; 1024 * 1024];
        b.iter(|| crc::checksum(black_box(&buf)))
    });
}

fn bench_probe(c: &mut Criterion) {
    let data = stream(4);
    let mut garbage_first = vec![0x20u8; 3000];
    garbage_first.extend(&data);

    c.bench_function("probe_vorbis", |b| {
        b.iter(|| {
            let mut controller = ProbeController::new(ProbeConfig::default());
            let mut source = SeekableSource::new(Cursor::new(black_box(&data)));
            controller.probe(&mut source).ok().flatten().map(|p| p.codec)
        })
    });

    c.bench_function("probe_after_3k_garbage", |b| {
        b.iter(|| {
            let mut controller = ProbeController::new(ProbeConfig::default());
            let mut source = SeekableSource::new(Cursor::new(black_box(&garbage_first)));
            controller.probe(&mut source).ok().flatten().map(|p| p.codec)
        })
    });
}

criterion_group!(benches, bench_page_parsing, bench_probe);
criterion_main!(benches);
