mod common;

use common::{bos_page, paged_packet};
use oggprobe::codec::{classify, CodecId};
use oggprobe::io_stream::SeekableSource;
use oggprobe::page::PageParser;
use oggprobe::{ProbeConfig, ProbeController, SyncBuffer};
use proptest::prelude::*;
use std::io::Cursor;

fn parse_all(bytes: &[u8]) -> usize {
    let mut sync = SyncBuffer::new();
    sync.append(bytes);
    let mut parser = PageParser::new();
    parser.signal_end_of_input();
    let mut pages = 0;
    while let Ok(Some(_)) = parser.next_page(&mut sync) {
        pages += 1;
    }
    pages
}

fn first_packet(bytes: Vec<u8>) -> Vec<u8> {
    let mut controller = ProbeController::new(ProbeConfig::new().probe_budget(1 << 16));
    let probed = controller
        .probe(&mut SeekableSource::new(Cursor::new(bytes)))
        .unwrap()
        .unwrap();
    probed.first_packet.data
}

proptest! {
    #[test]
    fn any_single_byte_corruption_rejects_the_page(
        serial in any::<u32>(),
        body in proptest::collection::vec(any::<u8>(), 1..200),
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let mut bytes = bos_page(serial, &body);
        prop_assert_eq!(parse_all(&bytes), 1);
        let i = index.index(bytes.len());
        bytes[i] ^= mask;
        prop_assert_eq!(parse_all(&bytes), 0);
    }

    #[test]
    fn bodies_shorter_than_eight_bytes_never_match_pcm(len in 0usize..8, tail in any::<u8>()) {
        let mut body = b"PCM     "[..len].to_vec();
        prop_assert_ne!(classify(&body).codec(), Some(CodecId::Pcm));
        body.truncate(len.saturating_sub(1));
        body.push(tail);
        body.truncate(len);
        prop_assert_ne!(classify(&body).codec(), Some(CodecId::Pcm));
    }

    #[test]
    fn reassembly_does_not_depend_on_page_boundaries(
        tail in proptest::collection::vec(any::<u8>(), 0..2000),
        per_page in 1usize..8,
    ) {
        let packet = [&b"\x01vorbis"[..], &tail[..]].concat();
        let split = first_packet(paged_packet(5, &packet, per_page));
        let whole = first_packet(bos_page(5, &packet));
        prop_assert_eq!(&split, &packet);
        prop_assert_eq!(&whole, &packet);
    }
}
