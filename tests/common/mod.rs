#![allow(dead_code)]

use oggprobe::page::crc;

pub const BOS: u8 = 0x02;
pub const EOS: u8 = 0x04;
pub const CONTINUED: u8 = 0x01;

/// Serialize one page with a correct checksum.
pub fn page(flags: u8, serial: u32, sequence: u32, lacing: &[u8], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(27 + lacing.len() + body.len());
    out.extend_from_slice(b"OggS");
    out.push(0);
    out.push(flags);
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&serial.to_le_bytes());
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.push(lacing.len() as u8);
    out.extend_from_slice(lacing);
    out.extend_from_slice(body);
    let sum = crc::checksum(&out);
    out[22..26].copy_from_slice(&sum.to_le_bytes());
    out
}

pub fn lacing_for(len: usize) -> Vec<u8> {
    let mut lacing = vec![255u8; len / 255];
    lacing.push((len % 255) as u8);
    lacing
}

/// A BOS page holding one packet.
pub fn bos_page(serial: u32, body: &[u8]) -> Vec<u8> {
    page(BOS, serial, 0, &lacing_for(body.len()), body)
}

/// Split one packet across pages of at most `per_page` segments.
pub fn paged_packet(serial: u32, packet: &[u8], per_page: usize) -> Vec<u8> {
    let lacing = lacing_for(packet.len());
    let mut out = Vec::new();
    let mut offset = 0usize;
    for (seq, chunk) in lacing.chunks(per_page.max(1)).enumerate() {
        let len: usize = chunk.iter().map(|&l| l as usize).sum();
        let flags = if seq == 0 { BOS } else { CONTINUED };
        out.extend(page(flags, serial, seq as u32, chunk, &packet[offset..offset + len]));
        offset += len;
    }
    out
}
