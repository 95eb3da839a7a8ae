//! Page checksum: CRC-32 with polynomial `0x04C11DB7`, initial value 0,
//! MSB-first, no final xor.  This is not the reflected IEEE variant that
//! zlib and `crc32fast` compute, so the table is built here.

const POLY: u32 = 0x04C1_1DB7;

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 0x8000_0000 != 0 { (r << 1) ^ POLY } else { r << 1 };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

static TABLE: [u32; 256] = build_table();

/// Incremental checksum state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hasher {
    state: u32,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        let mut crc = self.state;
        for &b in bytes {
            crc = (crc << 8) ^ TABLE[((crc >> 24) as u8 ^ b) as usize];
        }
        self.state = crc;
    }

    pub fn finalize(self) -> u32 {
        self.state
    }
}

/// One-shot checksum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(bytes);
    h.finalize()
}
