//! Page framing: capture, checksum verification and resynchronization.
//!
//! # Wire layout (all integers little-endian)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 4    | capture pattern `"OggS"` |
//! | 4      | 1    | structure version (must be 0) |
//! | 5      | 1    | header-type flags |
//! | 6      | 8    | granule position |
//! | 14     | 4    | bitstream serial number |
//! | 18     | 4    | page sequence number |
//! | 22     | 4    | checksum |
//! | 26     | 1    | segment count |
//! | 27     | n    | segment table (lacing values) |
//! | 27+n   | Σ    | body |
//!
//! The checksum covers the whole page with bytes 22..26 read as zero.
//!
//! # Resynchronization
//!
//! [`PageParser::next_page`] scans the unconsumed region of a [`SyncBuffer`]
//! for the capture pattern.  A candidate with a bad checksum or a non-zero
//! version is spurious: the search restarts one byte past its first byte.
//! Bytes that cannot begin a page are consumed as they are passed.

pub mod crc;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::debug;

use crate::sync::SyncBuffer;

pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
/// Fixed header bytes before the segment table.
pub const HEADER_SIZE: usize = 27;
/// Largest page the format can express.
pub const MAX_PAGE_SIZE: usize = HEADER_SIZE + 255 + 255 * 255;

pub const FLAG_CONTINUED: u8 = 0x01;
pub const FLAG_BOS:       u8 = 0x02;
pub const FLAG_EOS:       u8 = 0x04;

const CHECKSUM_RANGE: std::ops::Range<usize> = 22..26;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Header-type flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFlags(pub u8);

impl HeaderFlags {
    /// First packet on this page continues one from the previous page.
    pub fn continued(self) -> bool { self.0 & FLAG_CONTINUED != 0 }
    /// First page of a logical stream.
    pub fn bos(self) -> bool       { self.0 & FLAG_BOS != 0 }
    /// Last page of a logical stream.
    pub fn eos(self) -> bool       { self.0 & FLAG_EOS != 0 }
    pub fn bits(self) -> u8        { self.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub version:          u8,
    pub flags:            HeaderFlags,
    pub granule_position: u64,
    pub serial:           u32,
    pub sequence:         u32,
    pub checksum:         u32,
    pub segment_table:    Vec<u8>,
}

impl PageHeader {
    /// Body length implied by the segment table.
    pub fn body_len(&self) -> usize {
        self.segment_table.iter().map(|&l| l as usize).sum()
    }

    /// Header plus segment table length.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.segment_table.len()
    }
}

/// A checksum-verified page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header: PageHeader,
    pub body:   Vec<u8>,
}

impl Page {
    pub fn serial(&self) -> u32         { self.header.serial }
    pub fn sequence(&self) -> u32       { self.header.sequence }
    pub fn granule_position(&self) -> u64 { self.header.granule_position }
    pub fn is_continued(&self) -> bool  { self.header.flags.continued() }
    pub fn is_bos(&self) -> bool        { self.header.flags.bos() }
    pub fn is_eos(&self) -> bool        { self.header.flags.eos() }
    pub fn segment_table(&self) -> &[u8] { &self.header.segment_table }

    /// Total on-wire size of this page.
    pub fn size(&self) -> usize {
        self.header.encoded_len() + self.body.len()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// End of input was signalled while a page candidate was still incomplete.
    #[error("Insufficient data: {buffered} byte(s) buffered but no complete page")]
    InsufficientData { buffered: usize },
}

/// Counters kept across `next_page` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Pages that passed verification.
    pub pages:         u64,
    /// Candidates rejected for a checksum mismatch or bad version.
    pub rejected:      u64,
    /// Bytes consumed without belonging to a verified page.
    pub bytes_skipped: u64,
}

impl SyncStats {
    /// Whether any capture pattern has been examined to a verdict.
    pub fn saw_capture(&self) -> bool {
        self.pages > 0 || self.rejected > 0
    }
}

enum Candidate {
    Incomplete,
    Spurious(&'static str),
    Valid(Page),
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Produces verified pages, in arrival order, from a [`SyncBuffer`].
#[derive(Debug, Default, Clone)]
pub struct PageParser {
    end_of_input: bool,
    stats:        SyncStats,
    position:     u64,
    resync_torn:  bool,
    /// Bytes buffered at the first torn candidate since the last verified page.
    torn:         Option<usize>,
}

impl PageParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// After end of input, abandon a candidate that can no longer complete
    /// and keep searching past it, instead of stopping there.
    /// `InsufficientData` is then reported only if no later page verifies.
    #[must_use]
    pub fn resync_torn_pages(mut self, value: bool) -> Self {
        self.resync_torn = value;
        self
    }

    /// Tell the parser no further bytes will be committed.
    pub fn signal_end_of_input(&mut self) {
        self.end_of_input = true;
    }

    pub fn end_of_input(&self) -> bool {
        self.end_of_input
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Total bytes consumed so far (skipped bytes plus verified pages).
    /// This is the stream offset of the next unconsumed byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn reset(&mut self) {
        *self = Self { resync_torn: self.resync_torn, ..Self::default() };
    }

    /// Try to produce one verified page.
    ///
    /// Returns `Ok(None)` when more bytes are needed, or once end of input
    /// has been signalled and nothing is left.  Returns
    /// `Err(PageError::InsufficientData)` only after end of input when an
    /// incomplete candidate remains (or, with
    /// [`resync_torn_pages`](Self::resync_torn_pages), when no page
    /// verified after the first torn one).
    pub fn next_page(&mut self, sync: &mut SyncBuffer) -> Result<Option<Page>, PageError> {
        loop {
            let data = sync.unconsumed();
            let start = match find_capture(data) {
                Some(start) => start,
                None => {
                    let keep = if self.end_of_input { 0 } else { partial_capture_suffix(data) };
                    let skip = data.len() - keep;
                    self.skip(sync, skip);
                    return self.starved(sync);
                }
            };
            if start > 0 {
                self.skip(sync, start);
                continue;
            }

            match examine(sync.unconsumed()) {
                Candidate::Incomplete if self.end_of_input && self.resync_torn => {
                    debug!(offset = self.position, buffered = sync.available(), "torn page at end of input");
                    if self.torn.is_none() {
                        self.torn = Some(sync.available());
                    }
                    self.skip(sync, 1);
                }
                Candidate::Incomplete => return self.starved(sync),
                Candidate::Spurious(reason) => {
                    debug!(offset = self.position, reason, "rejected page candidate");
                    self.stats.rejected += 1;
                    self.skip(sync, 1);
                }
                Candidate::Valid(page) => {
                    let size = page.size();
                    sync.consume(size);
                    self.position += size as u64;
                    self.stats.pages += 1;
                    self.torn = None;
                    return Ok(Some(page));
                }
            }
        }
    }

    /// Whether the unconsumed region begins with a capture pattern that
    /// has not been resolved yet.
    pub fn has_pending_candidate(sync: &SyncBuffer) -> bool {
        sync.unconsumed().starts_with(CAPTURE_PATTERN)
    }

    fn skip(&mut self, sync: &mut SyncBuffer, n: usize) {
        if n == 0 {
            return;
        }
        sync.consume(n);
        self.position += n as u64;
        self.stats.bytes_skipped += n as u64;
    }

    fn starved(&mut self, sync: &SyncBuffer) -> Result<Option<Page>, PageError> {
        if let Some(buffered) = self.torn.take() {
            return Err(PageError::InsufficientData { buffered });
        }
        if self.end_of_input && !sync.is_empty() {
            Err(PageError::InsufficientData { buffered: sync.available() })
        } else {
            Ok(None)
        }
    }
}

fn find_capture(data: &[u8]) -> Option<usize> {
    data.windows(CAPTURE_PATTERN.len()).position(|w| w == CAPTURE_PATTERN)
}

/// Length of the longest tail of `data` that could still grow into a
/// capture pattern once more bytes arrive.
fn partial_capture_suffix(data: &[u8]) -> usize {
    (1..CAPTURE_PATTERN.len())
        .rev()
        .find(|&k| data.len() >= k && data[data.len() - k..] == CAPTURE_PATTERN[..k])
        .unwrap_or(0)
}

/// Judge the candidate page at the start of `data`.
fn examine(data: &[u8]) -> Candidate {
    if data.len() < HEADER_SIZE {
        return Candidate::Incomplete;
    }
    let version = data[4];
    if version != 0 {
        return Candidate::Spurious("unsupported structure version");
    }
    let header_len = HEADER_SIZE + data[26] as usize;
    if data.len() < header_len {
        return Candidate::Incomplete;
    }
    let segment_table = &data[HEADER_SIZE..header_len];
    let body_len: usize = segment_table.iter().map(|&l| l as usize).sum();
    let total = header_len + body_len;
    if data.len() < total {
        return Candidate::Incomplete;
    }

    let stored = LittleEndian::read_u32(&data[CHECKSUM_RANGE]);
    let mut hasher = crc::Hasher::new();
    hasher.update(&data[..CHECKSUM_RANGE.start]);
    hasher.update(&[0u8; 4]);
    hasher.update(&data[CHECKSUM_RANGE.end..total]);
    if hasher.finalize() != stored {
        return Candidate::Spurious("checksum mismatch");
    }

    Candidate::Valid(Page {
        header: PageHeader {
            version,
            flags:            HeaderFlags(data[5]),
            granule_position: LittleEndian::read_u64(&data[6..14]),
            serial:           LittleEndian::read_u32(&data[14..18]),
            sequence:         LittleEndian::read_u32(&data[18..22]),
            checksum:         stored,
            segment_table:    segment_table.to_vec(),
        },
        body: data[header_len..total].to_vec(),
    })
}
