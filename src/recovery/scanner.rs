//! Whole-stream scanner: walk every page of an Ogg file and report on its
//! health without opening any codec.
//!
//! # How it works
//!
//! The scanner feeds the reader through a [`SyncBuffer`] in fixed-size
//! chunks and drains the [`PageParser`] after each one.  Damaged regions
//! are skipped the same way the probe skips them: a capture pattern whose
//! checksum fails is abandoned one byte in.  Each verified page is logged
//! and fed to a per-serial [`StreamTracker`], which is how sequence gaps
//! and the codec of every logical stream are found.
//!
//! ## Scan quality
//!
//! | Quality | Meaning |
//! |---------|---------|
//! | `Clean` | Every byte belongs to a verified page, no sequence gaps |
//! | `Damaged` | Pages were found, but so were skipped bytes or gaps |
//! | `Unsynchronized` | No page could be verified at all |
//!
//! ## Progress
//!
//! [`scan_with_progress`] calls back after every chunk with the number of
//! bytes read so far.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::codec::{classify, Classification, CodecId, SignatureDump};
use crate::page::{Page, PageError, PageParser, HEADER_SIZE, MAX_PAGE_SIZE};
use crate::stream::StreamTracker;
use crate::sync::SyncBuffer;

/// Chunk size used by [`scan_file`].
pub const DEFAULT_SCAN_CHUNK: usize = 64 * 1024;

// ── Types ─────────────────────────────────────────────────────────────────────

/// One verified page, as found in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedPage {
    /// Absolute byte offset of the capture pattern.
    pub offset:           u64,
    pub serial:           u32,
    pub sequence:         u32,
    pub flags:            u8,
    pub granule_position: u64,
    pub segments:         usize,
    pub body_len:         usize,
}

/// What the scan learned about one logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub serial:        u32,
    /// Offset of the stream's first page.
    pub first_offset:  u64,
    pub pages:         u64,
    pub packets:       u64,
    pub bos:           bool,
    pub eos:           bool,
    pub sequence_gaps: u64,
    /// Codec of the identification packet.  Only set for streams that
    /// begin with a BOS page.
    pub codec:         Option<CodecId>,
    /// Leading bytes of an identification packet no codec claimed.
    pub unknown:       Option<SignatureDump>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanQuality {
    Clean,
    Damaged,
    Unsynchronized,
}

/// Complete report produced by [`scan`].
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub bytes_scanned:  u64,
    /// Pages that passed verification.
    pub pages:          u64,
    /// Capture patterns rejected for a checksum mismatch or bad version.
    pub rejected:       u64,
    /// Bytes not belonging to any verified page.
    pub bytes_skipped:  u64,
    /// Bytes of an incomplete page at end of input.
    pub trailing_bytes: u64,
    pub page_log:       Vec<ScannedPage>,
    /// Ordered by serial number.
    pub streams:        Vec<StreamSummary>,
    pub quality:        ScanQuality,
}

impl ScanReport {
    /// Share of scanned bytes that belong to verified pages (0.0–100.0).
    pub fn sync_pct(&self) -> f64 {
        if self.bytes_scanned == 0 {
            return 0.0;
        }
        let in_pages = self.bytes_scanned - self.bytes_skipped - self.trailing_bytes;
        in_pages as f64 / self.bytes_scanned as f64 * 100.0
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?} scan: {} page(s) in {} stream(s), {} rejected, \
             {} byte(s) skipped, {:.1}% of {} byte(s) in sync",
            self.quality,
            self.pages,
            self.streams.len(),
            self.rejected,
            self.bytes_skipped + self.trailing_bytes,
            self.sync_pct(),
            self.bytes_scanned,
        )
    }
}

// ── Per-stream accumulator ───────────────────────────────────────────────────

struct StreamScan {
    tracker: StreamTracker,
    summary: StreamSummary,
    probed:  bool,
}

impl StreamScan {
    fn new(page: &Page, offset: u64) -> Self {
        let mut tracker = StreamTracker::new();
        tracker.bind(page.serial());
        Self {
            tracker,
            summary: StreamSummary {
                serial:        page.serial(),
                first_offset:  offset,
                pages:         0,
                packets:       0,
                bos:           false,
                eos:           false,
                sequence_gaps: 0,
                codec:         None,
                unknown:       None,
            },
            // Joined mid-stream: there is no identification packet to see.
            probed: !page.is_bos(),
        }
    }

    fn feed(&mut self, page: &Page) {
        self.tracker.ingest(page);
        self.summary.pages += 1;
        self.summary.bos |= page.is_bos();
        self.summary.eos |= page.is_eos();

        if !self.probed {
            if let Some(packet) = self.tracker.extract_first_packet() {
                self.probed = true;
                self.summary.packets += 1;
                match classify(&packet.data) {
                    Classification::Known(sig) => self.summary.codec = Some(sig.codec),
                    Classification::Unknown(dump) => self.summary.unknown = Some(dump),
                }
            }
        }
        if self.probed {
            while self.tracker.next_packet().is_some() {
                self.summary.packets += 1;
            }
        }
        if let Some(stream) = self.tracker.stream() {
            self.summary.sequence_gaps = stream.sequence_gaps();
        }
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Scan `reader` to its end.
///
/// Damaged data never makes this fail; it shows up in the report.  Only
/// I/O errors propagate.
pub fn scan<R: Read + ?Sized>(reader: &mut R, chunk_size: usize) -> io::Result<ScanReport> {
    scan_with_progress::<R, fn(u64)>(reader, chunk_size, None)
}

pub fn scan_with_progress<R, F>(
    reader:       &mut R,
    chunk_size:   usize,
    mut progress: Option<&mut F>,
) -> io::Result<ScanReport>
where
    R: Read + ?Sized,
    F: FnMut(u64),
{
    let chunk_size = chunk_size.max(HEADER_SIZE);
    // Room for one chunk on top of a pending page of the largest size.
    let mut sync   = SyncBuffer::with_capacity(chunk_size + MAX_PAGE_SIZE);
    let mut parser = PageParser::new().resync_torn_pages(true);

    let mut streams: BTreeMap<u32, StreamScan> = BTreeMap::new();
    let mut page_log       = Vec::new();
    let mut bytes_scanned  = 0u64;
    let mut trailing_bytes = 0u64;

    loop {
        loop {
            match parser.next_page(&mut sync) {
                Ok(Some(page)) => {
                    let offset = parser.position() - page.size() as u64;
                    page_log.push(ScannedPage {
                        offset,
                        serial:           page.serial(),
                        sequence:         page.sequence(),
                        flags:            page.header.flags.bits(),
                        granule_position: page.granule_position(),
                        segments:         page.segment_table().len(),
                        body_len:         page.body.len(),
                    });
                    streams
                        .entry(page.serial())
                        .or_insert_with(|| StreamScan::new(&page, offset))
                        .feed(&page);
                }
                Ok(None) => break,
                Err(PageError::InsufficientData { buffered }) => {
                    debug!(buffered, "incomplete page at end of input");
                    trailing_bytes = buffered as u64;
                    break;
                }
            }
        }
        if parser.end_of_input() {
            break;
        }

        let n = read_chunk(reader, sync.reserve(chunk_size))?;
        sync.commit(n);
        bytes_scanned += n as u64;
        if n == 0 {
            parser.signal_end_of_input();
        }
        if let Some(cb) = progress.as_mut() {
            cb(bytes_scanned);
        }
    }

    let stats   = parser.stats();
    // A torn tail was skipped by the parser; report it once, as trailing.
    let bytes_skipped = stats.bytes_skipped.saturating_sub(trailing_bytes);
    let streams: Vec<StreamSummary> = streams.into_values().map(|s| s.summary).collect();
    let gaps: u64 = streams.iter().map(|s| s.sequence_gaps).sum();

    let quality = if stats.pages == 0 {
        ScanQuality::Unsynchronized
    } else if bytes_skipped == 0 && trailing_bytes == 0 && gaps == 0 {
        ScanQuality::Clean
    } else {
        ScanQuality::Damaged
    };

    let report = ScanReport {
        bytes_scanned,
        pages: stats.pages,
        rejected: stats.rejected,
        bytes_skipped,
        trailing_bytes,
        page_log,
        streams,
        quality,
    };
    info!("{}", report.summary());
    Ok(report)
}

/// Convenience: scan the file at `path`.
pub fn scan_file(path: &Path) -> io::Result<ScanReport> {
    let mut f = std::fs::File::open(path)?;
    scan(&mut f, DEFAULT_SCAN_CHUNK)
}

fn read_chunk<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{FLAG_BOS, FLAG_CONTINUED, FLAG_EOS};
    use crate::testutil::{build_page, lacing_for};
    use std::io::Cursor;

    fn two_streams() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(build_page(FLAG_BOS, 1, 0, 0, &[7], b"\x01vorbis"));
        out.extend(build_page(FLAG_BOS, 2, 0, 0, &[8], b"Speex   "));
        out.extend(build_page(0, 1, 1, 100, &[3, 2], b"abcde"));
        out.extend(build_page(FLAG_EOS, 1, 2, 200, &[1], b"z"));
        out.extend(build_page(FLAG_EOS, 2, 1, 50, &[0], b""));
        out
    }

    #[test]
    fn clean_multiplexed_file() {
        let bytes = two_streams();
        let report = scan(&mut Cursor::new(&bytes), 16).unwrap();
        assert_eq!(report.quality, ScanQuality::Clean);
        assert_eq!(report.pages, 5);
        assert_eq!(report.bytes_scanned, bytes.len() as u64);
        assert_eq!(report.page_log[0].offset, 0);
        assert_eq!(report.page_log[1].offset, 35);

        let vorbis = &report.streams[0];
        assert_eq!(vorbis.serial, 1);
        assert_eq!(vorbis.codec, Some(CodecId::Vorbis));
        assert_eq!(vorbis.pages, 3);
        assert_eq!(vorbis.packets, 4);
        assert!(vorbis.bos && vorbis.eos);

        let speex = &report.streams[1];
        assert_eq!(speex.codec, Some(CodecId::Speex));
        assert_eq!(speex.packets, 2);
        assert!((report.sync_pct() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn corruption_is_skipped_and_reported() {
        let mut bytes = two_streams();
        bytes[40] ^= 0xff;
        let report = scan(&mut Cursor::new(&bytes), 4096).unwrap();
        assert_eq!(report.quality, ScanQuality::Damaged);
        assert_eq!(report.pages, 4);
        assert_eq!(report.rejected, 1);
        assert!(report.bytes_skipped > 0);
        assert!(report.streams.iter().all(|s| s.serial != 2 || s.codec.is_none()));
    }

    #[test]
    fn garbage_is_unsynchronized() {
        let report = scan(&mut Cursor::new(vec![0x42u8; 1000]), 100).unwrap();
        assert_eq!(report.quality, ScanQuality::Unsynchronized);
        assert_eq!(report.bytes_skipped, 1000);
        assert!(report.streams.is_empty());
    }

    #[test]
    fn truncated_tail_is_trailing() {
        let mut bytes = build_page(FLAG_BOS, 9, 0, 0, &[7], b"\x01vorbis");
        let second = build_page(0, 9, 1, 0, &[4], b"more");
        bytes.extend(&second[..20]);
        let report = scan(&mut Cursor::new(&bytes), 8).unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(report.trailing_bytes, 20);
        assert_eq!(report.quality, ScanQuality::Damaged);
    }

    #[test]
    fn torn_page_followed_by_valid_pages() {
        let mut bytes = build_page(FLAG_BOS, 1, 0, 0, &[7], b"\x01vorbis");
        let torn = build_page(0, 1, 1, 0, &[200], &[0u8; 200]);
        assert_eq!(torn.len(), 228);
        bytes.extend(&torn[..40]);
        bytes.extend(build_page(0, 1, 2, 0, &[4], b"abcd"));
        bytes.extend(build_page(0, 1, 3, 0, &[4], b"efgh"));

        let report = scan(&mut Cursor::new(&bytes), 16).unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.trailing_bytes, 0);
        assert_eq!(report.bytes_skipped, 40);
        assert_eq!(report.quality, ScanQuality::Damaged);
        let sequences: Vec<u32> = report.page_log.iter().map(|p| p.sequence).collect();
        assert_eq!(sequences, vec![0, 2, 3]);
    }

    #[test]
    fn torn_tail_after_garbage_is_counted_once() {
        let mut bytes = build_page(FLAG_BOS, 9, 0, 0, &[7], b"\x01vorbis");
        bytes.extend(&build_page(0, 9, 1, 0, &[4], b"more")[..20]);
        bytes.extend([0x55u8; 10]);
        let report = scan(&mut Cursor::new(&bytes), 8).unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(report.trailing_bytes, 30);
        assert_eq!(report.bytes_skipped, 0);
        assert_eq!(report.bytes_scanned, bytes.len() as u64);
    }

    #[test]
    fn stream_joined_midway_has_no_codec() {
        let body = vec![0u8; 300];
        let mut bytes = build_page(FLAG_CONTINUED, 4, 17, 0, &lacing_for(300), &body);
        bytes.extend(build_page(0, 4, 18, 0, &[3], b"abc"));
        let report = scan(&mut Cursor::new(&bytes), 1024).unwrap();
        let s = &report.streams[0];
        assert!(!s.bos);
        assert_eq!(s.codec, None);
        assert_eq!(s.unknown, None);
        assert_eq!(s.first_offset, 0);
    }

    #[test]
    fn unknown_identification_packet_is_dumped() {
        let bytes = build_page(FLAG_BOS, 3, 0, 0, &[6], b"Theora");
        let report = scan(&mut Cursor::new(&bytes), 1024).unwrap();
        let s = &report.streams[0];
        assert_eq!(s.codec, None);
        assert_eq!(s.unknown.as_ref().map(|d| d.printable.as_str()), Some("Theora"));
    }

    #[test]
    fn sequence_gap_marks_damage() {
        let mut bytes = build_page(FLAG_BOS, 1, 0, 0, &[7], b"\x01vorbis");
        bytes.extend(build_page(0, 1, 5, 0, &[1], b"x"));
        let report = scan(&mut Cursor::new(&bytes), 1024).unwrap();
        assert_eq!(report.streams[0].sequence_gaps, 1);
        assert_eq!(report.quality, ScanQuality::Damaged);
    }

    #[test]
    fn progress_reports_bytes() {
        let bytes = two_streams();
        let mut seen = Vec::new();
        let mut cb = |n: u64| seen.push(n);
        scan_with_progress(&mut Cursor::new(&bytes), 64, Some(&mut cb)).unwrap();
        assert_eq!(seen.last().copied(), Some(bytes.len() as u64));
    }

    #[test]
    fn report_serializes() {
        let report = scan(&mut Cursor::new(two_streams()), 4096).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"quality\":\"Clean\""));
        assert!(json.contains("\"codec\":\"Vorbis\""));
    }
}
