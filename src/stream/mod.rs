//! Logical stream tracking and packet reassembly.
//!
//! A page's segment table splits its body into fragments.  A lacing value
//! of 255 means the packet continues into the next segment (possibly on
//! the next page); any smaller value terminates it.
//!
//! The tracker binds to exactly one serial number: the first one it sees,
//! or the one given to [`StreamTracker::bind`].  Pages from other logical
//! streams are ignored.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::page::Page;

/// Lacing value meaning "packet continues".
pub const CONTINUE_LACING: u8 = 255;

/// A fully reassembled packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data:             Vec<u8>,
    pub serial:           u32,
    /// Granule position of the page the packet completed on.
    pub granule_position: u64,
    /// Sequence number of the page the packet completed on.
    pub page_sequence:    u32,
    /// The identification packet: first packet of a stream that began with BOS.
    pub first_in_stream:  bool,
    /// Completed on an EOS page, as its final packet.
    pub last_in_stream:   bool,
}

/// Per-serial reassembly state.
#[derive(Debug, Clone)]
pub struct LogicalStream {
    serial:          u32,
    last_sequence:   Option<u32>,
    pending:         Vec<u8>,
    pending_open:    bool,
    bos_seen:        bool,
    eos_seen:        bool,
    pages:           u64,
    packets_emitted: u64,
    sequence_gaps:   u64,
    ready:           VecDeque<Packet>,
}

impl LogicalStream {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            last_sequence:   None,
            pending:         Vec::new(),
            pending_open:    false,
            bos_seen:        false,
            eos_seen:        false,
            pages:           0,
            packets_emitted: 0,
            sequence_gaps:   0,
            ready:           VecDeque::new(),
        }
    }

    pub fn serial(&self) -> u32               { self.serial }
    pub fn last_sequence(&self) -> Option<u32> { self.last_sequence }
    pub fn bos_seen(&self) -> bool            { self.bos_seen }
    pub fn eos_seen(&self) -> bool            { self.eos_seen }
    pub fn pages(&self) -> u64                { self.pages }
    pub fn packets_emitted(&self) -> u64      { self.packets_emitted }
    pub fn sequence_gaps(&self) -> u64        { self.sequence_gaps }
    /// Bytes of an unterminated packet carried over to the next page.
    pub fn pending_len(&self) -> usize        { self.pending.len() }

    /// Split `page` into fragments and complete whatever packets it
    /// terminates.  Returns the number of packets queued.
    fn ingest(&mut self, page: &Page) -> usize {
        let seq = page.sequence();
        if let Some(last) = self.last_sequence {
            if seq != last.wrapping_add(1) {
                warn!(serial = self.serial, expected = last.wrapping_add(1), got = seq,
                      "page sequence gap");
                self.sequence_gaps += 1;
                self.drop_pending("sequence gap");
            }
        }
        self.last_sequence = Some(seq);
        self.pages += 1;
        if page.is_bos() {
            self.bos_seen = true;
        }

        if !page.is_continued() {
            self.drop_pending("page does not continue a packet");
        }
        // Joined mid-packet: the leading fragment belongs to a packet whose
        // head was never seen.
        let mut skipping = page.is_continued() && !self.pending_open;

        let before = self.ready.len();
        let mut offset = 0usize;
        for &lacing in page.segment_table() {
            let end = (offset + lacing as usize).min(page.body.len());
            let fragment = &page.body[offset..end];
            offset = end;

            if skipping {
                if lacing < CONTINUE_LACING {
                    skipping = false;
                }
                continue;
            }
            self.pending.extend_from_slice(fragment);
            self.pending_open = true;
            if lacing < CONTINUE_LACING {
                self.emit(page);
            }
        }

        if page.is_eos() {
            self.eos_seen = true;
            if self.pending_open {
                debug!(serial = self.serial, bytes = self.pending.len(),
                       "end of stream truncates pending packet");
                self.emit(page);
            }
            if self.ready.len() > before {
                if let Some(last) = self.ready.back_mut() {
                    last.last_in_stream = true;
                }
            }
        }
        self.ready.len() - before
    }

    fn emit(&mut self, page: &Page) {
        let packet = Packet {
            data:             std::mem::take(&mut self.pending),
            serial:           self.serial,
            granule_position: page.granule_position(),
            page_sequence:    page.sequence(),
            first_in_stream:  self.bos_seen && self.packets_emitted == 0,
            last_in_stream:   false,
        };
        self.pending_open = false;
        self.packets_emitted += 1;
        self.ready.push_back(packet);
    }

    fn drop_pending(&mut self, why: &'static str) {
        if self.pending_open {
            debug!(serial = self.serial, bytes = self.pending.len(), why, "discarding pending packet");
        }
        self.pending.clear();
        self.pending_open = false;
    }
}

/// Tracks the single logical stream the probe cares about.
#[derive(Debug, Clone, Default)]
pub struct StreamTracker {
    stream:         Option<LogicalStream>,
    packets_popped: u64,
}

impl StreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh stream for `serial`, dropping any previous state.
    pub fn bind(&mut self, serial: u32) {
        self.stream = Some(LogicalStream::new(serial));
        self.packets_popped = 0;
    }

    pub fn stream(&self) -> Option<&LogicalStream> {
        self.stream.as_ref()
    }

    pub fn serial(&self) -> Option<u32> {
        self.stream.as_ref().map(LogicalStream::serial)
    }

    /// Feed one verified page.  Binds to its serial if nothing is bound yet;
    /// pages from any other serial are ignored.  Returns the number of
    /// packets completed by this page.
    pub fn ingest(&mut self, page: &Page) -> usize {
        let stream = self.stream.get_or_insert_with(|| LogicalStream::new(page.serial()));
        if stream.serial != page.serial() {
            debug!(bound = stream.serial, serial = page.serial(),
                   "ignoring page from another logical stream");
            return 0;
        }
        stream.ingest(page)
    }

    /// Pop the next completed packet, in order.
    pub fn next_packet(&mut self) -> Option<Packet> {
        let packet = self.stream.as_mut()?.ready.pop_front()?;
        self.packets_popped += 1;
        Some(packet)
    }

    /// The first packet of the stream, once it is complete.  `None` means
    /// another page is needed (or the first packet was already taken).
    pub fn extract_first_packet(&mut self) -> Option<Packet> {
        if self.packets_popped > 0 {
            return None;
        }
        self.next_packet()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
