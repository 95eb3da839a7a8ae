//! Staging buffer between the byte source and the page parser.
//!
//! Bytes are written at `write_cursor` and turned into pages from
//! `consumed_cursor`.  Invariant: `consumed_cursor <= write_cursor <= capacity`.
//!
//! The buffer never reads from the byte source itself; the probe controller
//! reserves space, fills it and commits.  Consumed bytes are compacted away
//! on the next `reserve`, so the backing storage only ever grows until
//! `reset()` is called.

/// Growable staging area for raw container bytes.
#[derive(Debug, Default, Clone)]
pub struct SyncBuffer {
    data:            Vec<u8>,
    write_cursor:    usize,
    consumed_cursor: usize,
}

impl SyncBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            write_cursor: 0,
            consumed_cursor: 0,
        }
    }

    /// Return a writable region of exactly `n` free bytes after the write
    /// cursor, growing the storage if needed.
    ///
    /// Bytes already consumed by the page parser are discarded first.  Pages
    /// handed out earlier are owned copies, so compaction never invalidates
    /// data still referenced by packet reassembly.
    pub fn reserve(&mut self, n: usize) -> &mut [u8] {
        if self.consumed_cursor > 0 {
            self.data.copy_within(self.consumed_cursor..self.write_cursor, 0);
            self.write_cursor -= self.consumed_cursor;
            self.consumed_cursor = 0;
        }
        let needed = self.write_cursor + n;
        if needed > self.data.len() {
            self.data.resize(needed, 0);
        }
        &mut self.data[self.write_cursor..needed]
    }

    /// Advance the write cursor by `n` bytes previously filled via `reserve`.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.write_cursor + n <= self.data.len(), "commit past reserved region");
        self.write_cursor = (self.write_cursor + n).min(self.data.len());
    }

    /// Copy `bytes` in and commit them in one step.
    pub fn append(&mut self, bytes: &[u8]) {
        let n = bytes.len();
        self.reserve(n).copy_from_slice(bytes);
        self.commit(n);
    }

    /// Drop all buffered content and rewind both cursors.
    pub fn reset(&mut self) {
        self.write_cursor = 0;
        self.consumed_cursor = 0;
    }

    /// Bytes written but not yet turned into pages.
    pub fn unconsumed(&self) -> &[u8] {
        &self.data[self.consumed_cursor..self.write_cursor]
    }

    /// Mark `n` unconsumed bytes as used.
    pub fn consume(&mut self, n: usize) {
        self.consumed_cursor = (self.consumed_cursor + n).min(self.write_cursor);
    }

    pub fn write_cursor(&self) -> usize    { self.write_cursor }
    pub fn consumed_cursor(&self) -> usize { self.consumed_cursor }
    pub fn capacity(&self) -> usize        { self.data.len() }

    pub fn available(&self) -> usize {
        self.write_cursor - self.consumed_cursor
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }
}
