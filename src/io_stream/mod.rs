//! Byte sources the probe reads from.
//!
//! A generic file-open path usually sniffs a few header bytes before it
//! knows which format it is looking at.  [`ByteSource::buffered_prefix`]
//! exposes those bytes so the probe can reuse them instead of seeking back.

use std::io::{self, Read, Seek, SeekFrom};

/// Seek/tell/read access to the underlying file or stream.
pub trait ByteSource {
    /// Absolute offset of the next byte `read` would return.
    fn current_position(&mut self) -> io::Result<u64>;

    /// Move to an absolute offset.  Fails if the source cannot seek there.
    fn seek_absolute(&mut self, offset: u64) -> io::Result<()>;

    /// Read up to `buf.len()` bytes.  Short reads are allowed; `Ok(0)`
    /// means end of input.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Bytes already read from offset 0 by an earlier header sniff.
    fn buffered_prefix(&self) -> &[u8] {
        &[]
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn current_position(&mut self) -> io::Result<u64>          { (**self).current_position() }
    fn seek_absolute(&mut self, offset: u64) -> io::Result<()> { (**self).seek_absolute(offset) }
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>    { (**self).read(buf) }
    fn buffered_prefix(&self) -> &[u8]                         { (**self).buffered_prefix() }
}

/// Read until `buf` is full or the source reports end of input.
pub fn read_full<S: ByteSource + ?Sized>(source: &mut S, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ── Seekable source ──────────────────────────────────────────────────────────

/// Any `Read + Seek`, optionally carrying a sniffed header prefix.
#[derive(Debug)]
pub struct SeekableSource<R> {
    inner:  R,
    prefix: Vec<u8>,
}

impl<R: Read + Seek> SeekableSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, prefix: Vec::new() }
    }

    /// Read up to `len` header bytes from the start, leaving the reader
    /// positioned right after them, the way a format sniffer would.
    pub fn sniffed(mut inner: R, len: usize) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let mut prefix = Vec::with_capacity(len);
        (&mut inner).take(len as u64).read_to_end(&mut prefix)?;
        Ok(Self { inner, prefix })
    }

    /// Attach a prefix the caller already read.  The reader must be
    /// positioned at `prefix.len()` for the prefix to be reused.
    pub fn with_prefix(inner: R, prefix: Vec<u8>) -> Self {
        Self { inner, prefix }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteSource for SeekableSource<R> {
    fn current_position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    fn seek_absolute(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn buffered_prefix(&self) -> &[u8] {
        &self.prefix
    }
}

// ── Forward-only source ──────────────────────────────────────────────────────

/// A pipe or socket: position is counted, seeking only succeeds as a no-op.
#[derive(Debug)]
pub struct PipeSource<R> {
    inner:    R,
    position: u64,
    prefix:   Vec<u8>,
}

impl<R: Read> PipeSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0, prefix: Vec::new() }
    }

    /// Consume up to `len` bytes as a sniffed prefix.
    pub fn sniffed(mut inner: R, len: usize) -> io::Result<Self> {
        let mut prefix = Vec::with_capacity(len);
        (&mut inner).take(len as u64).read_to_end(&mut prefix)?;
        Ok(Self { inner, position: prefix.len() as u64, prefix })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for PipeSource<R> {
    fn current_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }

    fn seek_absolute(&mut self, offset: u64) -> io::Result<()> {
        if offset == self.position {
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot seek a forward-only source from {} to {offset}", self.position),
        ))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn buffered_prefix(&self) -> &[u8] {
        &self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `step` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn read_full_tolerates_short_reads() {
        let mut src = PipeSource::new(Trickle { data: b"abcdefghij", step: 3 });
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut src, &mut buf).unwrap(), 8);
        assert_eq!(&buf, b"abcdefgh");
        let mut rest = [0u8; 8];
        assert_eq!(read_full(&mut src, &mut rest).unwrap(), 2);
        assert_eq!(src.current_position().unwrap(), 10);
    }

    #[test]
    fn seekable_sniff_leaves_position_after_prefix() {
        let mut src = SeekableSource::sniffed(Cursor::new(b"OggS0123456789".to_vec()), 4).unwrap();
        assert_eq!(src.buffered_prefix(), b"OggS");
        assert_eq!(src.current_position().unwrap(), 4);
        src.seek_absolute(0).unwrap();
        assert_eq!(src.current_position().unwrap(), 0);
    }

    #[test]
    fn pipe_cannot_seek_backwards() {
        let mut src = PipeSource::sniffed(Cursor::new(b"0123456789".to_vec()), 4).unwrap();
        assert_eq!(src.current_position().unwrap(), 4);
        assert!(src.seek_absolute(4).is_ok());
        let err = src.seek_absolute(0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
