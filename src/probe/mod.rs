//! Probe controller: decide whether a byte source is an Ogg bitstream and,
//! if so, which codec its first logical stream carries.
//!
//! ```text
//! Start ─► Buffering ─► PageAcquired ─► Classified ─► Dispatched
//!   │          │              │               │
//!   ▼          ▼              ▼               ▼
//! NotSeekable  (not Ogg)   Malformed      Unsupported
//! ```
//!
//! # Data source
//! If the source is positioned exactly at the end of a sniffed header
//! prefix, the prefix is reused and topped up to the probe budget.
//! Otherwise the source is seeked to offset 0 and the budget read from
//! there.  At most one seek and one bounded read are performed.
//!
//! # Not this container
//! `probe` returns `Ok(None)` rather than an error when no verified page
//! turns up and either the source ran dry before the budget was filled, or
//! no capture pattern was seen at all.  A full budget whose capture
//! patterns all failed verification is `Malformed`.
//!
//! # Dispatch
//! Vorbis and Speex streams are handed off together with the buffered
//! bytes, parser and tracker.  Both FLAC mappings do their own framing, so
//! the probe state is reset, the source rewound to where the probe found
//! it, and a native opener takes over.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::codec::{classify, Classification, CodecId, Route, SignatureDump};
use crate::config::ProbeConfig;
use crate::io_stream::{read_full, ByteSource};
use crate::page::{Page, PageParser, SyncStats};
use crate::stream::{Packet, StreamTracker};
use crate::sync::SyncBuffer;

/// Error type returned by codec openers.
pub type OpenError = Box<dyn StdError + Send + Sync>;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Source cannot seek to the start of the stream: {0}")]
    NotSeekable(#[source] io::Error),
    #[error("Malformed Ogg stream: {0}")]
    Malformed(String),
    #[error("Ogg/{codec} data: {reason}")]
    Unsupported { codec: CodecId, reason: &'static str },
    #[error("Ogg bitstream contains an unknown data type: {dump}")]
    UnknownCodec { dump: SignatureDump },
    #[error("{codec} opener failed: {source}")]
    Open { codec: CodecId, source: OpenError },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ProbeError {
    /// Both flavours of "classified but refused".
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ProbeError::Unsupported { .. } | ProbeError::UnknownCodec { .. })
    }
}

// ── State & results ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeState {
    Start,
    Buffering,
    PageAcquired,
    Classified,
    Dispatched,
    NotSeekable,
    Malformed,
    Unsupported,
}

impl ProbeState {
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, ProbeState::NotSeekable | ProbeState::Malformed | ProbeState::Unsupported)
    }
}

/// Summary of one probe, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum ProbeResult {
    Classified(CodecId),
    Unsupported(CodecId),
    Unknown(SignatureDump),
    Malformed(String),
    NotSeekable,
    /// Not this container type.  Not an error.
    InsufficientData,
    /// I/O or opener failure.
    Failed(String),
}

impl ProbeResult {
    pub fn from_outcome<T>(outcome: &Result<Option<T>, ProbeError>, codec: impl Fn(&T) -> CodecId) -> Self {
        match outcome {
            Ok(Some(found)) => ProbeResult::Classified(codec(found)),
            Ok(None)        => ProbeResult::InsufficientData,
            Err(e)          => ProbeResult::from_error(e),
        }
    }

    pub fn from_error(err: &ProbeError) -> Self {
        match err {
            ProbeError::NotSeekable(_)               => ProbeResult::NotSeekable,
            ProbeError::Malformed(msg)               => ProbeResult::Malformed(msg.clone()),
            ProbeError::Unsupported { codec, .. }    => ProbeResult::Unsupported(*codec),
            ProbeError::UnknownCodec { dump }        => ProbeResult::Unknown(dump.clone()),
            ProbeError::Open { .. } | ProbeError::Io(_) => ProbeResult::Failed(err.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, ProbeResult::Classified(_) | ProbeResult::InsufficientData)
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeResult::Classified(codec)  => write!(f, "Ogg/{codec}"),
            ProbeResult::Unsupported(codec) => write!(f, "Ogg/{codec} (unsupported)"),
            ProbeResult::Unknown(dump)      => write!(f, "Ogg, unknown data type {dump}"),
            ProbeResult::Malformed(msg)     => write!(f, "malformed Ogg: {msg}"),
            ProbeResult::NotSeekable        => f.write_str("source not seekable"),
            ProbeResult::InsufficientData   => f.write_str("not an Ogg bitstream"),
            ProbeResult::Failed(msg)        => write!(f, "error: {msg}"),
        }
    }
}

/// A successfully classified stream, ready for [`ProbeController::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probed {
    pub codec:        CodecId,
    pub serial:       u32,
    pub first_packet: Packet,
}

/// Everything a codec opener inherits from the probe.
#[derive(Debug)]
pub struct Handoff<S> {
    /// Positioned after the last byte read into `sync`.
    pub source:       S,
    /// Buffered bytes not yet turned into pages.
    pub sync:         SyncBuffer,
    pub parser:       PageParser,
    pub tracker:      StreamTracker,
    pub codec:        CodecId,
    pub serial:       u32,
    /// The identification packet, already extracted from `tracker`.
    pub first_packet: Packet,
}

/// Codec-specific openers the probe dispatches to.
pub trait Openers<S> {
    type Output;

    fn open_vorbis(&mut self, handoff: Handoff<S>) -> Result<Self::Output, OpenError>;

    fn open_speex(&mut self, handoff: Handoff<S>) -> Result<Self::Output, OpenError>;

    /// Native FLAC opener.  `source` has been rewound to where the probe
    /// started; its sniffed prefix is still available.
    fn open_flac(&mut self, codec: CodecId, source: S) -> Result<Self::Output, OpenError>;
}

// ── Controller ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ProbeController {
    config:    ProbeConfig,
    sync:      SyncBuffer,
    parser:    PageParser,
    tracker:   StreamTracker,
    state:     ProbeState,
    origin:    u64,
    short_read: bool,
}

impl ProbeController {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            sync:       SyncBuffer::new(),
            parser:     PageParser::new(),
            tracker:    StreamTracker::new(),
            state:      ProbeState::Start,
            origin:     0,
            short_read: false,
        }
    }

    /// Probe, then dispatch, in one call.  `Ok(None)` means "not Ogg".
    pub fn open<S, O>(mut source: S, config: ProbeConfig, openers: &mut O) -> Result<Option<O::Output>, ProbeError>
    where
        S: ByteSource,
        O: Openers<S>,
    {
        let mut controller = Self::new(config);
        match controller.probe(&mut source)? {
            Some(probed) => controller.dispatch(source, probed, openers).map(Some),
            None => Ok(None),
        }
    }

    pub fn state(&self) -> ProbeState      { self.state }
    pub fn config(&self) -> &ProbeConfig   { &self.config }
    pub fn sync(&self) -> &SyncBuffer      { &self.sync }
    pub fn tracker(&self) -> &StreamTracker { &self.tracker }
    pub fn sync_stats(&self) -> SyncStats  { self.parser.stats() }

    /// Source position recorded when the last probe started.
    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Drop all synchronization and stream state and return to `Start`.
    pub fn reset(&mut self) {
        self.sync.reset();
        self.parser.reset();
        self.tracker.reset();
        self.short_read = false;
        self.enter(ProbeState::Start);
    }

    /// Run `Start` through `Classified`.
    ///
    /// Returns `Ok(None)` if the source is not an Ogg bitstream.  Recognized
    /// but refused codecs and unrecognized ones are errors; the controller
    /// is left in [`ProbeState::Unsupported`].
    pub fn probe<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<Option<Probed>, ProbeError> {
        self.reset();
        self.fill(source)?;

        let page = match self.first_page()? {
            Some(page) => page,
            None => return Ok(None),
        };
        if !page.is_bos() {
            warn!(serial = page.serial(), sequence = page.sequence(), "first page is not BOS");
            return Err(self.malformed("first page is not a beginning-of-stream page"));
        }
        self.tracker.bind(page.serial());
        self.tracker.ingest(&page);

        let first_packet = self.first_packet()?;
        let serial = page.serial();
        self.enter(ProbeState::Classified);

        match classify(&first_packet.data) {
            Classification::Known(sig) => {
                info!(stream = sig.name, serial, "Ogg stream data");
                if let Route::Unsupported(reason) = sig.route {
                    warn!(stream = sig.name, reason, "Ogg stream refused");
                    self.enter(ProbeState::Unsupported);
                    return Err(ProbeError::Unsupported { codec: sig.codec, reason });
                }
                Ok(Some(Probed { codec: sig.codec, serial, first_packet }))
            }
            Classification::Unknown(dump) => {
                warn!(serial, %dump, "Ogg bitstream contains an unknown data type");
                self.enter(ProbeState::Unsupported);
                Err(ProbeError::UnknownCodec { dump })
            }
        }
    }

    /// Hand a classified stream to its opener.
    ///
    /// The buffered bytes, parser and tracker move into the [`Handoff`];
    /// the controller keeps nothing.  For FLAC the state is reset instead
    /// and the source rewound to [`origin`](Self::origin).
    pub fn dispatch<S, O>(&mut self, mut source: S, probed: Probed, openers: &mut O) -> Result<O::Output, ProbeError>
    where
        S: ByteSource,
        O: Openers<S>,
    {
        let Probed { codec, serial, first_packet } = probed;
        let result = match (codec.route(), codec) {
            (Route::Handoff, CodecId::Vorbis | CodecId::Speex) => {
                let handoff = Handoff {
                    source,
                    sync:    std::mem::take(&mut self.sync),
                    parser:  std::mem::take(&mut self.parser),
                    tracker: std::mem::take(&mut self.tracker),
                    codec,
                    serial,
                    first_packet,
                };
                self.enter(ProbeState::Dispatched);
                if codec == CodecId::Vorbis {
                    openers.open_vorbis(handoff)
                } else {
                    openers.open_speex(handoff)
                }
            }
            (Route::Reprobe, CodecId::Flac | CodecId::FlacLegacy) => {
                debug!(origin = self.origin, "re-probing with the native FLAC opener");
                self.reset();
                if let Err(e) = source.seek_absolute(self.origin) {
                    self.enter(ProbeState::NotSeekable);
                    return Err(ProbeError::NotSeekable(e));
                }
                self.enter(ProbeState::Dispatched);
                openers.open_flac(codec, source)
            }
            (Route::Unsupported(reason), _) => {
                self.enter(ProbeState::Unsupported);
                return Err(ProbeError::Unsupported { codec, reason });
            }
            _ => {
                self.enter(ProbeState::Unsupported);
                return Err(ProbeError::Unsupported { codec, reason: "no opener for this codec" });
            }
        };
        result.map_err(|source| ProbeError::Open { codec, source })
    }

    // ── Steps ───────────────────────────────────────────────────────────────

    /// `Start → Buffering`.
    fn fill<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<(), ProbeError> {
        let budget = self.config.effective_budget();
        let position = source.current_position()?;
        self.origin = position;

        let prefix_len = source.buffered_prefix().len();
        if self.config.reuse_sniffed_prefix && prefix_len > 0 && position == prefix_len as u64 {
            debug!(bytes = prefix_len, "reusing sniffed header prefix");
            self.sync.append(source.buffered_prefix());
        } else if let Err(e) = source.seek_absolute(0) {
            self.enter(ProbeState::NotSeekable);
            return Err(ProbeError::NotSeekable(e));
        }

        let wanted = budget.saturating_sub(self.sync.available());
        let read = read_full(source, self.sync.reserve(wanted))?;
        self.sync.commit(read);

        self.short_read = self.sync.available() < budget;
        if self.short_read {
            self.parser.signal_end_of_input();
        }
        trace!(buffered = self.sync.available(), budget, short = self.short_read, "probe buffer filled");
        self.enter(ProbeState::Buffering);
        Ok(())
    }

    /// `Buffering → PageAcquired`.
    fn first_page(&mut self) -> Result<Option<Page>, ProbeError> {
        if let Ok(Some(page)) = self.parser.next_page(&mut self.sync) {
            self.enter(ProbeState::PageAcquired);
            return Ok(Some(page));
        }
        if self.short_read {
            debug!(buffered = self.sync.write_cursor(), "short read without a page: not Ogg");
            return Ok(None);
        }
        let stats = self.parser.stats();
        if stats.saw_capture() || PageParser::has_pending_candidate(&self.sync) {
            return Err(self.malformed("input does not appear to be an Ogg bitstream"));
        }
        debug!(skipped = stats.bytes_skipped, "no capture pattern within the probe budget: not Ogg");
        Ok(None)
    }

    /// Pull pages from what is already buffered until the stream's first
    /// packet is complete.
    fn first_packet(&mut self) -> Result<Packet, ProbeError> {
        loop {
            if let Some(packet) = self.tracker.extract_first_packet() {
                return Ok(packet);
            }
            match self.parser.next_page(&mut self.sync) {
                Ok(Some(page)) => {
                    self.tracker.ingest(&page);
                }
                Ok(None) | Err(_) => {
                    return Err(self.malformed("initial header packet is not complete within the probe budget"));
                }
            }
        }
    }

    fn malformed(&mut self, msg: &str) -> ProbeError {
        self.enter(ProbeState::Malformed);
        ProbeError::Malformed(msg.to_string())
    }

    fn enter(&mut self, next: ProbeState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "probe state");
        }
        self.state = next;
    }
}

impl Default for ProbeController {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}
