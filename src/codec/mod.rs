//! Codec registry: identification-packet signatures and classification.
//!
//! # Matching rules
//! The first packet of a logical stream is compared against
//! [`CLASSIFICATION_TABLE`] in order.  An entry whose signature is longer
//! than the packet is skipped; otherwise the signature must equal the
//! packet's prefix byte for byte.  The first match wins, even when a later
//! entry would also match.  Table order is part of the contract.
//!
//! # Routes
//! Each entry also says what the probe does with a match: hand the stream
//! state to a codec opener, re-open the file with a native opener that
//! does its own framing, or refuse it.

use serde::Serialize;
use std::fmt;

// ── CodecId enum ─────────────────────────────────────────────────────────────

/// Payload codec carried by a logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CodecId {
    Annodex,
    AnxData,
    /// `\x7fFLAC` mapping.
    FlacLegacy,
    /// `fLaC` mapping.
    Flac,
    Pcm,
    Speex,
    Vorbis,
}

impl CodecId {
    /// Table entry for this codec.
    pub fn signature(self) -> &'static Signature {
        // Every variant has exactly one entry; the table is indexed in
        // declaration order.
        &CLASSIFICATION_TABLE[self as usize]
    }

    /// Display name as logged.  Not meant to be parsed back.
    pub fn name(self) -> &'static str {
        self.signature().name
    }

    pub fn route(self) -> Route {
        self.signature().route
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "annodex"              => Some(CodecId::Annodex),
            "anxdata"              => Some(CodecId::AnxData),
            "flac1" | "flaclegacy" => Some(CodecId::FlacLegacy),
            "flac0" | "flac"       => Some(CodecId::Flac),
            "pcm"                  => Some(CodecId::Pcm),
            "speex"                => Some(CodecId::Speex),
            "vorbis"               => Some(CodecId::Vorbis),
            _                      => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Routes ───────────────────────────────────────────────────────────────────

/// What the probe controller does with a classified stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Hand synchronization and stream state to the codec's opener.
    Handoff,
    /// Discard probe state, rewind, and let a native opener re-read the file.
    Reprobe,
    /// Recognized but refused.
    Unsupported(&'static str),
}

// ── Signature table ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub codec: CodecId,
    pub magic: &'static [u8],
    pub name:  &'static str,
    pub route: Route,
}

impl Signature {
    /// Whether `packet` begins with this signature.  Never reads past the
    /// end of `packet`.
    pub fn matches(&self, packet: &[u8]) -> bool {
        packet.len() >= self.magic.len() && &packet[..self.magic.len()] == self.magic
    }
}

const UNKNOWN_DATA: &str = "unknown data type";

/// Ordered signature table.  Do not reorder: position decides ties.
pub static CLASSIFICATION_TABLE: [Signature; 7] = [
    Signature { codec: CodecId::Annodex,    magic: b"Annodex",    name: "Annodex", route: Route::Unsupported(UNKNOWN_DATA) },
    Signature { codec: CodecId::AnxData,    magic: b"AnxData",    name: "AnxData", route: Route::Unsupported(UNKNOWN_DATA) },
    Signature { codec: CodecId::FlacLegacy, magic: b"\x7fFLAC",   name: "Flac1",   route: Route::Reprobe },
    Signature { codec: CodecId::Flac,       magic: b"fLaC",       name: "Flac0",   route: Route::Reprobe },
    Signature { codec: CodecId::Pcm,        magic: b"PCM     ",   name: "PCM",     route: Route::Unsupported("not supported yet") },
    Signature { codec: CodecId::Speex,      magic: b"Speex",      name: "Speex",   route: Route::Handoff },
    Signature { codec: CodecId::Vorbis,     magic: b"\x01vorbis", name: "Vorbis",  route: Route::Handoff },
];

// ── Classification ───────────────────────────────────────────────────────────

/// Leading bytes of an unrecognized packet, for the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureDump {
    /// Up to 8 bytes, non-printable ones replaced by `.`.
    pub printable: String,
    /// The same bytes as space-separated lowercase hex pairs.
    pub hex:       String,
}

impl SignatureDump {
    pub const MAX_BYTES: usize = 8;

    pub fn of(packet: &[u8]) -> Self {
        let head = &packet[..packet.len().min(Self::MAX_BYTES)];
        let printable = head
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let hex = head
            .iter()
            .map(|b| hex::encode([*b]))
            .collect::<Vec<_>>()
            .join(" ");
        Self { printable, hex }
    }
}

impl fmt::Display for SignatureDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'  {}", self.printable, self.hex)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Known(Signature),
    Unknown(SignatureDump),
}

impl Classification {
    pub fn codec(&self) -> Option<CodecId> {
        match self {
            Classification::Known(sig) => Some(sig.codec),
            Classification::Unknown(_) => None,
        }
    }
}

/// Classify an identification packet.  Pure: logging is left to the caller.
pub fn classify(packet: &[u8]) -> Classification {
    classify_with(&CLASSIFICATION_TABLE, packet)
}

/// First-match classification against an arbitrary ordered table.
pub fn classify_with(table: &[Signature], packet: &[u8]) -> Classification {
    table
        .iter()
        .find(|sig| sig.matches(packet))
        .map(|sig| Classification::Known(*sig))
        .unwrap_or_else(|| Classification::Unknown(SignatureDump::of(packet)))
}
