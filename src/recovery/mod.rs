//! Damage assessment for whole Ogg files.

pub mod scanner;

pub use scanner::{
    scan, scan_file, scan_with_progress, ScanQuality, ScanReport, ScannedPage, StreamSummary,
    DEFAULT_SCAN_CHUNK,
};
