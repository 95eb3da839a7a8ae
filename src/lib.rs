pub mod config;
pub mod sync;
pub mod page;
pub mod stream;
pub mod codec;
pub mod io_stream;
pub mod probe;
pub mod recovery;

pub use config::{ConfigError, ProbeConfig, DEFAULT_PROBE_BUDGET};
pub use sync::SyncBuffer;
pub use page::{Page, PageError, PageHeader, PageParser, SyncStats};
pub use stream::{Packet, StreamTracker};
pub use codec::{classify, Classification, CodecId, Route, SignatureDump};
pub use io_stream::{ByteSource, PipeSource, SeekableSource};
pub use probe::{Handoff, OpenError, Openers, ProbeController, ProbeError, ProbeResult, ProbeState, Probed};
pub use recovery::{scan, scan_file, ScanQuality, ScanReport};
