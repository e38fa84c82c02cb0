//! Streaming USTAR archive writer.
//!
//! Entries are encoded and pushed to an output sink as they are added, so an
//! archive of any size is produced with bounded memory. Output can be
//! compressed with gzip, bzip2 or zstd, picked explicitly or from the archive
//! name's suffix.
//!
//! The main entry point is [`TarStream`].

pub mod archive;
pub mod compress;
pub mod error;
pub mod header;
pub mod link;
pub mod options;
pub mod source;

mod util;

pub use archive::{SessionState, TarStream};
pub use compress::{Compression, Preamble, PreambleHook};
pub use error::{Error, Result};
pub use header::{EntryFields, EntryType};
pub use options::{ArchiveOptions, CompressionLevel};
pub use source::{FileSource, LocalFs};
