//! Error types for archive streaming.
//!
//! Every fallible operation returns [`Result<T>`], an alias for
//! `Result<T, Error>`.
//!
//! # Error Categories
//!
//! - **Header validation**: [`InvalidPath`], [`PathTooLong`], [`LinkTooLong`],
//!   [`FieldOverflow`], [`InvalidType`], [`NameTooLong`]
//! - **Collaborator failures**: [`Stat`], [`Read`]
//! - **Stream integrity**: [`SizeMismatch`], [`SessionClosed`]
//! - **Configuration**: [`UnknownCompression`], [`InvalidOption`], [`Config`]
//! - **Sink failures**: [`Io`]
//!
//! Header validation happens before any byte of an entry is emitted, so
//! those errors leave the archive intact. Everything else may surface after
//! the entry's header is already on the wire; the archive must then be
//! treated as corrupt.
//!
//! [`InvalidPath`]: Error::InvalidPath
//! [`PathTooLong`]: Error::PathTooLong
//! [`LinkTooLong`]: Error::LinkTooLong
//! [`FieldOverflow`]: Error::FieldOverflow
//! [`InvalidType`]: Error::InvalidType
//! [`NameTooLong`]: Error::NameTooLong
//! [`Stat`]: Error::Stat
//! [`Read`]: Error::Read
//! [`SizeMismatch`]: Error::SizeMismatch
//! [`SessionClosed`]: Error::SessionClosed
//! [`UnknownCompression`]: Error::UnknownCompression
//! [`InvalidOption`]: Error::InvalidOption
//! [`Config`]: Error::Config
//! [`Io`]: Error::Io

use std::path::PathBuf;

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building an archive stream.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path contains a `..` component or is empty.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// The path does not fit in the name and prefix fields.
    #[error("path too long: {len} bytes > {limit} bytes: {path:?}")]
    PathTooLong {
        /// The offending path.
        path: String,
        /// Its length in bytes.
        len: usize,
        /// Maximum accepted length.
        limit: usize,
    },

    /// The link target does not fit in the linkname field.
    #[error("link target too long: {len} bytes > {limit} bytes: {link:?}")]
    LinkTooLong {
        /// The offending link target.
        link: String,
        /// Its length in bytes.
        len: usize,
        /// Maximum accepted length.
        limit: usize,
    },

    /// A numeric value is not representable in its octal field.
    #[error("value {value} does not fit in the {field} field")]
    FieldOverflow {
        /// Header field name.
        field: &'static str,
        /// The rejected value.
        value: i128,
    },

    /// The entry type tag is not one of `'0'` to `'6'`.
    #[error("invalid entry type {0:?}")]
    InvalidType(String),

    /// An owner name does not fit in its 32-byte field.
    #[error("{field} name too long: {len} bytes")]
    NameTooLong {
        /// Header field name.
        field: &'static str,
        /// Length of the rejected name in bytes.
        len: usize,
    },

    /// Metadata for a source path could not be retrieved.
    #[error("failed to stat {path:?}: {source}")]
    Stat {
        /// The source path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Content of a source path could not be read.
    #[error("failed to read {path:?}: {source}")]
    Read {
        /// The source path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The content read differs in length from the size already committed
    /// to the header. The archive is corrupt.
    #[error("size of {path:?} changed while archiving: header says {expected} bytes, read {actual}")]
    SizeMismatch {
        /// The source path.
        path: PathBuf,
        /// Size written into the header.
        expected: u64,
        /// Number of bytes actually read (a lower bound when the file grew).
        actual: u64,
    },

    /// An entry was added after the archive was finished.
    #[error("archive session is already finished")]
    SessionClosed,

    /// No compression algorithm is registered under this key.
    #[error("unknown compression type {0:?}")]
    UnknownCompression(String),

    /// An option value was rejected.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// The options file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Writing to the output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
