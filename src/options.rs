//! Archive session configuration.
//!
//! Options are a plain struct with compile-time defaults. They can also be
//! loaded from TOML; keys that are absent keep their default:
//!
//! ```toml
//! preserve_hardlinks = false
//! compress = "zstd"
//! compress_level = 19
//! buffer_size = 1048576
//! ```

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::{
    compress::Compression,
    error::{Error, Result},
};

/// Default chunk size for reading file content.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Compression level: a number, or `auto` for the algorithm's default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "LevelRepr")]
pub enum CompressionLevel {
    #[default]
    Auto,
    Level(i32),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Number(i32),
    Word(String),
}

impl TryFrom<LevelRepr> for CompressionLevel {
    type Error = Error;

    fn try_from(repr: LevelRepr) -> Result<Self> {
        match repr {
            LevelRepr::Number(level) => Ok(CompressionLevel::Level(level)),
            LevelRepr::Word(word) => word.parse(),
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(CompressionLevel::Auto);
        }
        s.parse()
            .map(CompressionLevel::Level)
            .map_err(|_| Error::InvalidOption(format!("compression level {s:?}")))
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionLevel::Auto => f.write_str("auto"),
            CompressionLevel::Level(level) => write!(f, "{level}"),
        }
    }
}

/// Configuration of an archive session.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveOptions {
    /// Keep leading slashes in entry paths instead of stripping them.
    pub allow_absolute_path: bool,

    /// Store symlinks as link entries rather than archiving their target.
    pub preserve_symlinks: bool,

    /// Store repeated (device, inode) pairs as hard link entries.
    pub preserve_hardlinks: bool,

    /// Pick the compression from the archive name's suffix.
    pub auto_compress: bool,

    /// Explicit compression, taking priority over auto-detection.
    pub compress: Option<Compression>,

    /// Compression level.
    pub compress_level: CompressionLevel,

    /// Chunk size used when streaming file content.
    pub buffer_size: usize,

    /// Emit the preamble hook before the first archive byte.
    pub emit_preamble: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            allow_absolute_path: false,
            preserve_symlinks: true,
            preserve_hardlinks: true,
            auto_compress: true,
            compress: None,
            compress_level: CompressionLevel::Auto,
            buffer_size: DEFAULT_BUFFER_SIZE,
            emit_preamble: false,
        }
    }
}

impl ArchiveOptions {
    /// Parse options from TOML content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the TOML is invalid or names an unknown
    /// key, and [`Error::InvalidOption`] if a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Check values that the type system does not constrain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] for a zero `buffer_size`.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::InvalidOption("buffer_size must be non-zero".into()));
        }
        Ok(())
    }
}
