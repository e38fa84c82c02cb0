//! Output sink with optional compression.
//!
//! Every archive byte passes through [`CompressionSink::send`], which runs it
//! through the selected encoder and into the caller's writer. The byte
//! counter sits between the encoder and the writer, so it reports what has
//! actually been delivered (compressed bytes when compressing).
//!
//! The supported algorithms form a closed set, [`Compression`], with a
//! static table of per-algorithm metadata. Registration order matters for
//! suffix detection: gzip, bzip2, zstd.

use std::{
    fmt,
    io::{self, Write},
    ops::RangeInclusive,
    str::FromStr,
};

use log::debug;
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    options::{ArchiveOptions, CompressionLevel},
};

/// MIME type of an uncompressed archive.
pub const TAR_MIME_TYPE: &str = "application/x-tar";

/// A supported compression algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gzip,
    Bzip2,
    Zstd,
}

/// Static description of a compression algorithm.
#[derive(Debug)]
pub struct CompressionInfo {
    /// Key used in options and on the command line.
    pub key: &'static str,
    /// MIME type of the compressed archive.
    pub mime_type: &'static str,
    /// Level used when none is given.
    pub default_level: i32,
    /// Accepted levels.
    pub levels: RangeInclusive<i32>,
    /// Lowercase filename suffixes that select this algorithm.
    pub suffixes: &'static [&'static str],
}

static REGISTRY: [CompressionInfo; 3] = [
    CompressionInfo {
        key: "gzip",
        mime_type: "application/gzip",
        default_level: 6,
        levels: 0..=9,
        suffixes: &[".tar.gz", ".tgz", ".gz"],
    },
    CompressionInfo {
        key: "bzip2",
        mime_type: "application/x-bzip2",
        default_level: 9,
        levels: 1..=9,
        suffixes: &[".tar.bz2", ".tbz2", ".tbz", ".bz2"],
    },
    CompressionInfo {
        key: "zstd",
        mime_type: "application/zstd",
        default_level: 3,
        levels: 1..=22,
        suffixes: &[".tar.zst", ".tzst", ".zst"],
    },
];

impl Compression {
    /// All algorithms, in registration order.
    pub const ALL: [Compression; 3] = [Compression::Gzip, Compression::Bzip2, Compression::Zstd];

    #[must_use]
    pub fn info(self) -> &'static CompressionInfo {
        match self {
            Compression::Gzip => &REGISTRY[0],
            Compression::Bzip2 => &REGISTRY[1],
            Compression::Zstd => &REGISTRY[2],
        }
    }

    #[must_use]
    pub fn key(self) -> &'static str {
        self.info().key
    }

    #[must_use]
    pub fn mime_type(self) -> &'static str {
        self.info().mime_type
    }

    /// Match an archive name against each algorithm's suffixes, in
    /// registration order. The comparison ignores ASCII case.
    #[must_use]
    pub fn detect(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.info().suffixes.iter().any(|s| name.ends_with(s)))
    }

    /// Choose the compression for an archive: the explicit override if set,
    /// otherwise suffix detection if enabled, otherwise none.
    #[must_use]
    pub fn select(name: &str, options: &ArchiveOptions) -> Option<Self> {
        match options.compress {
            Some(compression) => Some(compression),
            None if options.auto_compress => Self::detect(name),
            None => None,
        }
    }

    /// Turn a requested level into a concrete one for this algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] if the level is outside the
    /// algorithm's accepted range.
    pub fn resolve_level(self, level: CompressionLevel) -> Result<i32> {
        let info = self.info();
        match level {
            CompressionLevel::Auto => Ok(info.default_level),
            CompressionLevel::Level(level) if info.levels.contains(&level) => Ok(level),
            CompressionLevel::Level(level) => Err(Error::InvalidOption(format!(
                "{} level {level} not in {}..={}",
                info.key,
                info.levels.start(),
                info.levels.end()
            ))),
        }
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownCompression(s.to_string()))
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Preamble
// ============================================================================

/// Transport metadata describing the archive, handed to the preamble hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preamble {
    pub content_type: String,
    pub filename: String,
}

impl Preamble {
    /// HTTP response headers announcing the archive as a download, followed
    /// by the blank line that ends the header block.
    #[must_use]
    pub fn http_headers(&self) -> String {
        let filename = self.filename.replace(['"', '\\'], "_");
        format!(
            "Content-Type: {}\r\nContent-Disposition: attachment; filename=\"{filename}\"\r\n\r\n",
            self.content_type
        )
    }
}

/// Hook run once, before the first archive byte, with the raw output sink.
/// Bytes it writes are not counted as archive bytes.
pub type PreambleHook = Box<dyn FnOnce(&Preamble, &mut dyn Write) -> io::Result<()>>;

/// The preamble hook used when none is supplied: write HTTP headers.
#[must_use]
pub fn http_preamble_hook() -> PreambleHook {
    Box::new(|preamble, sink| sink.write_all(preamble.http_headers().as_bytes()))
}

// ============================================================================
// Sink
// ============================================================================

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum Encoder<W: Write> {
    Plain(W),
    Gzip(flate2::write::GzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Zstd(zstd::Encoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    fn new(writer: W, compression: Option<Compression>, level: i32) -> io::Result<Self> {
        // levels are validated against the registry before this point
        let level_u32 = level.max(0) as u32;
        Ok(match compression {
            None => Encoder::Plain(writer),
            Some(Compression::Gzip) => Encoder::Gzip(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::new(level_u32),
            )),
            Some(Compression::Bzip2) => Encoder::Bzip2(bzip2::write::BzEncoder::new(
                writer,
                bzip2::Compression::new(level_u32),
            )),
            Some(Compression::Zstd) => Encoder::Zstd(zstd::Encoder::new(writer, level)?),
        })
    }

    fn get_ref(&self) -> &W {
        match self {
            Encoder::Plain(w) => w,
            Encoder::Gzip(e) => e.get_ref(),
            Encoder::Bzip2(e) => e.get_ref(),
            Encoder::Zstd(e) => e.get_ref(),
        }
    }

    fn get_mut(&mut self) -> &mut W {
        match self {
            Encoder::Plain(w) => w,
            Encoder::Gzip(e) => e.get_mut(),
            Encoder::Bzip2(e) => e.get_mut(),
            Encoder::Zstd(e) => e.get_mut(),
        }
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Plain(w) => Ok(w),
            Encoder::Gzip(e) => e.finish(),
            Encoder::Bzip2(e) => e.finish(),
            Encoder::Zstd(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Plain(w) => w.write(buf),
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Bzip2(e) => e.write(buf),
            Encoder::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Plain(w) => w.flush(),
            Encoder::Gzip(e) => e.flush(),
            Encoder::Bzip2(e) => e.flush(),
            Encoder::Zstd(e) => e.flush(),
        }
    }
}

enum SinkState<W: Write> {
    Open(Encoder<CountingWriter<W>>),
    Finished(CountingWriter<W>),
    /// Finalizing the encoder failed; holds the count from before.
    Failed(u64),
}

/// Single chokepoint for archive output.
pub struct CompressionSink<W: Write> {
    state: SinkState<W>,
    compression: Option<Compression>,
    preamble: Option<(Preamble, PreambleHook)>,
}

impl<W: Write> CompressionSink<W> {
    /// Wrap `writer`, compressing with `compression` at `level` if set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] for an out-of-range level and
    /// [`Error::Io`] if the encoder cannot be set up.
    pub fn new(writer: W, compression: Option<Compression>, level: CompressionLevel) -> Result<Self> {
        let level = match compression {
            Some(c) => c.resolve_level(level)?,
            None => 0,
        };
        if let Some(c) = compression {
            debug!("compressing output with {c} at level {level}");
        }

        let counter = CountingWriter {
            inner: writer,
            count: 0,
        };
        Ok(Self {
            state: SinkState::Open(Encoder::new(counter, compression, level)?),
            compression,
            preamble: None,
        })
    }

    /// Arrange for `hook` to run once, just before the first byte is sent.
    pub fn set_preamble(&mut self, preamble: Preamble, hook: PreambleHook) {
        self.preamble = Some((preamble, hook));
    }

    #[must_use]
    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// Total bytes delivered to the underlying writer so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        match &self.state {
            SinkState::Open(encoder) => encoder.get_ref().count,
            SinkState::Finished(counter) => counter.count,
            SinkState::Failed(count) => *count,
        }
    }

    /// Send archive bytes and return the running total.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] once the sink is finished, and
    /// [`Error::Io`] if the preamble hook or the writer fails.
    pub fn send(&mut self, bytes: &[u8]) -> Result<u64> {
        let SinkState::Open(encoder) = &mut self.state else {
            return Err(Error::SessionClosed);
        };

        if let Some((preamble, hook)) = self.preamble.take() {
            debug!("emitting preamble for {:?}", preamble.filename);
            hook(&preamble, &mut encoder.get_mut().inner)?;
        }

        encoder.write_all(bytes)?;
        Ok(encoder.get_ref().count)
    }

    /// Flush buffered output through to the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        match &mut self.state {
            SinkState::Open(encoder) => encoder.flush()?,
            SinkState::Finished(counter) => counter.flush()?,
            SinkState::Failed(_) => {}
        }
        Ok(())
    }

    /// Finalize the encoder and flush. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if writing the encoder trailer fails, after
    /// which the sink is unusable.
    pub fn finish(&mut self) -> Result<u64> {
        let before = self.total();
        match std::mem::replace(&mut self.state, SinkState::Failed(before)) {
            SinkState::Open(encoder) => {
                let mut counter = encoder.finish()?;
                counter.flush()?;
                debug!("output finished after {} bytes", counter.count);
                self.state = SinkState::Finished(counter);
            }
            finished @ SinkState::Finished(_) => self.state = finished,
            SinkState::Failed(_) => {
                return Err(io::Error::other("output sink failed while finishing").into())
            }
        }
        Ok(self.total())
    }

    /// Finish and return the underlying writer.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`CompressionSink::finish`].
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        match self.state {
            SinkState::Finished(counter) => Ok(counter.inner),
            _ => Err(io::Error::other("output sink failed while finishing").into()),
        }
    }
}
