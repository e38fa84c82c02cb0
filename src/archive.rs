//! Archive sessions.
//!
//! A [`TarStream`] owns an output sink and turns a sequence of add calls into
//! a USTAR byte stream. Every byte goes through a single [`CompressionSink`],
//! so the running total is always the number of bytes actually delivered.
//!
//! ```no_run
//! use tarstream::{ArchiveOptions, EntryFields, TarStream};
//!
//! let mut tar = TarStream::new("backup.tar.gz", ArchiveOptions::default(), std::io::stdout())?;
//! tar.add_buffer("hello.txt", b"hello\n", &EntryFields::new())?;
//! tar.add_file("etc/hostname", "/etc/hostname")?;
//! tar.finish()?;
//! # Ok::<(), tarstream::Error>(())
//! ```

use std::{collections::HashSet, io::Write, path::Path};

use log::{debug, trace, warn};

use crate::{
    compress::{
        http_preamble_hook, Compression, CompressionSink, Preamble, PreambleHook, TAR_MIME_TYPE,
    },
    error::{Error, Result},
    header::{encode_header, normalize_path, EntryFields, EntryType, HEADER_SIZE},
    link::{IdentityKey, LinkResolver, ResolvedEntry},
    options::ArchiveOptions,
    source::{FileKind, FileSource, LocalFs, Metadata},
    util::{padding, read_fill},
};

/// Mode given to directory entries when the caller does not pick one.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

static ZERO_BLOCK: [u8; HEADER_SIZE] = [0; HEADER_SIZE];

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has been written yet.
    Created,
    /// At least one byte has been sent.
    Streaming,
    /// The end-of-archive marker is written and the output finalized.
    Finished,
}

/// A streaming tar writer.
///
/// Files are read through `S`, which is the local filesystem unless a
/// different [`FileSource`] is supplied with [`TarStream::with_source`].
pub struct TarStream<W: Write, S: FileSource = LocalFs> {
    name: String,
    options: ArchiveOptions,
    sink: CompressionSink<W>,
    source: S,
    links: Option<LinkResolver>,
    state: SessionState,
}

impl<W: Write> TarStream<W, LocalFs> {
    /// Start a session writing an archive called `name` to `writer`.
    ///
    /// The name only matters for compression auto-detection and the
    /// preamble; it is never written to the archive itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] if the options are inconsistent, or
    /// [`Error::Io`] if the compressor cannot be set up.
    pub fn new(name: impl Into<String>, options: ArchiveOptions, writer: W) -> Result<Self> {
        Self::with_source(name, options, writer, LocalFs)
    }
}

impl<W: Write, S: FileSource> TarStream<W, S> {
    /// Like [`TarStream::new`], reading files through `source`.
    ///
    /// # Errors
    ///
    /// See [`TarStream::new`].
    pub fn with_source(
        name: impl Into<String>,
        options: ArchiveOptions,
        writer: W,
        source: S,
    ) -> Result<Self> {
        let name = name.into();
        options.validate()?;

        let compression = Compression::select(&name, &options);
        let sink = CompressionSink::new(writer, compression, options.compress_level)?;
        debug!(
            "starting archive {name:?} ({})",
            compression.map_or("uncompressed", Compression::key)
        );

        let mut stream = Self {
            name,
            options,
            sink,
            source,
            links: None,
            state: SessionState::Created,
        };
        if stream.options.emit_preamble {
            let preamble = stream.preamble();
            stream.sink.set_preamble(preamble, http_preamble_hook());
        }
        Ok(stream)
    }

    /// Replace the preamble hook. It only runs if `emit_preamble` is set,
    /// and has no effect once output has started.
    #[must_use]
    pub fn with_preamble_hook(mut self, hook: PreambleHook) -> Self {
        if self.options.emit_preamble && self.state == SessionState::Created {
            let preamble = self.preamble();
            self.sink.set_preamble(preamble, hook);
        }
        self
    }

    /// Transport metadata for this archive.
    #[must_use]
    pub fn preamble(&self) -> Preamble {
        let filename = self.name.rsplit('/').next().unwrap_or(&self.name);
        Preamble {
            content_type: self.content_type().to_string(),
            filename: filename.to_string(),
        }
    }

    /// MIME type of the output: the compression's, or plain tar.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.compression()
            .map_or(TAR_MIME_TYPE, Compression::mime_type)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    #[must_use]
    pub fn compression(&self) -> Option<Compression> {
        self.sink.compression()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes delivered to the output so far, after compression and not
    /// counting the preamble.
    ///
    /// With compression the total only moves when the encoder hands data on,
    /// so it can stay at the encoder's header size across several entries
    /// until [`TarStream::flush`] or [`TarStream::finish`].
    #[must_use]
    pub fn bytes_emitted(&self) -> u64 {
        self.sink.total()
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            SessionState::Finished => Err(Error::SessionClosed),
            _ => Ok(()),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<u64> {
        let total = self.sink.send(bytes)?;
        self.state = SessionState::Streaming;
        Ok(total)
    }

    fn send_padding(&mut self, len: u64) -> Result<u64> {
        let pad = padding(len, HEADER_SIZE as u64) as usize;
        self.send(&ZERO_BLOCK[..pad])
    }

    /// Add an entry whose content is `data`.
    ///
    /// The entry type and other header values come from `fields`; content
    /// is written for every type, so links and directories should be given
    /// an empty buffer.
    ///
    /// Returns the running total from [`TarStream::bytes_emitted`]. Under
    /// compression that is what the encoder has delivered so far, which
    /// usually trails the entry just added.
    ///
    /// # Errors
    ///
    /// Header validation errors leave the output untouched. Returns
    /// [`Error::SessionClosed`] after [`TarStream::finish`].
    pub fn add_buffer(&mut self, path: &str, data: &[u8], fields: &EntryFields) -> Result<u64> {
        self.check_open()?;
        let header = encode_header(
            path,
            data.len() as u64,
            fields,
            self.options.allow_absolute_path,
        )?;
        trace!("adding {path:?} from buffer ({} bytes)", data.len());

        self.send(header.as_block())?;
        self.send(data)?;
        self.send_padding(data.len() as u64)
    }

    /// Add a directory entry. A trailing slash is appended to `path` if
    /// missing, and the mode defaults to `0o755`.
    ///
    /// # Errors
    ///
    /// As for [`TarStream::add_buffer`].
    pub fn add_directory(&mut self, path: &str, fields: &EntryFields) -> Result<u64> {
        let path = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let fields = EntryFields {
            entry_type: Some(EntryType::Directory),
            mode: fields.mode.or(Some(DEFAULT_DIR_MODE)),
            ..fields.clone()
        };
        self.add_buffer(&path, &[], &fields)
    }

    /// Add the file at `source_path` under the name `archive_path`.
    ///
    /// Ownership, mode and mtime come from the file. Symlinks and repeated
    /// hard links become link entries as configured; a directory becomes a
    /// directory entry without its contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stat`] or [`Error::Read`] if the file is
    /// inaccessible, and [`Error::SizeMismatch`] if its length changes
    /// while it is read. A size mismatch leaves the archive corrupt.
    pub fn add_file(&mut self, archive_path: &str, source_path: impl AsRef<Path>) -> Result<u64> {
        self.check_open()?;
        let source_path = source_path.as_ref();
        let meta = self
            .source
            .metadata(source_path, !self.options.preserve_symlinks)?;
        self.add_with_metadata(archive_path, source_path, &meta)
    }

    /// Add `source_path` and, if it is a directory, everything below it,
    /// in sorted order. An empty `archive_root` places the directory's
    /// children at the top of the archive.
    ///
    /// Sockets, devices and other special files are skipped with a warning.
    ///
    /// # Errors
    ///
    /// As for [`TarStream::add_file`], stopping at the first failure.
    pub fn add_tree(&mut self, archive_root: &str, source_path: impl AsRef<Path>) -> Result<u64> {
        self.check_open()?;
        let mut visited = HashSet::new();
        self.walk(archive_root, source_path.as_ref(), &mut visited)?;
        Ok(self.bytes_emitted())
    }

    fn walk(
        &mut self,
        archive_path: &str,
        source_path: &Path,
        visited: &mut HashSet<IdentityKey>,
    ) -> Result<()> {
        let meta = self
            .source
            .metadata(source_path, !self.options.preserve_symlinks)?;

        if meta.kind == FileKind::Other {
            warn!("skipping special file {source_path:?}");
            return Ok(());
        }

        let is_root = archive_path.trim_matches('/').is_empty();
        if !(is_root && meta.is_dir()) {
            self.add_with_metadata(archive_path, source_path, &meta)?;
        }

        if meta.is_dir() {
            if !visited.insert(IdentityKey::from(&meta)) {
                warn!("not descending into {source_path:?} again");
                return Ok(());
            }

            let base = archive_path.trim_end_matches('/');
            for child in self.source.read_dir(source_path)? {
                let Some(file_name) = child.file_name() else {
                    continue;
                };
                let file_name = file_name.to_str().ok_or_else(|| {
                    Error::InvalidPath(file_name.to_string_lossy().into_owned())
                })?;
                let child_path = if base.is_empty() {
                    file_name.to_string()
                } else {
                    format!("{base}/{file_name}")
                };
                self.walk(&child_path, &child, visited)?;
            }
        }

        Ok(())
    }

    fn add_with_metadata(
        &mut self,
        archive_path: &str,
        source_path: &Path,
        meta: &Metadata,
    ) -> Result<u64> {
        let fields = EntryFields {
            mode: Some(meta.mode),
            uid: Some(meta.uid),
            gid: Some(meta.gid),
            mtime: Some(meta.mtime),
            ..Default::default()
        };

        if meta.is_dir() {
            return self.add_directory(archive_path, &fields);
        }
        if meta.kind == FileKind::Other {
            return Err(Error::Read {
                path: source_path.to_path_buf(),
                source: std::io::Error::other("not a regular file, directory or symlink"),
            });
        }

        let resolved = self
            .links
            .get_or_insert_with(LinkResolver::new)
            .resolve(meta, &self.options);

        let fields = match &resolved {
            ResolvedEntry::Symlink { target } => fields.entry_type(EntryType::Symlink).link(target),
            ResolvedEntry::HardLink { target } => fields.entry_type(EntryType::Link).link(target),
            ResolvedEntry::Regular { .. } | ResolvedEntry::FirstLink { .. } => fields,
        };

        let size = resolved.size();
        let header = encode_header(archive_path, size, &fields, self.options.allow_absolute_path)?;

        if let ResolvedEntry::FirstLink { key, .. } = resolved {
            let stored = normalize_path(archive_path, self.options.allow_absolute_path)?;
            if let Some(links) = &mut self.links {
                links.record(key, stored);
            }
        }

        trace!("adding {archive_path:?} from {source_path:?} as {resolved:?}");
        let total = self.send(header.as_block())?;
        if resolved.is_link() {
            return Ok(total);
        }
        self.send_content(source_path, size)
    }

    /// Stream exactly `expected` bytes of `path`, then pad.
    fn send_content(&mut self, path: &Path, expected: u64) -> Result<u64> {
        let read_error = |source: std::io::Error| Error::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = self.source.open(path)?;
        let mut buffer = vec![0; self.options.buffer_size];
        let mut sent = 0u64;

        while sent < expected {
            let want = (expected - sent).min(buffer.len() as u64) as usize;
            let n = read_fill(&mut reader, &mut buffer[..want]).map_err(read_error)?;
            self.send(&buffer[..n])?;
            sent += n as u64;
            if n < want {
                break;
            }
        }

        // A file that grew would have more to give.
        if sent == expected && read_fill(&mut reader, &mut [0; 1]).map_err(read_error)? > 0 {
            sent += 1;
        }
        if sent != expected {
            return Err(Error::SizeMismatch {
                path: path.to_path_buf(),
                expected,
                actual: sent,
            });
        }

        self.send_padding(expected)
    }

    /// Push everything added so far through the encoder to the output, for
    /// consumers that read the stream while it is being written.
    ///
    /// Compressors emit a sync point here, so flushing after every entry
    /// costs some compression ratio.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] after [`TarStream::finish`], and
    /// [`Error::Io`] if the output fails.
    pub fn flush(&mut self) -> Result<u64> {
        self.check_open()?;
        self.sink.flush()?;
        Ok(self.bytes_emitted())
    }

    /// Write the end-of-archive marker and finalize the output.
    ///
    /// Calling it again returns the same total without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the output fails.
    pub fn finish(&mut self) -> Result<u64> {
        if self.state == SessionState::Finished {
            return Ok(self.bytes_emitted());
        }

        self.send(&ZERO_BLOCK)?;
        self.send(&ZERO_BLOCK)?;
        let total = self.sink.finish()?;
        self.state = SessionState::Finished;
        debug!("finished archive {:?} after {total} bytes", self.name);
        Ok(total)
    }

    /// Finish the archive and return the output sink.
    ///
    /// # Errors
    ///
    /// As for [`TarStream::finish`].
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        self.sink.into_inner()
    }
}
