//! Access to the files being archived.
//!
//! The archive core never touches the filesystem directly: metadata, content
//! and directory listings come from a [`FileSource`]. [`LocalFs`] is the
//! implementation backed by the local filesystem.

use std::{
    fs::File,
    io::{self, Read},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use rustix::fs::{openat, readlinkat, statat, AtFlags, FileType, Mode, OFlags, CWD};

use crate::error::{Error, Result};

/// The kind of filesystem object a path refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// Metadata of a source path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub kind: FileKind,
    pub dev: u64,
    pub ino: u64,
    pub nlink: u64,
    pub size: u64,
    /// Permission bits only, without the file type.
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub mtime: i64,
    pub ctime: i64,
    /// Target text, for symlinks.
    pub link_target: Option<String>,
}

impl Metadata {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// Provider of metadata, content and directory listings.
pub trait FileSource {
    /// Sequential reader over a file's content.
    type Reader: Read;

    /// Retrieve metadata for `path`. A final symlink is only followed when
    /// `follow_symlinks` is set.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Stat`] if the path is inaccessible.
    fn metadata(&self, path: &Path, follow_symlinks: bool) -> Result<Metadata>;

    /// Open `path` for reading.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Read`] if the path cannot be opened.
    fn open(&self, path: &Path) -> Result<Self::Reader>;

    /// List the entries of the directory at `path`, sorted by name.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Read`] if the directory cannot be listed.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// [`FileSource`] backed by the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFs;

impl FileSource for LocalFs {
    type Reader = File;

    fn metadata(&self, path: &Path, follow_symlinks: bool) -> Result<Metadata> {
        let stat_error = |e: rustix::io::Errno| Error::Stat {
            path: path.to_path_buf(),
            source: e.into(),
        };

        let flags = if follow_symlinks {
            AtFlags::empty()
        } else {
            AtFlags::SYMLINK_NOFOLLOW
        };
        let buf = statat(CWD, path, flags).map_err(stat_error)?;

        let kind = match FileType::from_raw_mode(buf.st_mode) {
            FileType::RegularFile => FileKind::Regular,
            FileType::Directory => FileKind::Directory,
            FileType::Symlink => FileKind::Symlink,
            _ => FileKind::Other,
        };

        let link_target = match kind {
            FileKind::Symlink => {
                let target = readlinkat(CWD, path, Vec::new()).map_err(stat_error)?;
                let target = target.into_string().map_err(|_| Error::Stat {
                    path: path.to_path_buf(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        "symlink target is not valid UTF-8",
                    ),
                })?;
                Some(target)
            }
            _ => None,
        };

        Ok(Metadata {
            kind,
            dev: buf.st_dev as u64,
            ino: buf.st_ino as u64,
            nlink: buf.st_nlink as u64,
            size: buf.st_size as u64,
            mode: buf.st_mode & 0o7777,
            uid: u64::from(buf.st_uid),
            gid: u64::from(buf.st_gid),
            mtime: buf.st_mtime as i64,
            ctime: buf.st_ctime as i64,
            link_target,
        })
    }

    fn open(&self, path: &Path) -> Result<File> {
        let fd = openat(CWD, path, OFlags::RDONLY | OFlags::CLOEXEC, Mode::empty()).map_err(
            |e| Error::Read {
                path: path.to_path_buf(),
                source: e.into(),
            },
        )?;
        Ok(File::from(fd))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let read_error = |source: io::Error| Error::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut entries = std::fs::read_dir(path)
            .map_err(read_error)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()
            .map_err(read_error)?;
        entries.sort_by(|a, b| a.as_os_str().as_bytes().cmp(b.as_os_str().as_bytes()));
        Ok(entries)
    }
}
