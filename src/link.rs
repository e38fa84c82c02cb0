//! Symlink and hard link detection.
//!
//! Files that share a (device, inode) pair are stored once; every later
//! occurrence becomes a hard link entry pointing at the archive path of the
//! first one. Resolution is split from recording so that an entry whose
//! header fails validation never ends up as a link target.

use std::collections::{hash_map::Entry, HashMap};

use log::trace;

use crate::{options::ArchiveOptions, source::Metadata};

/// Filesystem identity of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub dev: u64,
    pub ino: u64,
}

impl From<&Metadata> for IdentityKey {
    fn from(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev,
            ino: meta.ino,
        }
    }
}

/// What a path-sourced entry turns into once links are taken into account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedEntry {
    /// Content follows the header.
    Regular { size: u64 },
    /// First occurrence of a multiply-linked file. Content follows the
    /// header, and the path must be [recorded] once the header is accepted.
    ///
    /// [recorded]: LinkResolver::record
    FirstLink { size: u64, key: IdentityKey },
    /// Symbolic link with the given target text.
    Symlink { target: String },
    /// Hard link to an entry already in the archive.
    HardLink { target: String },
}

impl ResolvedEntry {
    /// Number of content bytes the entry carries.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            ResolvedEntry::Regular { size } | ResolvedEntry::FirstLink { size, .. } => *size,
            ResolvedEntry::Symlink { .. } | ResolvedEntry::HardLink { .. } => 0,
        }
    }

    /// Returns true if no content follows the header.
    #[must_use]
    pub fn is_link(&self) -> bool {
        matches!(
            self,
            ResolvedEntry::Symlink { .. } | ResolvedEntry::HardLink { .. }
        )
    }
}

/// Cache of identities already written to the archive.
///
/// Entries are only ever added, never replaced or removed.
#[derive(Debug, Default)]
pub struct LinkResolver {
    seen: HashMap<IdentityKey, String>,
}

impl LinkResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how a path with metadata `meta` is stored.
    ///
    /// Symlinks take precedence over hard links. Directories are never
    /// treated as hard links.
    #[must_use]
    pub fn resolve(&self, meta: &Metadata, options: &ArchiveOptions) -> ResolvedEntry {
        if options.preserve_symlinks && meta.is_symlink() {
            return ResolvedEntry::Symlink {
                target: meta.link_target.clone().unwrap_or_default(),
            };
        }

        if options.preserve_hardlinks && !meta.is_dir() && meta.nlink > 1 {
            let key = IdentityKey::from(meta);
            return match self.seen.get(&key) {
                Some(first) => ResolvedEntry::HardLink {
                    target: first.clone(),
                },
                None => ResolvedEntry::FirstLink {
                    size: meta.size,
                    key,
                },
            };
        }

        ResolvedEntry::Regular { size: meta.size }
    }

    /// Remember `archive_path` as the stored copy of `key`. An identity that
    /// is already known keeps its first path.
    pub fn record(&mut self, key: IdentityKey, archive_path: &str) {
        if let Entry::Vacant(slot) = self.seen.entry(key) {
            trace!("{archive_path} is the first link to {key:?}");
            slot.insert(archive_path.to_string());
        }
    }

    /// The archive path recorded for an identity, if any.
    #[must_use]
    pub fn lookup(&self, key: &IdentityKey) -> Option<&str> {
        self.seen.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::source::FileKind;

    fn meta(kind: FileKind, ino: u64, nlink: u64) -> Metadata {
        Metadata {
            kind,
            dev: 7,
            ino,
            nlink,
            size: 42,
            mode: 0o644,
            uid: 0,
            gid: 0,
            mtime: 0,
            ctime: 0,
            link_target: (kind == FileKind::Symlink).then(|| "target".to_string()),
        }
    }

    /// Resolve and record in one go, the way the archive does once the
    /// header has been accepted.
    fn add(
        resolver: &mut LinkResolver,
        path: &str,
        m: &Metadata,
        options: &ArchiveOptions,
    ) -> ResolvedEntry {
        let resolved = resolver.resolve(m, options);
        if let ResolvedEntry::FirstLink { key, .. } = resolved {
            resolver.record(key, path);
        }
        resolved
    }

    #[test]
    fn test_single_link_is_regular() {
        let mut resolver = LinkResolver::new();
        let options = ArchiveOptions::default();
        let m = meta(FileKind::Regular, 1, 1);

        assert_eq!(
            add(&mut resolver, "a", &m, &options),
            ResolvedEntry::Regular { size: 42 }
        );
        assert_eq!(
            add(&mut resolver, "b", &m, &options),
            ResolvedEntry::Regular { size: 42 }
        );
        assert!(resolver.is_empty());
    }

    #[test]
    fn test_hardlink_dedup() {
        let mut resolver = LinkResolver::new();
        let options = ArchiveOptions::default();
        let m = meta(FileKind::Regular, 1, 2);
        let key = IdentityKey { dev: 7, ino: 1 };

        assert_eq!(
            add(&mut resolver, "first", &m, &options),
            ResolvedEntry::FirstLink { size: 42, key }
        );
        let second = add(&mut resolver, "second", &m, &options);
        assert_eq!(
            second,
            ResolvedEntry::HardLink {
                target: "first".to_string()
            }
        );
        assert_eq!(second.size(), 0);
        assert!(second.is_link());

        // the first path stays canonical
        assert_eq!(
            add(&mut resolver, "third", &m, &options),
            ResolvedEntry::HardLink {
                target: "first".to_string()
            }
        );
        resolver.record(key, "other");
        assert_eq!(resolver.len(), 1);
        assert_eq!(resolver.lookup(&key), Some("first"));
    }

    #[test]
    fn test_unrecorded_first_link_stays_first() {
        let resolver = LinkResolver::new();
        let options = ArchiveOptions::default();
        let m = meta(FileKind::Regular, 1, 2);

        // without a record() call, nothing is cached
        assert!(matches!(
            resolver.resolve(&m, &options),
            ResolvedEntry::FirstLink { .. }
        ));
        assert!(matches!(
            resolver.resolve(&m, &options),
            ResolvedEntry::FirstLink { .. }
        ));
    }

    #[test]
    fn test_hardlinks_disabled() {
        let mut resolver = LinkResolver::new();
        let options = ArchiveOptions {
            preserve_hardlinks: false,
            ..Default::default()
        };
        let m = meta(FileKind::Regular, 1, 2);

        add(&mut resolver, "first", &m, &options);
        assert_eq!(
            add(&mut resolver, "second", &m, &options),
            ResolvedEntry::Regular { size: 42 }
        );
        assert!(resolver.is_empty());
    }

    #[test]
    fn test_directories_never_linked() {
        let mut resolver = LinkResolver::new();
        let options = ArchiveOptions::default();
        let m = meta(FileKind::Directory, 1, 5);

        add(&mut resolver, "d1", &m, &options);
        assert_eq!(
            add(&mut resolver, "d2", &m, &options),
            ResolvedEntry::Regular { size: 42 }
        );
    }

    #[test]
    fn test_symlink_precedence() {
        let mut resolver = LinkResolver::new();
        let options = ArchiveOptions::default();
        let m = meta(FileKind::Symlink, 1, 2);

        for path in ["l1", "l2"] {
            assert_eq!(
                add(&mut resolver, path, &m, &options),
                ResolvedEntry::Symlink {
                    target: "target".to_string()
                }
            );
        }
        assert!(resolver.is_empty());
    }

    #[test]
    fn test_symlinks_disabled() {
        let mut resolver = LinkResolver::new();
        let options = ArchiveOptions {
            preserve_symlinks: false,
            ..Default::default()
        };
        let m = meta(FileKind::Symlink, 1, 1);

        assert_eq!(
            add(&mut resolver, "l", &m, &options),
            ResolvedEntry::Regular { size: 42 }
        );
    }
}
