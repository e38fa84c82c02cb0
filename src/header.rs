//! USTAR header encoding.
//!
//! Every archive entry starts with a single 512-byte header block. The
//! layout is fixed:
//!
//! | Offset | Size | Field     | Encoding                                |
//! |--------|------|-----------|-----------------------------------------|
//! | 0      | 100  | name      | last 100 bytes of the path              |
//! | 100    | 8    | mode      | 7 octal digits + NUL                    |
//! | 108    | 8    | uid       | 7 octal digits + NUL                    |
//! | 116    | 8    | gid       | 7 octal digits + NUL                    |
//! | 124    | 12   | size      | 11 octal digits + NUL                   |
//! | 136    | 12   | mtime     | 11 octal digits + NUL                   |
//! | 148    | 8    | checksum  | 6 octal digits + NUL + space            |
//! | 156    | 1    | typeflag  | `'0'` to `'6'`                          |
//! | 157    | 100  | linkname  | link target, at most 99 bytes           |
//! | 257    | 6    | magic     | `"ustar\0"`                             |
//! | 263    | 2    | version   | two spaces                              |
//! | 265    | 32   | uname     | owner user name                         |
//! | 297    | 32   | gname     | owner group name                        |
//! | 329    | 8    | devmajor  | 7 octal digits + NUL                    |
//! | 337    | 8    | devminor  | 7 octal digits + NUL                    |
//! | 345    | 155  | prefix    | leading part of a path over 99 bytes    |
//! | 500    | 12   | pad       | zero                                    |
//!
//! Since the archive is written forward-only, the header (and therefore the
//! checksum) is complete before any byte of the entry leaves the process.
//!
//! # Example
//!
//! ```
//! use tarstream::header::{encode_header, EntryFields};
//!
//! let header = encode_header("foo/simple.txt", 22, &EntryFields::new().mtime(0), false).unwrap();
//! assert_eq!(header.name(), b"foo/simple.txt");
//! assert!(header.verify_checksum());
//! ```

use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Size of a tar header block in bytes.
pub const HEADER_SIZE: usize = 512;

/// Magic string for UStar headers.
pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// Version field written after the magic.
pub const USTAR_VERSION: &[u8; 2] = b"  ";

/// Longest path accepted by [`encode_header`].
pub const MAX_PATH_LEN: usize = 253;

/// Longest path stored in the name field without a prefix split.
pub const MAX_UNSPLIT_LEN: usize = 99;

/// Longest link target accepted by [`encode_header`].
pub const MAX_LINK_LEN: usize = 99;

/// Permission bits used when an entry does not specify any.
pub const DEFAULT_MODE: u32 = 0o644;

const NAME_FIELD_LEN: usize = 100;
const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

// ============================================================================
// Entry Type
// ============================================================================

/// Tar entry type, stored as a single ASCII digit in the typeflag field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file (`'0'`).
    #[default]
    Regular,
    /// Hard link to an entry earlier in the archive (`'1'`).
    Link,
    /// Symbolic link (`'2'`).
    Symlink,
    /// Character device (`'3'`).
    Char,
    /// Block device (`'4'`).
    Block,
    /// Directory (`'5'`).
    Directory,
    /// FIFO (`'6'`).
    Fifo,
}

impl EntryType {
    /// Parse an entry type from its typeflag byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] for anything other than `'0'` to `'6'`.
    pub fn from_byte(byte: u8) -> Result<Self> {
        Ok(match byte {
            b'0' => EntryType::Regular,
            b'1' => EntryType::Link,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::Char,
            b'4' => EntryType::Block,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            other => return Err(Error::InvalidType(char::from(other).to_string())),
        })
    }

    /// The typeflag byte for this entry type.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            EntryType::Regular => b'0',
            EntryType::Link => b'1',
            EntryType::Symlink => b'2',
            EntryType::Char => b'3',
            EntryType::Block => b'4',
            EntryType::Directory => b'5',
            EntryType::Fifo => b'6',
        }
    }
}

impl TryFrom<u8> for EntryType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        Self::from_byte(byte)
    }
}

impl TryFrom<char> for EntryType {
    type Error = Error;

    fn try_from(c: char) -> Result<Self> {
        u8::try_from(c)
            .map_err(|_| Error::InvalidType(c.to_string()))
            .and_then(Self::from_byte)
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.as_bytes() {
            [byte] => Self::from_byte(*byte),
            _ => Err(Error::InvalidType(s.to_string())),
        }
    }
}

impl From<EntryType> for u8 {
    fn from(entry_type: EntryType) -> Self {
        entry_type.to_byte()
    }
}

// ============================================================================
// Entry Fields
// ============================================================================

/// Per-entry header fields. Anything left as `None` gets a default when the
/// header is encoded: type regular, mode `0o644`, mtime now, zero ids and
/// device numbers, empty owner names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryFields {
    /// Permission bits.
    pub mode: Option<u32>,
    /// Owner user id.
    pub uid: Option<u64>,
    /// Owner group id.
    pub gid: Option<u64>,
    /// Modification time as a Unix timestamp.
    pub mtime: Option<i64>,
    /// Entry type.
    pub entry_type: Option<EntryType>,
    /// Link target for hard and symbolic links.
    pub link: Option<String>,
    /// Owner user name.
    pub user: Option<String>,
    /// Owner group name.
    pub group: Option<String>,
    /// Device major number.
    pub major: Option<u32>,
    /// Device minor number.
    pub minor: Option<u32>,
}

impl EntryFields {
    /// Fields with every value left to its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn uid(mut self, uid: u64) -> Self {
        self.uid = Some(uid);
        self
    }

    #[must_use]
    pub fn gid(mut self, gid: u64) -> Self {
        self.gid = Some(gid);
        self
    }

    #[must_use]
    pub fn mtime(mut self, mtime: i64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    #[must_use]
    pub fn entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    #[must_use]
    pub fn link(mut self, target: impl Into<String>) -> Self {
        self.link = Some(target.into());
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Device numbers, meaningful for character and block devices only.
    #[must_use]
    pub fn device(mut self, major: u32, minor: u32) -> Self {
        self.major = Some(major);
        self.minor = Some(minor);
        self
    }
}

// ============================================================================
// Header Block
// ============================================================================

/// A 512-byte UStar header block with named fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct UstarHeader {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub checksum: [u8; 8],
    pub typeflag: u8,
    pub linkname: [u8; 100],
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub devmajor: [u8; 8],
    pub devminor: [u8; 8],
    pub prefix: [u8; 155],
    pub pad: [u8; 12],
}

impl Default for UstarHeader {
    fn default() -> Self {
        let mut header = Self::new_zeroed();
        header.magic = *USTAR_MAGIC;
        header.version = *USTAR_VERSION;
        header
    }
}

impl UstarHeader {
    /// View the header as its raw block.
    #[must_use]
    pub fn as_block(&self) -> &[u8; HEADER_SIZE] {
        zerocopy::transmute_ref!(self)
    }

    /// View a raw block as a header.
    #[must_use]
    pub fn from_block(block: &[u8; HEADER_SIZE]) -> &UstarHeader {
        zerocopy::transmute_ref!(block)
    }

    /// The name field, up to the first NUL.
    #[must_use]
    pub fn name(&self) -> &[u8] {
        truncate_null(&self.name)
    }

    /// The prefix field, up to the first NUL.
    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        truncate_null(&self.prefix)
    }

    /// The linkname field, up to the first NUL.
    #[must_use]
    pub fn link_name(&self) -> &[u8] {
        truncate_null(&self.linkname)
    }

    /// The entry type, if the typeflag holds a supported value.
    #[must_use]
    pub fn entry_type(&self) -> Option<EntryType> {
        EntryType::from_byte(self.typeflag).ok()
    }

    /// The content size recorded in the header.
    #[must_use]
    pub fn entry_size(&self) -> Option<u64> {
        parse_octal(&self.size)
    }

    /// Compute the header checksum.
    ///
    /// This is the unsigned sum of all header bytes with the checksum field
    /// (bytes 148..156) counted as spaces.
    #[must_use]
    pub fn compute_checksum(&self) -> u64 {
        self.as_block()
            .iter()
            .enumerate()
            .map(|(i, &byte)| {
                if CHECKSUM_RANGE.contains(&i) {
                    u64::from(b' ')
                } else {
                    u64::from(byte)
                }
            })
            .sum()
    }

    /// Returns true if the stored checksum matches the header contents.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        parse_octal(&self.checksum) == Some(self.compute_checksum())
    }

    fn set_checksum(&mut self) {
        self.checksum = [b' '; 8];
        let digits = format!("{:06o}", self.compute_checksum());
        self.checksum[..6].copy_from_slice(digits.as_bytes());
        self.checksum[6] = 0;
        self.checksum[7] = b' ';
    }
}

impl fmt::Debug for UstarHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UstarHeader")
            .field("prefix", &String::from_utf8_lossy(self.prefix()))
            .field("name", &String::from_utf8_lossy(self.name()))
            .field("typeflag", &char::from(self.typeflag))
            .field("size", &self.entry_size())
            .field("linkname", &String::from_utf8_lossy(self.link_name()))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Strip leading slashes (unless absolute paths are allowed) and reject
/// paths that are empty or contain a `..` component.
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] for rejected paths.
pub fn normalize_path(path: &str, allow_absolute: bool) -> Result<&str> {
    let path = if allow_absolute {
        path
    } else {
        path.trim_start_matches('/')
    };

    if path.is_empty() || path.split('/').any(|component| component == "..") {
        return Err(Error::InvalidPath(path.to_string()));
    }

    Ok(path)
}

/// Render `value` into `field` as zero-padded octal digits followed by a NUL.
///
/// The field holds `field.len() - 1` digits, so the representable range is
/// `[0, 8^(len - 1))`.
///
/// # Errors
///
/// Returns [`Error::FieldOverflow`] if the value is out of range.
pub fn format_octal(name: &'static str, value: i128, field: &mut [u8]) -> Result<()> {
    let digits = field.len() - 1;
    if value < 0 || value >= 1i128 << (3 * digits) {
        return Err(Error::FieldOverflow { field: name, value });
    }

    let text = format!("{value:0digits$o}");
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits] = 0;
    Ok(())
}

/// Parse a NUL or space terminated octal field.
///
/// Returns `None` if the field contains anything other than octal digits
/// before the terminator.
#[must_use]
pub fn parse_octal(field: &[u8]) -> Option<u64> {
    let start = field.iter().position(|&b| b != b' ').unwrap_or(field.len());
    let digits = &field[start..];
    let end = digits
        .iter()
        .position(|&b| b == b' ' || b == 0)
        .unwrap_or(digits.len());

    digits[..end].iter().try_fold(0u64, |acc, &b| match b {
        b'0'..=b'7' => acc.checked_mul(8)?.checked_add(u64::from(b - b'0')),
        _ => None,
    })
}

/// Truncate a fixed-size field at its first NUL byte.
#[must_use]
pub fn truncate_null(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(pos) => &bytes[..pos],
        None => bytes,
    }
}

fn copy_name(name: &'static str, value: &str, field: &mut [u8]) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > field.len() {
        return Err(Error::NameTooLong {
            field: name,
            len: bytes.len(),
        });
    }
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Build the header block for one entry.
///
/// `size` is the number of content bytes that will follow the header. The
/// returned header is fully validated and checksummed.
///
/// # Errors
///
/// Fails with [`Error::InvalidPath`], [`Error::PathTooLong`],
/// [`Error::LinkTooLong`], [`Error::FieldOverflow`] or
/// [`Error::NameTooLong`] when an input does not fit the format.
pub fn encode_header(
    path: &str,
    size: u64,
    fields: &EntryFields,
    allow_absolute: bool,
) -> Result<UstarHeader> {
    let path = normalize_path(path, allow_absolute)?;
    let path_bytes = path.as_bytes();
    if path_bytes.len() > MAX_PATH_LEN {
        return Err(Error::PathTooLong {
            path: path.to_string(),
            len: path_bytes.len(),
            limit: MAX_PATH_LEN,
        });
    }

    let mut header = UstarHeader::default();

    // Not separator-aware: the name field always takes the last 100 bytes.
    let (prefix, name) = if path_bytes.len() > MAX_UNSPLIT_LEN {
        path_bytes.split_at(path_bytes.len() - NAME_FIELD_LEN)
    } else {
        (&[][..], path_bytes)
    };
    header.name[..name.len()].copy_from_slice(name);
    header.prefix[..prefix.len()].copy_from_slice(prefix);

    format_octal(
        "mode",
        i128::from(fields.mode.unwrap_or(DEFAULT_MODE)),
        &mut header.mode,
    )?;
    format_octal("uid", i128::from(fields.uid.unwrap_or(0)), &mut header.uid)?;
    format_octal("gid", i128::from(fields.gid.unwrap_or(0)), &mut header.gid)?;
    format_octal("size", i128::from(size), &mut header.size)?;
    format_octal(
        "mtime",
        i128::from(fields.mtime.unwrap_or_else(now)),
        &mut header.mtime,
    )?;
    format_octal(
        "devmajor",
        i128::from(fields.major.unwrap_or(0)),
        &mut header.devmajor,
    )?;
    format_octal(
        "devminor",
        i128::from(fields.minor.unwrap_or(0)),
        &mut header.devminor,
    )?;

    header.typeflag = fields.entry_type.unwrap_or_default().to_byte();

    if let Some(link) = &fields.link {
        if link.len() > MAX_LINK_LEN {
            return Err(Error::LinkTooLong {
                link: link.clone(),
                len: link.len(),
                limit: MAX_LINK_LEN,
            });
        }
        header.linkname[..link.len()].copy_from_slice(link.as_bytes());
    }

    if let Some(user) = &fields.user {
        copy_name("user", user, &mut header.uname)?;
    }
    if let Some(group) = &fields.group {
        copy_name("group", group, &mut header.gname)?;
    }

    header.set_checksum();
    Ok(header)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn fixed() -> EntryFields {
        EntryFields::new().mtime(1234567890)
    }

    #[test]
    fn test_header_size() {
        assert_eq!(size_of::<UstarHeader>(), HEADER_SIZE);
    }

    #[test]
    fn test_simple_header_layout() {
        let header = encode_header("foo/simple.txt", 22, &fixed(), false).unwrap();
        let block = header.as_block();

        assert_eq!(&block[0..14], b"foo/simple.txt");
        assert_eq!(block[14], 0);
        assert_eq!(&block[100..108], b"0000644\0");
        assert_eq!(&block[108..116], b"0000000\0");
        assert_eq!(&block[124..136], b"00000000026\0");
        assert_eq!(&block[136..148], b"11145401322\0");
        assert_eq!(block[156], b'0');
        assert_eq!(&block[257..263], b"ustar\0");
        assert_eq!(&block[263..265], b"  ");
        assert_eq!(&block[329..337], b"0000000\0");
        assert!(block[500..512].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_checksum_format() {
        let header = encode_header("foo/simple.txt", 22, &fixed(), false).unwrap();
        let field = &header.as_block()[148..156];

        assert!(field[..6].iter().all(|b| (b'0'..=b'7').contains(b)));
        assert_eq!(field[6], 0);
        assert_eq!(field[7], b' ');
        assert_eq!(parse_octal(&field[..6]), Some(header.compute_checksum()));
        assert!(header.verify_checksum());
    }

    #[test]
    fn test_checksum_counts_high_bytes_unsigned() {
        let fields = fixed().user("ünïcødé");
        let header = encode_header("ÿÿÿ", 0, &fields, false).unwrap();
        let manual: u64 = header
            .as_block()
            .iter()
            .enumerate()
            .map(|(i, &b)| if (148..156).contains(&i) { 32 } else { u64::from(b) })
            .sum();
        assert_eq!(header.compute_checksum(), manual);
        assert!(header.verify_checksum());
    }

    #[test]
    fn test_leading_slashes_stripped() {
        let header = encode_header("///etc/passwd", 0, &fixed(), false).unwrap();
        assert_eq!(header.name(), b"etc/passwd");

        let header = encode_header("/etc/passwd", 0, &fixed(), true).unwrap();
        assert_eq!(header.name(), b"/etc/passwd");
    }

    #[test]
    fn test_dotdot_rejected() {
        for path in ["../x", "a/../b", "a/..", ".."] {
            assert!(
                matches!(
                    encode_header(path, 0, &fixed(), false),
                    Err(Error::InvalidPath(_))
                ),
                "{path}"
            );
        }
        // only whole components count
        assert!(encode_header("a/..b/c", 0, &fixed(), false).is_ok());
        assert!(encode_header("a/b../c", 0, &fixed(), false).is_ok());
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(matches!(
            encode_header("///", 0, &fixed(), false),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_path_exactly_99_and_100_bytes() {
        let path = "a".repeat(99);
        let header = encode_header(&path, 0, &fixed(), false).unwrap();
        assert_eq!(header.name(), path.as_bytes());
        assert_eq!(header.prefix(), b"");

        let path = "b".repeat(100);
        let header = encode_header(&path, 0, &fixed(), false).unwrap();
        assert_eq!(header.name(), path.as_bytes());
        assert_eq!(header.prefix(), b"");
    }

    #[test]
    fn test_long_path_split_is_not_separator_aware() {
        let path = format!("{}/{}", "d".repeat(60), "f".repeat(60));
        let header = encode_header(&path, 0, &fixed(), false).unwrap();
        assert_eq!(header.prefix(), &path.as_bytes()[..21]);
        assert_eq!(header.name(), &path.as_bytes()[21..]);
        assert_eq!(header.name().len(), 100);
    }

    #[test]
    fn test_path_length_limit() {
        let ok = "p".repeat(MAX_PATH_LEN);
        let header = encode_header(&ok, 0, &fixed(), false).unwrap();
        assert_eq!(header.prefix().len(), MAX_PATH_LEN - 100);

        let too_long = "p".repeat(MAX_PATH_LEN + 1);
        assert!(matches!(
            encode_header(&too_long, 0, &fixed(), false),
            Err(Error::PathTooLong { len: 254, .. })
        ));
    }

    #[test]
    fn test_field_overflow() {
        assert!(matches!(
            encode_header("x", 0, &fixed().mode(0o10000000), false),
            Err(Error::FieldOverflow { field: "mode", .. })
        ));
        assert!(encode_header("x", 0, &fixed().mode(0o7777777), false).is_ok());
        assert!(matches!(
            encode_header("x", 0, &fixed().uid(1 << 21), false),
            Err(Error::FieldOverflow { field: "uid", .. })
        ));
        assert!(matches!(
            encode_header("x", 0, &fixed().gid(u64::MAX), false),
            Err(Error::FieldOverflow { field: "gid", .. })
        ));
        assert!(matches!(
            encode_header("x", 0, &EntryFields::new().mtime(-1), false),
            Err(Error::FieldOverflow { field: "mtime", value: -1 })
        ));
        assert!(matches!(
            encode_header("x", 1 << 33, &fixed(), false),
            Err(Error::FieldOverflow { field: "size", .. })
        ));
        assert!(encode_header("x", (1 << 33) - 1, &fixed(), false).is_ok());
    }

    #[test]
    fn test_link_target() {
        let fields = fixed().entry_type(EntryType::Symlink).link("../target");
        let header = encode_header("link", 0, &fields, false).unwrap();
        assert_eq!(header.typeflag, b'2');
        assert_eq!(header.link_name(), b"../target");

        let fields = fixed().link("t".repeat(100));
        assert!(matches!(
            encode_header("link", 0, &fields, false),
            Err(Error::LinkTooLong { len: 100, .. })
        ));
    }

    #[test]
    fn test_owner_names() {
        let header = encode_header("x", 0, &fixed().user("root").group("wheel"), false).unwrap();
        assert_eq!(truncate_null(&header.uname), b"root");
        assert_eq!(truncate_null(&header.gname), b"wheel");

        assert!(matches!(
            encode_header("x", 0, &fixed().user("u".repeat(33)), false),
            Err(Error::NameTooLong { field: "user", len: 33 })
        ));
    }

    #[test]
    fn test_default_mtime_is_now() {
        let before = now();
        let header = encode_header("x", 0, &EntryFields::new(), false).unwrap();
        let mtime = parse_octal(&header.mtime).unwrap() as i64;
        assert!(mtime >= before && mtime <= now());
    }

    #[test]
    fn test_entry_type_conversions() {
        for (byte, ty) in [
            (b'0', EntryType::Regular),
            (b'1', EntryType::Link),
            (b'2', EntryType::Symlink),
            (b'3', EntryType::Char),
            (b'4', EntryType::Block),
            (b'5', EntryType::Directory),
            (b'6', EntryType::Fifo),
        ] {
            assert_eq!(EntryType::from_byte(byte).unwrap(), ty);
            assert_eq!(u8::from(ty), byte);
        }
        assert!(matches!(EntryType::from_byte(b'7'), Err(Error::InvalidType(_))));
        assert!(matches!(EntryType::try_from('L'), Err(Error::InvalidType(_))));
        assert!(matches!(EntryType::try_from('é'), Err(Error::InvalidType(_))));
        assert!(matches!("55".parse::<EntryType>(), Err(Error::InvalidType(_))));
        assert_eq!("5".parse::<EntryType>().unwrap(), EntryType::Directory);
    }

    #[test]
    fn test_format_octal() {
        let mut field = [0xffu8; 8];
        format_octal("mode", 0o755, &mut field).unwrap();
        assert_eq!(&field, b"0000755\0");

        let mut field = [0u8; 12];
        format_octal("size", 0, &mut field).unwrap();
        assert_eq!(&field, b"00000000000\0");
    }

    #[test]
    fn test_parse_octal() {
        assert_eq!(parse_octal(b"0000644\0"), Some(0o644));
        assert_eq!(parse_octal(b"  0123 \0"), Some(0o123));
        assert_eq!(parse_octal(b""), Some(0));
        assert_eq!(parse_octal(b"0128"), None);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn no_dotdot(path: &String) -> bool {
            !path.split('/').any(|c| c == "..")
        }

        /// Paths that always fit the header.
        fn path_strategy() -> impl Strategy<Value = String> {
            proptest::string::string_regex("[a-z0-9_.]{1,20}(/[a-z0-9_.]{1,20}){0,15}")
                .expect("valid regex")
                .prop_filter("no dotdot", no_dotdot)
                .prop_filter("fits", |p| p.len() <= MAX_PATH_LEN)
        }

        /// Paths drawn evenly from the unsplit, split and too-long ranges.
        fn any_length_path_strategy() -> impl Strategy<Value = String> {
            prop_oneof![
                "[a-z][a-z/.]{0,98}",
                "[a-z][a-z/.]{99,252}",
                "[a-z][a-z/.]{253,300}",
            ]
            .prop_filter("no dotdot", no_dotdot)
        }

        fn fields_strategy() -> impl Strategy<Value = EntryFields> {
            (
                0u32..0o7777777,
                0u64..0o7777777,
                0u64..0o7777777,
                0i64..0o77777777777,
                "[a-z]{0,32}",
            )
                .prop_map(|(mode, uid, gid, mtime, user)| {
                    EntryFields::new()
                        .mode(mode)
                        .uid(uid)
                        .gid(gid)
                        .mtime(mtime)
                        .user(user)
                })
        }

        proptest! {
            #[test]
            fn test_checksum_always_valid(
                path in path_strategy(),
                size in 0u64..0o77777777777,
                fields in fields_strategy(),
            ) {
                let header = encode_header(&path, size, &fields, false).unwrap();
                prop_assert!(header.verify_checksum());
                prop_assert_eq!(parse_octal(&header.checksum[..6]), Some(header.compute_checksum()));
            }

            #[test]
            fn test_name_prefix_split(path in any_length_path_strategy()) {
                let result = encode_header(&path, 0, &EntryFields::new().mtime(0), false);
                let len = path.len();
                if len > MAX_PATH_LEN {
                    prop_assert!(
                        matches!(result, Err(Error::PathTooLong { .. })),
                        "expected PathTooLong"
                    );
                } else {
                    let header = result.unwrap();
                    if len <= MAX_UNSPLIT_LEN {
                        prop_assert_eq!(header.name(), path.as_bytes());
                        prop_assert_eq!(header.prefix(), b"" as &[u8]);
                    } else {
                        prop_assert_eq!(header.name(), &path.as_bytes()[len - 100..]);
                        prop_assert_eq!(header.prefix(), &path.as_bytes()[..len - 100]);
                    }
                }
            }

            #[test]
            fn test_parse_back_numeric_fields(fields in fields_strategy(), size in 0u64..0o77777777777) {
                let header = encode_header("x", size, &fields, false).unwrap();
                prop_assert_eq!(parse_octal(&header.mode), fields.mode.map(u64::from));
                prop_assert_eq!(parse_octal(&header.uid), fields.uid);
                prop_assert_eq!(parse_octal(&header.gid), fields.gid);
                prop_assert_eq!(header.entry_size(), Some(size));
            }
        }
    }
}
