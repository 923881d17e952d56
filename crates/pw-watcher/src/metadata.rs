//! Per-path metadata captured in a snapshot.
//!
//! [`FileMeta`] holds exactly what the diff engine compares: modification
//! time, size, directory flag, permission bits, and the [`FileId`] identity
//! token that recognizes a file object across renames.

use std::fs::Metadata;
use std::time::SystemTime;

use camino::Utf8Path;

/// Identity of an underlying file object, independent of its path.
///
/// On Unix this is the device and inode number pair. Elsewhere it is derived
/// from an open handle to the file via `same-file`, so it may be unavailable
/// for entries that cannot be opened.
///
/// # Examples
///
/// ```
/// use pw_watcher::FileId;
///
/// assert_eq!(FileId::new(1, 42), FileId::new(1, 42));
/// assert_ne!(FileId::new(1, 42), FileId::new(2, 42));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId {
    device: u64,
    inode: u64,
}

impl FileId {
    /// Creates an identity from a device and inode pair.
    #[inline]
    #[must_use]
    pub const fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }

    #[cfg(unix)]
    fn of(_path: &Utf8Path, metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self::new(metadata.dev(), metadata.ino()))
    }

    #[cfg(not(unix))]
    fn of(path: &Utf8Path, _metadata: &Metadata) -> Option<Self> {
        use std::hash::{DefaultHasher, Hash, Hasher};

        let handle = same_file::Handle::from_path(path.as_std_path()).ok()?;
        let mut hasher = DefaultHasher::new();
        handle.hash(&mut hasher);
        Some(Self::new(0, hasher.finish()))
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    u32::from(metadata.permissions().readonly())
}

/// Metadata of one tracked path at one point in time.
///
/// # Examples
///
/// ```
/// use pw_watcher::{FileId, FileMeta};
///
/// let before = FileMeta::file(FileId::new(1, 7), 10);
/// let after = FileMeta { len: 20, ..before };
///
/// assert!(before.same_file(&after));
/// assert!(before.content_changed(&after));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// Last modification time, when the platform reports one.
    pub modified: Option<SystemTime>,

    /// Size in bytes.
    pub len: u64,

    /// Whether the path was a directory.
    pub is_dir: bool,

    /// Permission bits: the full mode on Unix, the read-only flag elsewhere.
    pub mode: u32,

    /// Identity of the underlying file object.
    pub id: Option<FileId>,
}

impl FileMeta {
    /// Captures metadata for `path` from a `stat` result.
    pub fn from_metadata(path: &Utf8Path, metadata: &Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            is_dir: metadata.is_dir(),
            mode: permission_bits(metadata),
            id: FileId::of(path, metadata),
        }
    }

    /// Creates metadata for a regular file with no timestamp and mode `0o644`.
    ///
    /// Mostly useful for building snapshots by hand.
    #[must_use]
    pub const fn file(id: FileId, len: u64) -> Self {
        Self {
            modified: None,
            len,
            is_dir: false,
            mode: 0o644,
            id: Some(id),
        }
    }

    /// Creates metadata for a directory with no timestamp and mode `0o755`.
    #[must_use]
    pub const fn dir(id: FileId) -> Self {
        Self {
            modified: None,
            len: 0,
            is_dir: true,
            mode: 0o755,
            id: Some(id),
        }
    }

    /// Returns `true` if both records denote the same file object.
    ///
    /// Records without an identity never match anything.
    #[inline]
    #[must_use]
    pub fn same_file(&self, other: &Self) -> bool {
        matches!((self.id, other.id), (Some(a), Some(b)) if a == b)
    }

    /// Returns `true` if the modification time or the size differs.
    #[inline]
    #[must_use]
    pub fn content_changed(&self, other: &Self) -> bool {
        self.modified != other.modified || self.len != other.len
    }

    /// Returns `true` if the permission bits differ.
    #[inline]
    #[must_use]
    pub const fn mode_changed(&self, other: &Self) -> bool {
        self.mode != other.mode
    }
}
