//! Snapshots of watched filesystem state.
//!
//! A [`Snapshot`] maps every tracked path to the [`FileMeta`] captured when
//! it was listed. Tracked paths are the registered targets plus the direct
//! children of directory targets; nothing deeper is ever listed.
//!
//! An entry whose metadata could not be read is kept with `None` rather than
//! dropped, so a transient `stat` failure on one child does not look like a
//! removal.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use pw_core::{PathMap, path_map_with_capacity};
use tracing::{trace, warn};

use crate::error::WatchError;
use crate::events::{FileEvent, Op};
use crate::metadata::FileMeta;

/// A mapping from tracked path to its metadata at one point in time.
///
/// # Examples
///
/// ```
/// use pw_watcher::{FileId, FileMeta, Snapshot};
/// use camino::{Utf8Path, Utf8PathBuf};
///
/// let mut snapshot = Snapshot::new();
/// snapshot.insert(Utf8PathBuf::from("/watch"), Some(FileMeta::dir(FileId::new(1, 1))));
/// snapshot.insert(Utf8PathBuf::from("/watch/a"), None);
///
/// assert_eq!(snapshot.len(), 2);
/// assert!(snapshot.contains(Utf8Path::new("/watch/a")));
/// assert!(snapshot.meta(Utf8Path::new("/watch/a")).is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: PathMap<Option<FileMeta>>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `path` is tracked, with or without metadata.
    #[inline]
    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Returns the metadata of `path`, if it is tracked and was statted.
    #[inline]
    #[must_use]
    pub fn meta(&self, path: &Utf8Path) -> Option<&FileMeta> {
        self.entries.get(path).and_then(Option::as_ref)
    }

    /// Looks up a tracked entry. The outer `Option` is membership, the inner
    /// one is whether metadata was available.
    #[inline]
    #[must_use]
    pub fn entry(&self, path: &Utf8Path) -> Option<Option<&FileMeta>> {
        self.entries.get(path).map(Option::as_ref)
    }

    /// Records `path`, returning the entry it replaced.
    pub fn insert(&mut self, path: Utf8PathBuf, meta: Option<FileMeta>) -> Option<Option<FileMeta>> {
        self.entries.insert(path, meta)
    }

    /// Iterates over all entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Utf8Path, Option<&FileMeta>)> {
        self.entries
            .iter()
            .map(|(path, meta)| (path.as_path(), meta.as_ref()))
    }

    /// Returns every tracked path in sorted order.
    #[must_use]
    pub fn sorted_paths(&self) -> Vec<&Utf8Path> {
        let mut paths: Vec<&Utf8Path> = self.entries.keys().map(Utf8PathBuf::as_path).collect();
        paths.sort_unstable();
        paths
    }

    /// Adds every entry of `other`, overwriting entries for the same path.
    pub fn merge(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Drops `target` and, if it was recorded as a directory, its direct
    /// children.
    ///
    /// Paths for which `still_tracked` returns `true` are kept; the registry
    /// uses this for entries that another target still covers.
    pub fn drop_target(&mut self, target: &Utf8Path, still_tracked: impl Fn(&Utf8Path) -> bool) {
        let Some(entry) = self.entries.get(target).copied() else {
            return;
        };
        if !still_tracked(target) {
            self.entries.remove(target);
        }
        if !entry.is_some_and(|meta| meta.is_dir) {
            return;
        }
        self.entries
            .retain(|path, _| path.parent() != Some(target) || still_tracked(path.as_path()));
    }

    /// Copies `target` and its direct children from `source`.
    pub fn copy_target_from(&mut self, source: &Self, target: &Utf8Path) {
        for (path, meta) in &source.entries {
            if path == target || path.parent() == Some(target) {
                self.entries.insert(path.clone(), *meta);
            }
        }
    }

    /// Replays one event onto this snapshot.
    ///
    /// Create inserts, Remove deletes, Modify and Chmod update the metadata,
    /// and Rename or Move relocate the entry to the event destination.
    /// Applying the events of `diff(a, b)` to `a` yields `b`.
    pub fn apply(&mut self, event: &FileEvent) {
        if event.op.intersects(Op::RENAME | Op::MOVE) {
            self.entries.remove(&event.path);
            if let Some(destination) = &event.destination {
                self.entries.insert(destination.clone(), event.meta);
            }
        } else if event.op.contains(Op::REMOVE) {
            self.entries.remove(&event.path);
        } else if event.op.intersects(Op::CREATE | Op::MODIFY | Op::CHMOD) {
            self.entries.insert(event.path.clone(), event.meta);
        }
    }
}

impl FromIterator<(Utf8PathBuf, Option<FileMeta>)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (Utf8PathBuf, Option<FileMeta>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Lists one target from the filesystem.
///
/// A file lists as itself. A directory lists as itself plus one entry per
/// direct child; children that cannot be statted are kept with `None`, and
/// children whose names are not UTF-8 are skipped.
///
/// # Errors
///
/// Returns [`WatchError::PathNotFound`] if `target` does not exist (or
/// vanishes before its entries are read), [`WatchError::Stat`] or
/// [`WatchError::ReadDir`] for any other I/O failure.
pub fn list_target(target: &Utf8Path) -> Result<Snapshot, WatchError> {
    let metadata = fs::metadata(target).map_err(|e| WatchError::from_stat(target, e))?;
    let meta = FileMeta::from_metadata(target, &metadata);

    if !metadata.is_dir() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(target.to_owned(), Some(meta));
        return Ok(snapshot);
    }

    let entries = fs::read_dir(target).map_err(|e| WatchError::from_read_dir(target, e))?;
    let mut listed = path_map_with_capacity(16);
    listed.insert(target.to_owned(), Some(meta));

    for entry in entries {
        let entry = entry.map_err(|e| WatchError::from_read_dir(target, e))?;
        let child = match Utf8PathBuf::try_from(entry.path()) {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    root = %target,
                    path = %e.as_path().display(),
                    "Skipping non-UTF-8 directory entry"
                );
                continue;
            }
        };
        let child_meta = entry
            .metadata()
            .ok()
            .map(|m| FileMeta::from_metadata(&child, &m));
        listed.insert(child, child_meta);
    }

    trace!(root = %target, entries = listed.len(), "Target listed");
    Ok(Snapshot { entries: listed })
}
