//! Event types for change notifications.
//!
//! Every poll cycle turns the difference between two snapshots into a list
//! of [`FileEvent`]s, each tagged with one or more [`Op`] flags.
//!
//! # Event Flow
//!
//! ```text
//! tick ──► list targets ──► diff(previous, current) ──► FileEvent
//!                                                          │
//!                                                          ▼
//!                                             mpsc::Sender (races shutdown)
//! ```

use std::fmt;
use std::time::Instant;

use bitflags::bitflags;
use camino::{Utf8Path, Utf8PathBuf};

use crate::metadata::FileMeta;

bitflags! {
    /// The kinds of change carried by a [`FileEvent`].
    ///
    /// Several flags may be set on one event, e.g. `MODIFY | CHMOD` when a
    /// file's content and permissions changed in the same interval.
    ///
    /// # Examples
    ///
    /// ```
    /// use pw_watcher::Op;
    ///
    /// assert_eq!((Op::MOVE | Op::CREATE).label(), "CREATE|MOVE");
    /// assert_eq!(Op::empty().label(), "");
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Op: u32 {
        /// A path appeared.
        const CREATE = 1 << 0;
        /// A path disappeared.
        const REMOVE = 1 << 1;
        /// Modification time or size changed.
        const MODIFY = 1 << 2;
        /// A file object moved to a new name in the same directory.
        const RENAME = 1 << 3;
        /// Permission bits changed.
        const CHMOD = 1 << 4;
        /// A file object moved to a different directory.
        const MOVE = 1 << 5;
    }
}

impl Op {
    /// Iterates over the names of the set flags in declaration order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        self.iter_names().map(|(name, _)| name)
    }

    /// Renders the set flags as a `|`-joined label.
    ///
    /// The order is fixed: CREATE, REMOVE, MODIFY, RENAME, CHMOD, MOVE.
    #[must_use]
    pub fn label(self) -> String {
        self.names().collect::<Vec<_>>().join("|")
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A change detected on one tracked path.
///
/// # Examples
///
/// ```
/// use pw_watcher::{FileEvent, FileId, FileMeta, Op};
/// use camino::Utf8PathBuf;
///
/// let event = FileEvent::new(
///     Utf8PathBuf::from("/watch/a.txt"),
///     Op::RENAME,
///     Some(FileMeta::file(FileId::new(1, 9), 3)),
/// )
/// .with_destination(Utf8PathBuf::from("/watch/b.txt"));
///
/// assert!(event.has_ops(&[Op::RENAME, Op::MOVE]));
/// assert!(!event.is_dir_event());
/// assert_eq!(event.file_name(), Some("a.txt"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// The path the change was detected at.
    ///
    /// For renames and moves this is the old location.
    pub path: Utf8PathBuf,

    /// The kinds of change.
    pub op: Op,

    /// Metadata captured when the change was detected.
    ///
    /// Removals carry the last known metadata; everything else carries the
    /// current one. `None` when the entry could not be statted.
    pub meta: Option<FileMeta>,

    /// The new location of a renamed or moved entry.
    pub destination: Option<Utf8PathBuf>,

    /// When the event was built. Events from one poll cycle carry
    /// slightly different instants.
    pub detected_at: Instant,
}

impl FileEvent {
    /// Creates an event detected now.
    #[must_use]
    pub fn new(path: Utf8PathBuf, op: Op, meta: Option<FileMeta>) -> Self {
        Self {
            path,
            op,
            meta,
            destination: None,
            detected_at: Instant::now(),
        }
    }

    /// Sets the destination of a rename or move.
    #[must_use]
    pub fn with_destination(mut self, destination: Utf8PathBuf) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Returns `true` if the path was a directory when the change was
    /// detected. Events without metadata are never directory events.
    #[inline]
    #[must_use]
    pub fn is_dir_event(&self) -> bool {
        self.meta.is_some_and(|meta| meta.is_dir)
    }

    /// Returns `true` if the event carries any of the given kinds.
    #[must_use]
    pub fn has_ops(&self, ops: &[Op]) -> bool {
        ops.iter().any(|op| self.op.intersects(*op))
    }

    /// Returns the last component of the event path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    /// Returns the destination of a rename or move.
    #[inline]
    #[must_use]
    pub fn destination(&self) -> Option<&Utf8Path> {
        self.destination.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FileId;

    fn event(op: Op, meta: Option<FileMeta>) -> FileEvent {
        FileEvent::new(Utf8PathBuf::from("/watch/file"), op, meta)
    }

    #[test]
    fn test_label_single_flags() {
        insta::assert_snapshot!(Op::CREATE.label(), @"CREATE");
        insta::assert_snapshot!(Op::REMOVE.label(), @"REMOVE");
        insta::assert_snapshot!(Op::MODIFY.label(), @"MODIFY");
        insta::assert_snapshot!(Op::RENAME.label(), @"RENAME");
        insta::assert_snapshot!(Op::CHMOD.label(), @"CHMOD");
        insta::assert_snapshot!(Op::MOVE.label(), @"MOVE");
    }

    #[test]
    fn test_label_order_is_fixed() {
        let all = Op::MOVE | Op::CHMOD | Op::RENAME | Op::MODIFY | Op::REMOVE | Op::CREATE;
        insta::assert_snapshot!(all.label(), @"CREATE|REMOVE|MODIFY|RENAME|CHMOD|MOVE");
        assert_eq!((Op::CHMOD | Op::MODIFY).to_string(), "MODIFY|CHMOD");
    }

    #[test]
    fn test_label_empty() {
        assert_eq!(Op::empty().label(), "");
        assert_eq!(Op::default().to_string(), "");
    }

    #[test]
    fn test_names() {
        let names: Vec<_> = (Op::REMOVE | Op::MOVE).names().collect();
        assert_eq!(names, vec!["REMOVE", "MOVE"]);
    }

    #[test]
    fn test_is_dir_event() {
        assert!(event(Op::CREATE, Some(FileMeta::dir(FileId::new(1, 1)))).is_dir_event());
        assert!(!event(Op::CREATE, Some(FileMeta::file(FileId::new(1, 2), 0))).is_dir_event());
        assert!(!event(Op::CREATE, None).is_dir_event());
    }

    #[test]
    fn test_has_ops() {
        let ev = event(Op::MODIFY | Op::CHMOD, None);
        assert!(ev.has_ops(&[Op::CHMOD]));
        assert!(ev.has_ops(&[Op::CREATE, Op::MODIFY]));
        assert!(ev.has_ops(&[Op::REMOVE | Op::MODIFY]));
        assert!(!ev.has_ops(&[Op::CREATE, Op::REMOVE]));
        assert!(!ev.has_ops(&[]));
    }

    #[test]
    fn test_destination() {
        let ev = event(Op::MOVE, None);
        assert!(ev.destination().is_none());

        let ev = ev.with_destination(Utf8PathBuf::from("/elsewhere/file"));
        assert_eq!(ev.destination(), Some(Utf8Path::new("/elsewhere/file")));
        assert_eq!(ev.file_name(), Some("file"));
    }

    #[test]
    fn test_detected_at_is_construction_time() {
        let before = Instant::now();
        let first = event(Op::CREATE, None);
        let second = event(Op::REMOVE, None);
        assert!(first.detected_at >= before);
        assert!(second.detected_at >= first.detected_at);
        assert!(Instant::now() >= second.detected_at);
    }
}
