//! The snapshot diff: turns two snapshots into classified events.
//!
//! # Algorithm
//!
//! ```text
//! previous ─┬─ only in previous ──► removed ─┐
//!           │                                ├─ same FileId? ──► RENAME (same parent)
//! current ──┼─ only in current ───► created ─┘                   MOVE   (other parent)
//!           │                                    unpaired ──► CREATE / REMOVE
//!           └─ in both, mtime/size differ ──► MODIFY (never coalesced)
//! ```
//!
//! Pairing is first-match: removed paths are visited in sorted order and each
//! takes the lowest unpaired created path with the same identity. A paired
//! path takes no further part in the cycle.
//!
//! Events come out grouped and sorted by path within each group: modify,
//! then rename/move, then create, then remove.

use camino::Utf8Path;
use pw_core::FxHashMap;
use smallvec::SmallVec;

use crate::events::{FileEvent, Op};
use crate::metadata::{FileId, FileMeta};
use crate::snapshot::Snapshot;

/// Knobs for [`diff`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Flag permission-bit changes with [`Op::CHMOD`].
    pub detect_chmod: bool,
}

impl From<&pw_core::WatchConfig> for DiffOptions {
    fn from(config: &pw_core::WatchConfig) -> Self {
        Self {
            detect_chmod: config.detect_chmod,
        }
    }
}

type Entry<'a> = (&'a Utf8Path, Option<&'a FileMeta>);

/// Computes the events that turn `previous` into `current`.
///
/// # Examples
///
/// ```
/// use pw_watcher::{diff, DiffOptions, FileId, FileMeta, Op, Snapshot};
/// use camino::Utf8PathBuf;
///
/// let file = FileMeta::file(FileId::new(1, 2), 4);
/// let previous: Snapshot = [(Utf8PathBuf::from("/w/a"), Some(file))].into_iter().collect();
/// let current: Snapshot = [(Utf8PathBuf::from("/w/b"), Some(file))].into_iter().collect();
///
/// let events = diff(&previous, &current, DiffOptions::default());
/// assert_eq!(events.len(), 1);
/// assert_eq!(events[0].op, Op::RENAME);
/// assert_eq!(events[0].path, "/w/a");
/// ```
#[must_use]
pub fn diff(previous: &Snapshot, current: &Snapshot, options: DiffOptions) -> Vec<FileEvent> {
    let mut events = Vec::new();

    let mut removed: Vec<Entry<'_>> = previous
        .iter()
        .filter(|(path, _)| !current.contains(path))
        .collect();
    removed.sort_unstable_by_key(|(path, _)| *path);

    let mut created: Vec<Entry<'_>> = Vec::new();
    let mut common: Vec<(&Utf8Path, Option<&FileMeta>, Option<&FileMeta>)> = Vec::new();
    for (path, meta) in current.iter() {
        match previous.entry(path) {
            Some(old) => common.push((path, old, meta)),
            None => created.push((path, meta)),
        }
    }
    created.sort_unstable_by_key(|(path, _)| *path);
    common.sort_unstable_by_key(|(path, _, _)| *path);

    for (path, old, new) in common {
        let op = change_between(old, new, options);
        if !op.is_empty() {
            events.push(FileEvent::new(path.to_owned(), op, new.copied()));
        }
    }

    let mut by_identity: FxHashMap<FileId, SmallVec<[usize; 2]>> = FxHashMap::default();
    for (index, (_, meta)) in created.iter().enumerate() {
        if let Some(id) = meta.and_then(|m| m.id) {
            by_identity.entry(id).or_default().push(index);
        }
    }

    let mut created_paired = vec![false; created.len()];
    let mut removed_paired = vec![false; removed.len()];
    for (r_index, (old_path, old_meta)) in removed.iter().enumerate() {
        let Some(id) = old_meta.and_then(|m| m.id) else {
            continue;
        };
        let Some(candidates) = by_identity.get(&id) else {
            continue;
        };
        let Some(&c_index) = candidates.iter().find(|&&c| !created_paired[c]) else {
            continue;
        };
        created_paired[c_index] = true;
        removed_paired[r_index] = true;

        let (new_path, new_meta) = created[c_index];
        let op = if old_path.parent() == new_path.parent() {
            Op::RENAME
        } else {
            Op::MOVE
        };
        events.push(
            FileEvent::new((*old_path).to_owned(), op, new_meta.copied())
                .with_destination(new_path.to_owned()),
        );
    }

    for ((path, meta), paired) in created.iter().zip(&created_paired) {
        if !paired {
            events.push(FileEvent::new((*path).to_owned(), Op::CREATE, meta.copied()));
        }
    }
    for ((path, meta), paired) in removed.iter().zip(&removed_paired) {
        if !paired {
            events.push(FileEvent::new((*path).to_owned(), Op::REMOVE, meta.copied()));
        }
    }

    events
}

/// Classifies the change of a path present in both snapshots.
fn change_between(old: Option<&FileMeta>, new: Option<&FileMeta>, options: DiffOptions) -> Op {
    match (old, new) {
        (Some(old), Some(new)) => {
            let mut op = Op::empty();
            if old.content_changed(new) {
                op |= Op::MODIFY;
            }
            if options.detect_chmod && old.mode_changed(new) {
                op |= Op::CHMOD;
            }
            op
        }
        (None, None) => Op::empty(),
        // Metadata appeared or disappeared.
        _ => Op::MODIFY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::time::{Duration, SystemTime};

    fn file(inode: u64, len: u64) -> Option<FileMeta> {
        Some(FileMeta::file(FileId::new(1, inode), len))
    }

    fn snap(entries: &[(&str, Option<FileMeta>)]) -> Snapshot {
        entries
            .iter()
            .map(|(path, meta)| (Utf8PathBuf::from(*path), *meta))
            .collect()
    }

    fn summary(events: &[FileEvent]) -> Vec<(String, String, Option<String>)> {
        events
            .iter()
            .map(|e| {
                (
                    e.op.label(),
                    e.path.to_string(),
                    e.destination.as_ref().map(ToString::to_string),
                )
            })
            .collect()
    }

    fn replay(previous: &Snapshot, events: &[FileEvent]) -> Snapshot {
        let mut snapshot = previous.clone();
        for event in events {
            snapshot.apply(event);
        }
        snapshot
    }

    #[test]
    fn test_identical_snapshots_yield_nothing() {
        let s = snap(&[("/w", file(1, 0)), ("/w/a", file(2, 3)), ("/w/b", None)]);
        assert!(diff(&s, &s, DiffOptions::default()).is_empty());
        assert!(diff(&Snapshot::new(), &Snapshot::new(), DiffOptions::default()).is_empty());
    }

    #[test]
    fn test_create_and_remove() {
        let previous = snap(&[("/w/old", file(2, 1))]);
        let current = snap(&[("/w/new", file(3, 1))]);

        let events = diff(&previous, &current, DiffOptions::default());
        assert_eq!(
            summary(&events),
            vec![
                ("CREATE".to_owned(), "/w/new".to_owned(), None),
                ("REMOVE".to_owned(), "/w/old".to_owned(), None),
            ]
        );
        assert_eq!(events[1].meta, file(2, 1));
    }

    #[test]
    fn test_modify_on_size_or_mtime() {
        let stamped = FileMeta {
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(10)),
            ..FileMeta::file(FileId::new(1, 5), 1)
        };
        let previous = snap(&[("/w/size", file(4, 1)), ("/w/time", Some(stamped))]);
        let touched = FileMeta {
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(11)),
            ..stamped
        };
        let current = snap(&[("/w/size", file(4, 2)), ("/w/time", Some(touched))]);

        let events = diff(&previous, &current, DiffOptions::default());
        assert_eq!(
            summary(&events),
            vec![
                ("MODIFY".to_owned(), "/w/size".to_owned(), None),
                ("MODIFY".to_owned(), "/w/time".to_owned(), None),
            ]
        );
        assert_eq!(events[0].meta, file(4, 2));
    }

    #[test]
    fn test_metadata_appearing_counts_as_modify() {
        let previous = snap(&[("/w/a", None)]);
        let current = snap(&[("/w/a", file(2, 0))]);
        let events = diff(&previous, &current, DiffOptions::default());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].op, Op::MODIFY);
    }

    #[test]
    fn test_rename_in_same_directory() {
        let previous = snap(&[("/d/a", file(7, 1))]);
        let current = snap(&[("/d/b", file(7, 1))]);

        let events = diff(&previous, &current, DiffOptions::default());
        assert_eq!(
            summary(&events),
            vec![("RENAME".to_owned(), "/d/a".to_owned(), Some("/d/b".to_owned()))]
        );
    }

    #[test]
    fn test_move_across_directories() {
        let previous = snap(&[("/d/a", file(7, 1))]);
        let current = snap(&[("/e/a", file(7, 1))]);

        let events = diff(&previous, &current, DiffOptions::default());
        assert_eq!(
            summary(&events),
            vec![("MOVE".to_owned(), "/d/a".to_owned(), Some("/e/a".to_owned()))]
        );
        assert!(!events[0].has_ops(&[Op::RENAME, Op::CREATE, Op::REMOVE]));
    }

    #[test]
    fn test_path_reuse_by_other_file_is_modify_not_rename() {
        let previous = snap(&[("/d/a", file(1, 1))]);
        let current = snap(&[("/d/a", file(2, 5))]);

        let events = diff(&previous, &current, DiffOptions::default());
        assert_eq!(summary(&events), vec![("MODIFY".to_owned(), "/d/a".to_owned(), None)]);
    }

    #[test]
    fn test_pairing_is_first_match() {
        // One removed path, two created paths sharing its identity (hard links).
        let previous = snap(&[("/d/a", file(9, 1))]);
        let current = snap(&[("/d/y", file(9, 1)), ("/d/x", file(9, 1))]);

        let events = diff(&previous, &current, DiffOptions::default());
        assert_eq!(
            summary(&events),
            vec![
                ("RENAME".to_owned(), "/d/a".to_owned(), Some("/d/x".to_owned())),
                ("CREATE".to_owned(), "/d/y".to_owned(), None),
            ]
        );
    }

    #[test]
    fn test_entries_without_identity_are_never_coalesced() {
        let anonymous = Some(FileMeta {
            id: None,
            ..FileMeta::file(FileId::new(0, 0), 1)
        });
        let previous = snap(&[("/d/a", anonymous)]);
        let current = snap(&[("/d/b", anonymous)]);

        let ops: Vec<_> = diff(&previous, &current, DiffOptions::default())
            .iter()
            .map(|e| e.op)
            .collect();
        assert_eq!(ops, vec![Op::CREATE, Op::REMOVE]);
    }

    #[test]
    fn test_chmod_ignored_by_default() {
        let meta = FileMeta::file(FileId::new(1, 1), 1);
        let previous = snap(&[("/d/a", Some(meta))]);
        let current = snap(&[("/d/a", Some(FileMeta { mode: 0o600, ..meta }))]);

        assert!(diff(&previous, &current, DiffOptions::default()).is_empty());
    }

    #[test]
    fn test_chmod_detected_when_enabled() {
        let options = DiffOptions { detect_chmod: true };
        let meta = FileMeta::file(FileId::new(1, 1), 1);
        let previous = snap(&[("/d/a", Some(meta)), ("/d/b", Some(meta))]);
        let current = snap(&[
            ("/d/a", Some(FileMeta { mode: 0o600, ..meta })),
            ("/d/b", Some(FileMeta { mode: 0o600, len: 2, ..meta })),
        ]);

        let events = diff(&previous, &current, options);
        assert_eq!(events[0].op, Op::CHMOD);
        assert_eq!(events[1].op, Op::MODIFY | Op::CHMOD);
    }

    #[test]
    fn test_event_group_order() {
        let previous = snap(&[
            ("/d/changed", file(1, 1)),
            ("/d/gone", file(2, 1)),
            ("/d/renamed", file(3, 1)),
        ]);
        let current = snap(&[
            ("/d/changed", file(1, 2)),
            ("/d/fresh", file(4, 1)),
            ("/d/renamed-to", file(3, 1)),
        ]);

        let ops: Vec<_> = diff(&previous, &current, DiffOptions::default())
            .iter()
            .map(|e| e.op)
            .collect();
        assert_eq!(ops, vec![Op::MODIFY, Op::RENAME, Op::CREATE, Op::REMOVE]);
    }

    #[test]
    fn test_replay_reconstructs_current() {
        let cases = [
            (
                snap(&[("/d", file(1, 0)), ("/d/a", file(2, 1)), ("/d/b", file(3, 1))]),
                snap(&[("/d", file(1, 1)), ("/d/c", file(2, 1)), ("/d/n", file(5, 9))]),
            ),
            (
                snap(&[("/d/a", file(2, 1)), ("/e", file(6, 0))]),
                snap(&[("/e", file(6, 1)), ("/e/a", file(2, 1)), ("/e/z", None)]),
            ),
            (snap(&[("/d/a", None), ("/d/b", file(8, 1))]), Snapshot::new()),
            (Snapshot::new(), snap(&[("/d/a", file(2, 1))])),
        ];

        for (previous, current) in cases {
            for options in [DiffOptions::default(), DiffOptions { detect_chmod: true }] {
                let events = diff(&previous, &current, options);
                assert_eq!(replay(&previous, &events), current);
            }
        }
    }
}
