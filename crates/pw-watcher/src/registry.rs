//! The watch-target registry.
//!
//! The [`Registry`] owns the set of registered targets and the snapshot of
//! record, both behind one [`parking_lot::Mutex`]. Filesystem listing always
//! happens outside the lock; only merging, pruning and the snapshot swap run
//! under it.
//!
//! # Scan Cycle
//!
//! ```text
//! list_all()                      commit(scan.snapshot, &scan.listed)
//!   lock: copy target list          lock:
//!   unlocked: list each target        reconcile targets added/removed meanwhile
//!   NotFound: lock, prune             diff(previous, current)
//!                                     previous = current
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use pw_core::{FxHashSet, PathSet};
use tracing::{debug, warn};

use crate::diff::{DiffOptions, diff};
use crate::error::WatchError;
use crate::events::FileEvent;
use crate::snapshot::{Snapshot, list_target};

/// The outcome of listing every registered target once.
#[derive(Debug, Default)]
pub struct TargetScan {
    /// Union of every successful listing.
    pub snapshot: Snapshot,
    /// Targets that listed successfully, in sorted order.
    pub listed: Vec<Utf8PathBuf>,
    /// One error per target that failed to list.
    pub failures: Vec<WatchError>,
}

#[derive(Debug, Default)]
struct RegistryState {
    targets: PathSet,
    snapshot: Snapshot,
    closed: bool,
}

impl RegistryState {
    /// Deregisters `target` and drops the snapshot entries only it covered.
    fn forget(&mut self, target: &Utf8Path) -> bool {
        if !self.targets.remove(target) {
            return false;
        }
        let targets = &self.targets;
        self.snapshot
            .drop_target(target, |path| is_tracked(targets, path));
        true
    }
}

/// A path stays tracked while it, or its parent directory, is a target.
fn is_tracked(targets: &PathSet, path: &Utf8Path) -> bool {
    targets.contains(path) || path.parent().is_some_and(|parent| targets.contains(parent))
}

/// Registered targets plus the snapshot of record.
///
/// `Registry` is `Send + Sync`; every method takes `&self`.
///
/// # Examples
///
/// ```
/// use pw_watcher::Registry;
/// use camino::Utf8Path;
///
/// let registry = Registry::new();
/// let err = registry.add(Utf8Path::new("/definitely/not/here")).unwrap_err();
/// assert!(err.is_not_found());
/// assert!(registry.targets().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `target` and records its current listing.
    ///
    /// Re-adding a registered target refreshes its entries.
    ///
    /// # Errors
    ///
    /// Any error from [`list_target`], in which case nothing is registered,
    /// or [`WatchError::AlreadyClosed`] once [`close`](Self::close) has run.
    pub fn add(&self, target: &Utf8Path) -> Result<(), WatchError> {
        let listing = list_target(target)?;
        let entries = listing.len();

        let mut state = self.state.lock();
        if state.closed {
            return Err(WatchError::AlreadyClosed);
        }
        state.targets.insert(target.to_owned());
        state.snapshot.merge(listing);
        drop(state);

        debug!(root = %target, entries, "Target registered");
        Ok(())
    }

    /// Deregisters `target`, dropping it and its direct children from the
    /// snapshot. Unknown targets are ignored.
    ///
    /// Entries still covered by another target are kept.
    ///
    /// # Errors
    ///
    /// [`WatchError::AlreadyClosed`] once [`close`](Self::close) has run.
    pub fn remove(&self, target: &Utf8Path) -> Result<(), WatchError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(WatchError::AlreadyClosed);
        }
        if state.forget(target) {
            debug!(root = %target, "Target deregistered");
        }
        Ok(())
    }

    /// Lists every registered target from the filesystem.
    ///
    /// A target that no longer exists is deregistered and its entries are
    /// dropped; its [`WatchError::PathNotFound`] is still returned in
    /// [`TargetScan::failures`]. Other failures leave the target registered.
    pub fn list_all(&self) -> TargetScan {
        let mut scan = TargetScan::default();

        for target in self.targets() {
            match list_target(&target) {
                Ok(listing) => {
                    scan.snapshot.merge(listing);
                    scan.listed.push(target);
                }
                Err(err) => {
                    if err.is_not_found() && self.state.lock().forget(&target) {
                        warn!(root = %target, "Target no longer exists, deregistered");
                    }
                    scan.failures.push(err);
                }
            }
        }

        scan
    }

    /// Diffs `current` against the snapshot of record, then makes `current`
    /// the new snapshot of record.
    ///
    /// `listed` names the targets `current` was built from. Targets removed
    /// since the listing are dropped from `current`, and registered targets
    /// missing from it keep their previous entries, so registration changes
    /// made during a scan never surface as events.
    ///
    /// Returns no events once the registry is closed.
    pub fn commit(
        &self,
        mut current: Snapshot,
        listed: &[Utf8PathBuf],
        options: DiffOptions,
    ) -> Vec<FileEvent> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Vec::new();
        }

        for target in listed {
            if !state.targets.contains(target) {
                current.drop_target(target, |path| is_tracked(&state.targets, path));
            }
        }
        let listed: FxHashSet<&Utf8Path> = listed.iter().map(Utf8PathBuf::as_path).collect();
        for target in &state.targets {
            if !listed.contains(target.as_path()) {
                current.copy_target_from(&state.snapshot, target);
            }
        }

        let events = diff(&state.snapshot, &current, options);
        state.snapshot = current;
        events
    }

    /// Returns the registered targets in sorted order.
    #[must_use]
    pub fn targets(&self) -> Vec<Utf8PathBuf> {
        let mut targets: Vec<_> = self.state.lock().targets.iter().cloned().collect();
        targets.sort_unstable();
        targets
    }

    /// Returns `true` if `target` is registered.
    #[must_use]
    pub fn contains_target(&self, target: &Utf8Path) -> bool {
        self.state.lock().targets.contains(target)
    }

    /// Returns a copy of the snapshot of record.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().snapshot.clone()
    }

    /// Clears all targets and entries and rejects further registration.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.targets.clear();
        state.snapshot = Snapshot::new();
    }
}
