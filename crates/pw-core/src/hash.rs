//! Fx-hashed collections keyed by watched paths.
//!
//! Snapshots and target sets are hash tables keyed by [`Utf8PathBuf`] that are
//! rebuilt on every poll cycle. The Fx hash from `rustc-hash` is noticeably
//! cheaper than SipHash for these short string keys, and the keys come from
//! the local filesystem, so hash-flooding resistance is not a concern.
//!
//! # Examples
//!
//! ```
//! use camino::Utf8PathBuf;
//! use pw_core::{PathMap, PathSet, path_map_with_capacity};
//!
//! let mut sizes: PathMap<u64> = path_map_with_capacity(4);
//! sizes.insert(Utf8PathBuf::from("/tmp/a"), 12);
//!
//! let mut targets = PathSet::default();
//! targets.insert(Utf8PathBuf::from("/tmp"));
//! assert!(targets.contains(camino::Utf8Path::new("/tmp")));
//! ```
//!
//! [`Utf8PathBuf`]: camino::Utf8PathBuf

use camino::Utf8PathBuf;

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// A map from UTF-8 paths to `V`.
pub type PathMap<V> = FxHashMap<Utf8PathBuf, V>;

/// A set of UTF-8 paths.
pub type PathSet = FxHashSet<Utf8PathBuf>;

/// Creates an empty [`PathMap`] able to hold `capacity` entries without
/// reallocating.
#[inline]
#[must_use]
pub fn path_map_with_capacity<V>(capacity: usize) -> PathMap<V> {
    PathMap::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    #[test]
    fn test_path_map_lookup_by_borrowed_path() {
        let mut map: PathMap<u32> = path_map_with_capacity(2);
        map.insert(Utf8PathBuf::from("/watch/a"), 1);
        assert_eq!(map.get(Utf8Path::new("/watch/a")), Some(&1));
        assert_eq!(map.get(Utf8Path::new("/watch/b")), None);
    }

    #[test]
    fn test_path_map_capacity() {
        let map: PathMap<()> = path_map_with_capacity(64);
        assert!(map.capacity() >= 64);
    }

    #[test]
    fn test_path_set_dedups() {
        let mut set = PathSet::default();
        assert!(set.insert(Utf8PathBuf::from("/watch")));
        assert!(!set.insert(Utf8PathBuf::from("/watch")));
        assert_eq!(set.len(), 1);
    }
}
