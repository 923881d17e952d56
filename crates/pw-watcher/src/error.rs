//! Error types for the pw-watcher crate.
//!
//! This module provides the [`WatchError`] type, shared by the synchronous
//! lifecycle and registration calls and by the asynchronous error stream.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};

/// Errors that can occur while registering targets, driving the watcher
/// lifecycle, or scanning.
///
/// # Error Categories
///
/// - **Lifecycle** ([`AlreadyStarted`], [`AlreadyClosed`],
///   [`InvalidInterval`], [`NoRuntime`]): returned synchronously by the call
///   that violated the one-shot state machine. The watcher itself is
///   unaffected.
/// - **Filesystem** ([`PathNotFound`], [`Stat`], [`ReadDir`]): returned by
///   [`Watcher::add`] when a target cannot be listed, and delivered on the
///   error stream when a registered target fails to list during a scan. [`PathNotFound`] during a scan also deregisters
///   the target.
///
/// # Examples
///
/// ```
/// use pw_watcher::WatchError;
///
/// fn handle_error(err: &WatchError) {
///     if err.is_not_found() {
///         eprintln!("target vanished: {err}");
///     } else if err.is_lifecycle() {
///         eprintln!("watcher misuse: {err}");
///     } else {
///         eprintln!("scan problem: {err}");
///     }
/// }
/// # handle_error(&WatchError::AlreadyClosed);
/// ```
///
/// [`AlreadyStarted`]: WatchError::AlreadyStarted
/// [`AlreadyClosed`]: WatchError::AlreadyClosed
/// [`InvalidInterval`]: WatchError::InvalidInterval
/// [`NoRuntime`]: WatchError::NoRuntime
/// [`PathNotFound`]: WatchError::PathNotFound
/// [`Stat`]: WatchError::Stat
/// [`ReadDir`]: WatchError::ReadDir
/// [`Watcher::add`]: crate::Watcher::add
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// [`Watcher::start`](crate::Watcher::start) was called more than once,
    /// or after the watcher was closed.
    #[error("watcher already started")]
    AlreadyStarted,

    /// The watcher has been closed; no further targets can be changed.
    #[error("watcher already closed")]
    AlreadyClosed,

    /// A zero poll interval was requested.
    #[error("poll interval must be greater than zero")]
    InvalidInterval,

    /// [`Watcher::start`](crate::Watcher::start) was called outside a tokio
    /// runtime.
    #[error("no tokio runtime available to run the poll loop")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The path does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// Reading the metadata of a path failed for a reason other than absence.
    #[error("failed to stat {path}: {source}")]
    Stat {
        /// The path that could not be statted.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Listing the entries of a directory target failed.
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        /// The directory that could not be listed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Classifies a failed `stat` of `path`.
    ///
    /// `NotFound` becomes [`WatchError::PathNotFound`]; anything else is kept
    /// as [`WatchError::Stat`].
    pub fn from_stat(path: &Utf8Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::path_not_found(path)
        } else {
            Self::Stat {
                path: path.to_owned(),
                source,
            }
        }
    }

    /// Classifies a failed directory listing of `path`.
    ///
    /// A directory removed between its `stat` and its listing also reports
    /// [`WatchError::PathNotFound`].
    pub fn from_read_dir(path: &Utf8Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::path_not_found(path)
        } else {
            Self::ReadDir {
                path: path.to_owned(),
                source,
            }
        }
    }

    /// Returns `true` if the error means the path no longer exists.
    ///
    /// Scan errors of this kind deregister the failing target.
    #[inline]
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound(_))
    }

    /// Returns `true` for errors caused by misuse of the watcher lifecycle
    /// rather than by the filesystem.
    #[inline]
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::AlreadyStarted | Self::AlreadyClosed | Self::InvalidInterval | Self::NoRuntime(_)
        )
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Self::PathNotFound(path) | Self::Stat { path, .. } | Self::ReadDir { path, .. } => {
                Some(path)
            }
            Self::AlreadyStarted
            | Self::AlreadyClosed
            | Self::InvalidInterval
            | Self::NoRuntime(_) => None,
        }
    }
}
