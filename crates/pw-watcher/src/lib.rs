//! Polling file watcher with snapshot diffing and async event streaming.
//!
//! This crate detects filesystem changes by periodically re-listing a set of
//! registered files and directories and comparing each listing with the
//! previous one. It needs no OS notification facility, which makes it usable
//! on network mounts, containers and other places where inotify-style APIs
//! are missing or unreliable.
//!
//! # Overview
//!
//! - Register files or directories with [`Watcher::add`]. A directory covers
//!   itself and its direct children; nothing deeper is listed.
//! - [`Watcher::start`] spawns one tokio task that scans every interval.
//! - Each scan produces [`FileEvent`]s tagged with [`Op`] flags. A file that
//!   moved is recognized by its [`FileId`] and reported once as a rename or
//!   move instead of a remove plus a create.
//! - Events and scan errors arrive on bounded channels taken with
//!   [`Watcher::take_events`] and [`Watcher::take_errors`].
//! - [`Watcher::close`] stops the loop and ends both streams.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   list_target   ┌──────────┐   diff    ┌────────────┐
//! │ Registry    │ ──────────────► │ Snapshot │ ────────► │ FileEvent  │
//! │ (targets +  │ ◄────────────── │ current  │           │ + Op flags │
//! │  previous)  │     commit      └──────────┘           └─────┬──────┘
//! └─────────────┘                                              │ deliver
//!        ▲ add / remove                                        ▼
//! ┌──────┴──────────────────────────────────────┐    ┌─────────────────┐
//! │ Watcher (Idle ─► Running ─► Closed)         │    │ mpsc::Receiver  │
//! └─────────────────────────────────────────────┘    └─────────────────┘
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! pw-cli ──► pw-watcher ──► pw-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use camino::Utf8Path;
//! use pw_watcher::Watcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let watcher = Watcher::new();
//!     watcher.add(Utf8Path::new("/var/spool/incoming"))?;
//!
//!     let mut events = watcher.take_events().ok_or("events already taken")?;
//!     watcher.start(Duration::from_millis(250))?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{} {}", event.op, event.path);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Diffing Snapshots Directly
//!
//! The diff engine is usable without a watcher:
//!
//! ```
//! use camino::Utf8PathBuf;
//! use pw_watcher::{diff, DiffOptions, FileId, FileMeta, Op, Snapshot};
//!
//! let moved = FileMeta::file(FileId::new(1, 77), 12);
//! let before: Snapshot = [(Utf8PathBuf::from("/d/a"), Some(moved))].into_iter().collect();
//! let after: Snapshot = [(Utf8PathBuf::from("/e/a"), Some(moved))].into_iter().collect();
//!
//! let events = diff(&before, &after, DiffOptions::default());
//! assert_eq!(events[0].op, Op::MOVE);
//! assert_eq!(events[0].destination().map(|p| p.as_str()), Some("/e/a"));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod diff;
pub mod error;
pub mod events;
pub mod metadata;
pub mod registry;
pub mod snapshot;
pub mod watcher;

pub use diff::{DiffOptions, diff};
pub use error::WatchError;
pub use events::{FileEvent, Op};
pub use metadata::{FileId, FileMeta};
pub use registry::{Registry, TargetScan};
pub use snapshot::{Snapshot, list_target};
pub use watcher::{LifecycleState, Watcher};
