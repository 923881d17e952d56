//! The polling watcher and its one-shot lifecycle.
//!
//! A [`Watcher`] owns a [`Registry`] and, once started, one tokio task that
//! re-scans every registered target on a fixed interval and streams the
//! resulting events and scan errors through bounded channels.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── caller ────────────────────────────┐
//! │  add / remove ──► Registry (Mutex)      take_events / errors   │
//! │  start ──► spawn Poller                 close ──► cancel, join │
//! └────────────────────────────────────────────────────────────────┘
//!                         │ tick (interval_at, Delay)
//!                         ▼
//! ┌──────────────── Poller task ─────────────────┐
//! │ spawn_blocking: list_all + commit (diff)     │
//! │ deliver(errors) ─┐                           │
//! │ deliver(events) ─┴─ select! { cancelled, send }
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! `Idle ──start──► Running ──close──► Closed`, plus `Idle ──close──► Closed`.
//! Each transition happens at most once; a closed watcher cannot be
//! restarted.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use pw_core::WatchConfig;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::diff::DiffOptions;
use crate::error::WatchError;
use crate::events::FileEvent;
use crate::registry::Registry;
use crate::snapshot::Snapshot;

/// Where a [`Watcher`] is in its one-shot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    /// Created, not yet started.
    Idle = 0,
    /// The poll loop is running.
    Running = 1,
    /// Closed; terminal.
    Closed = 2,
}

impl LifecycleState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Closed => "closed",
        })
    }
}

/// Sending halves of the two output streams.
#[derive(Debug, Clone)]
struct Outputs {
    events: mpsc::Sender<FileEvent>,
    errors: mpsc::Sender<WatchError>,
}

/// Everything `start` hands to `close`.
///
/// Kept behind one lock so a `close` racing a `start` always sees the task
/// handle.
#[derive(Debug, Default)]
struct LoopSlot {
    outputs: Option<Outputs>,
    task: Option<JoinHandle<()>>,
}

/// A polling filesystem watcher.
///
/// Targets are registered with [`add`](Self::add); a directory target covers
/// itself and its direct children. After [`start`](Self::start), every
/// interval the watcher re-lists all targets and reports what changed on the
/// stream returned by [`take_events`](Self::take_events). Listing failures go
/// to [`take_errors`](Self::take_errors).
///
/// Both streams use bounded channels (capacity 1 by default), so the poll
/// loop advances only as fast as the consumer reads. [`close`](Self::close)
/// never waits on a slow consumer.
///
/// `Watcher` is `Send + Sync`; share it by reference or in an `Arc`.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use camino::Utf8Path;
/// use pw_watcher::{Op, Watcher};
///
/// # async fn example() -> Result<(), pw_watcher::WatchError> {
/// let watcher = Watcher::new();
/// watcher.add(Utf8Path::new("./src"))?;
/// let mut events = watcher.take_events().expect("first call");
/// watcher.start(Duration::from_millis(100))?;
///
/// while let Some(event) = events.recv().await {
///     if event.has_ops(&[Op::RENAME, Op::MOVE]) {
///         println!("{} moved to {:?}", event.path, event.destination());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Watcher {
    state: AtomicU8,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    slot: Mutex<LoopSlot>,
    events_rx: Mutex<Option<mpsc::Receiver<FileEvent>>>,
    errors_rx: Mutex<Option<mpsc::Receiver<WatchError>>>,
    options: DiffOptions,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("state", &self.state())
            .field("targets", &self.registry.targets().len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Watcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Watcher {
    /// Creates an idle watcher with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&WatchConfig::default())
    }

    /// Creates an idle watcher using the channel capacity and chmod
    /// detection from `config`.
    ///
    /// The poll interval is passed to [`start`](Self::start) instead.
    #[must_use]
    pub fn with_config(config: &WatchConfig) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (errors_tx, errors_rx) = mpsc::channel(capacity);

        Self {
            state: AtomicU8::new(LifecycleState::Idle as u8),
            registry: Arc::new(Registry::new()),
            shutdown: CancellationToken::new(),
            slot: Mutex::new(LoopSlot {
                outputs: Some(Outputs {
                    events: events_tx,
                    errors: errors_tx,
                }),
                task: None,
            }),
            events_rx: Mutex::new(Some(events_rx)),
            errors_rx: Mutex::new(Some(errors_rx)),
            options: DiffOptions::from(config),
        }
    }

    /// Starts polling every `interval` on the current tokio runtime.
    ///
    /// The first scan runs one interval after this call.
    ///
    /// # Errors
    ///
    /// - [`WatchError::InvalidInterval`] if `interval` is zero.
    /// - [`WatchError::NoRuntime`] if called outside a tokio runtime.
    /// - [`WatchError::AlreadyStarted`] on every call after the first
    ///   successful one, and after [`close`](Self::close).
    ///
    /// The state is unchanged when an error is returned.
    pub fn start(&self, interval: Duration) -> Result<(), WatchError> {
        if interval.is_zero() {
            return Err(WatchError::InvalidInterval);
        }
        let runtime = Handle::try_current()?;

        let mut slot = self.slot.lock();
        let Some(outputs) = slot.outputs.clone() else {
            return Err(WatchError::AlreadyStarted);
        };
        self.state
            .compare_exchange(
                LifecycleState::Idle as u8,
                LifecycleState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| WatchError::AlreadyStarted)?;

        let poller = Poller {
            registry: Arc::clone(&self.registry),
            outputs,
            shutdown: self.shutdown.clone(),
            options: self.options,
            interval,
        };
        slot.task = Some(runtime.spawn(poller.run()));
        drop(slot);

        info!(
            ?interval,
            targets = self.registry.targets().len(),
            detect_chmod = self.options.detect_chmod,
            "Watcher started"
        );
        Ok(())
    }

    /// Stops the watcher and releases everything it holds.
    ///
    /// Signals the poll loop, waits for it to exit, closes both output
    /// streams and clears the registry. Only the first call does anything;
    /// later calls return immediately. Works from any state, including
    /// [`LifecycleState::Idle`].
    pub async fn close(&self) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == LifecycleState::Closed as u8 {
                return;
            }
            match self.state.compare_exchange(
                current,
                LifecycleState::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.shutdown.cancel();
        let (task, outputs) = {
            let mut slot = self.slot.lock();
            (slot.task.take(), slot.outputs.take())
        };
        if let Some(task) = task {
            if let Err(err) = task.await {
                error!(error = %err, "Poll loop task failed");
            }
        }
        drop(outputs);
        self.registry.close();

        info!(from = %LifecycleState::from_raw(current), "Watcher closed");
    }

    /// Registers a file or directory.
    ///
    /// Registering a path twice refreshes its entries without reporting
    /// changes.
    ///
    /// # Errors
    ///
    /// [`WatchError::AlreadyClosed`] after [`close`](Self::close) has begun,
    /// or a filesystem error if `path` cannot be listed. On error nothing is
    /// registered.
    pub fn add(&self, path: &Utf8Path) -> Result<(), WatchError> {
        if self.is_closed() {
            return Err(WatchError::AlreadyClosed);
        }
        self.registry.add(path)
    }

    /// Deregisters a path. Unknown paths are ignored.
    ///
    /// # Errors
    ///
    /// [`WatchError::AlreadyClosed`] after [`close`](Self::close) has begun.
    pub fn remove(&self, path: &Utf8Path) -> Result<(), WatchError> {
        if self.is_closed() {
            return Err(WatchError::AlreadyClosed);
        }
        self.registry.remove(path)
    }

    /// Takes the event stream. Returns `None` after the first call.
    ///
    /// The stream ends once [`close`](Self::close) completes.
    pub fn take_events(&self) -> Option<mpsc::Receiver<FileEvent>> {
        self.events_rx.lock().take()
    }

    /// Takes the scan error stream. Returns `None` after the first call.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<WatchError>> {
        self.errors_rx.lock().take()
    }

    /// Returns the registered targets in sorted order.
    #[must_use]
    pub fn targets(&self) -> Vec<Utf8PathBuf> {
        self.registry.targets()
    }

    /// Returns a copy of the current snapshot of record.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` between a successful [`start`](Self::start) and
    /// [`close`](Self::close).
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Returns `true` once [`close`](Self::close) has begun.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == LifecycleState::Closed
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        // The loop notices on its next select and drops its senders.
        self.shutdown.cancel();
    }
}

/// The state moved into the poll loop task.
struct Poller {
    registry: Arc<Registry>,
    outputs: Outputs,
    shutdown: CancellationToken,
    options: DiffOptions,
    interval: Duration,
}

impl Poller {
    async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if self.poll_once().await.is_break() {
                        break;
                    }
                }
            }
        }

        debug!("Poll loop exited");
    }

    /// Runs one scan cycle and delivers its results.
    ///
    /// Breaks when shutdown wins a delivery race.
    async fn poll_once(&self) -> ControlFlow<()> {
        let registry = Arc::clone(&self.registry);
        let options = self.options;
        let cycle = tokio::task::spawn_blocking(move || {
            let scan = registry.list_all();
            let events = registry.commit(scan.snapshot, &scan.listed, options);
            (events, scan.failures)
        })
        .await;

        let (events, failures) = match cycle {
            Ok(cycle) => cycle,
            Err(err) => {
                error!(error = %err, "Scan task failed, skipping cycle");
                return ControlFlow::Continue(());
            }
        };

        if !events.is_empty() || !failures.is_empty() {
            debug!(
                events = events.len(),
                errors = failures.len(),
                "Scan cycle finished"
            );
        }

        for err in failures {
            warn!(error = %err, "Scan error");
            if !deliver(&self.shutdown, &self.outputs.errors, err).await {
                return ControlFlow::Break(());
            }
        }
        for event in events {
            trace!(op = %event.op, path = %event.path, "Delivering event");
            if !deliver(&self.shutdown, &self.outputs.events, event).await {
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }
}

/// Sends `item` unless shutdown is signalled first.
///
/// Returns `false` if shutdown won. A dropped receiver is not an error: the
/// item is discarded and delivery continues.
async fn deliver<T>(shutdown: &CancellationToken, tx: &mpsc::Sender<T>, item: T) -> bool {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => false,
        sent = tx.send(item) => {
            if sent.is_err() {
                trace!("Receiver dropped, discarding");
            }
            true
        }
    }
}
