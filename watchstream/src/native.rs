//! Native watch backends and the handle teardown protocol.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::batch::RawEvent;
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::flags::EventFlags;

/// Delivery target handed to backends. Clonable and safe to use from
/// any backend-internal thread.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<RawEvent>,
}

impl EventSink {
    /// Deliver one raw event. Events are silently dropped once the loop
    /// side of the channel is gone.
    pub fn send(&self, event: RawEvent) {
        let _ = self.tx.send(event);
    }
}

/// Create the raw event channel connecting a backend to a run loop.
pub fn event_channel() -> (EventSink, Receiver<RawEvent>) {
    let (tx, rx) = unbounded();
    (EventSink { tx }, rx)
}

/// Backend-side resources of one active watch.
pub trait ActiveWatch: Send {
    /// Force out anything the backend buffers ahead of the sink. The
    /// default covers backends that deliver straight into the channel.
    fn flush(&mut self) {}

    /// Halt delivery. Must tolerate already-dead registrations.
    fn stop(&mut self);
}

/// Handle to one active native watch, owned by the loop thread.
///
/// `destroy` is idempotent and ordered: flush pending delivery, stop
/// delivery, then release the backend resources. Drop performs the same
/// teardown, so the watch cannot outlive the loop on any exit path.
#[derive(Default)]
pub struct NativeWatchHandle {
    inner: Option<Box<dyn ActiveWatch>>,
}

impl NativeWatchHandle {
    /// Handle with no active watch.
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Wrap a freshly opened backend watch.
    pub fn new(watch: Box<dyn ActiveWatch>) -> Self {
        Self { inner: Some(watch) }
    }

    /// Whether a watch is currently held.
    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    /// Tear the watch down. A no-op when already empty.
    pub fn destroy(&mut self) {
        if let Some(mut watch) = self.inner.take() {
            watch.flush();
            watch.stop();
        }
    }
}

impl Drop for NativeWatchHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Boundary to the OS-level change detection mechanism.
pub trait WatchBackend: Send + Sync {
    /// Open a watch over `paths`, delivering translated events to
    /// `sink`. On any partial failure the implementation must release
    /// everything it allocated before returning the error; a returned
    /// handle is always fully armed.
    fn open(
        &self,
        paths: &[PathBuf],
        config: &StreamConfig,
        sink: EventSink,
    ) -> Result<NativeWatchHandle>;
}

/// Production backend over the `notify` crate's recommended watcher.
#[derive(Debug, Default)]
pub struct NotifyBackend;

impl NotifyBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl WatchBackend for NotifyBackend {
    fn open(
        &self,
        paths: &[PathBuf],
        _config: &StreamConfig,
        sink: EventSink,
    ) -> Result<NativeWatchHandle> {
        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for raw in translate(&event) {
                        sink.send(raw);
                    }
                }
                Err(e) => {
                    warn!("Watch backend error: {e}");
                }
            },
        )?;

        // A failed registration drops the watcher here, and with it
        // every registration made so far.
        for path in paths {
            watcher.watch(path, RecursiveMode::Recursive)?;
        }

        debug!(paths = paths.len(), "Opened notify watch");
        Ok(NativeWatchHandle::new(Box::new(NotifyWatch {
            watcher,
            roots: paths.to_vec(),
        })))
    }
}

/// An open notify watcher and its registered roots.
struct NotifyWatch {
    watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl ActiveWatch for NotifyWatch {
    fn stop(&mut self) {
        for root in &self.roots {
            let _ = self.watcher.unwatch(root);
        }
    }
}

/// Translate one notify event into raw (path, flags) events.
///
/// Access-time noise carries nothing the flag vocabulary can express
/// and is dropped here; rescan hints map to `MUST_SCAN_SUBDIRS`.
pub(crate) fn translate(event: &notify::Event) -> Vec<RawEvent> {
    let Some(mut base) = kind_flags(event.kind) else {
        return Vec::new();
    };
    if event.need_rescan() {
        base |= EventFlags::MUST_SCAN_SUBDIRS;
    }

    let kind_bits =
        EventFlags::ITEM_IS_FILE | EventFlags::ITEM_IS_DIR | EventFlags::ITEM_IS_SYMLINK;
    event
        .paths
        .iter()
        .map(|path| {
            let mut flags = base;
            if !flags.intersects(kind_bits) {
                flags |= node_flags(path);
            }
            RawEvent::new(path.clone(), flags)
        })
        .collect()
}

/// Map a notify event kind onto the flag vocabulary. `None` drops the
/// event entirely.
fn kind_flags(kind: notify::EventKind) -> Option<EventFlags> {
    match kind {
        notify::EventKind::Create(notify::event::CreateKind::File) => {
            Some(EventFlags::ITEM_CREATED | EventFlags::ITEM_IS_FILE)
        }
        notify::EventKind::Create(notify::event::CreateKind::Folder) => {
            Some(EventFlags::ITEM_CREATED | EventFlags::ITEM_IS_DIR)
        }
        notify::EventKind::Create(_) => Some(EventFlags::ITEM_CREATED),
        notify::EventKind::Remove(notify::event::RemoveKind::File) => {
            Some(EventFlags::ITEM_REMOVED | EventFlags::ITEM_IS_FILE)
        }
        notify::EventKind::Remove(notify::event::RemoveKind::Folder) => {
            Some(EventFlags::ITEM_REMOVED | EventFlags::ITEM_IS_DIR)
        }
        notify::EventKind::Remove(_) => Some(EventFlags::ITEM_REMOVED),
        notify::EventKind::Modify(modify) => match modify {
            notify::event::ModifyKind::Name(_) => Some(EventFlags::ITEM_RENAMED),
            notify::event::ModifyKind::Metadata(meta) => match meta {
                notify::event::MetadataKind::Ownership => Some(EventFlags::ITEM_CHANGE_OWNER),
                notify::event::MetadataKind::Extended => Some(EventFlags::ITEM_XATTR_MOD),
                notify::event::MetadataKind::AccessTime => None,
                _ => Some(EventFlags::ITEM_INODE_META_MOD),
            },
            _ => Some(EventFlags::ITEM_MODIFIED),
        },
        notify::EventKind::Access(_) => None,
        _ => Some(EventFlags::empty()),
    }
}

/// Fill is-file/is-dir/is-symlink from the filesystem when the event
/// kind did not already say. The node may be gone by the time we look.
fn node_flags(path: &Path) -> EventFlags {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => {
            let file_type = meta.file_type();
            if file_type.is_symlink() {
                EventFlags::ITEM_IS_SYMLINK
            } else if file_type.is_dir() {
                EventFlags::ITEM_IS_DIR
            } else {
                EventFlags::ITEM_IS_FILE
            }
        }
        Err(_) => EventFlags::empty(),
    }
}

/// Deterministic in-memory backend for tests.
///
/// Records every successful open with a generation counter and the path
/// snapshot it received; `emit` injects events into the currently
/// active watch. Clones share state, so a test can keep one clone and
/// hand another to the stream under test.
#[derive(Debug, Clone, Default)]
pub struct ManualSource {
    shared: Arc<Mutex<ManualShared>>,
}

#[derive(Debug, Default)]
struct ManualShared {
    generation: u64,
    active: Option<(u64, EventSink)>,
    opens: Vec<ManualOpen>,
    fail_next: bool,
}

/// Record of one successful `open` on a [`ManualSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualOpen {
    /// Monotonic open counter, starting at 1.
    pub generation: u64,

    /// The path snapshot the watch was opened with.
    pub paths: Vec<PathBuf>,
}

impl ManualSource {
    /// Create a source with no active watch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject an event into the active watch. Returns whether a watch
    /// accepted it.
    pub fn emit(&self, path: impl Into<PathBuf>, flags: EventFlags) -> bool {
        let shared = self.lock();
        match &shared.active {
            Some((_, sink)) => {
                sink.send(RawEvent::new(path, flags));
                true
            }
            None => false,
        }
    }

    /// Whether a watch is currently open.
    pub fn is_active(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Every successful open so far.
    pub fn opens(&self) -> Vec<ManualOpen> {
        self.lock().opens.clone()
    }

    /// Make the next `open` fail with an injected watch error.
    pub fn fail_next_open(&self) {
        self.lock().fail_next = true;
    }

    fn lock(&self) -> MutexGuard<'_, ManualShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WatchBackend for ManualSource {
    fn open(
        &self,
        paths: &[PathBuf],
        _config: &StreamConfig,
        sink: EventSink,
    ) -> Result<NativeWatchHandle> {
        let mut shared = self.lock();
        if shared.fail_next {
            shared.fail_next = false;
            return Err(StreamError::Watch(notify::Error::generic(
                "injected open failure",
            )));
        }

        shared.generation += 1;
        let generation = shared.generation;
        shared.active = Some((generation, sink));
        shared.opens.push(ManualOpen {
            generation,
            paths: paths.to_vec(),
        });

        Ok(NativeWatchHandle::new(Box::new(ManualWatch {
            generation,
            shared: Arc::clone(&self.shared),
        })))
    }
}

/// Teardown token for one manual watch generation.
struct ManualWatch {
    generation: u64,
    shared: Arc<Mutex<ManualShared>>,
}

impl ActiveWatch for ManualWatch {
    fn stop(&mut self) {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        // A stale handle must not clear a newer watch.
        if matches!(shared.active, Some((generation, _)) if generation == self.generation) {
            shared.active = None;
        }
    }
}
