//! Stream controller: path bookkeeping, lifecycle, and loop hosting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::batch::{BatchHandler, EventBatch, RawEvent};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::native::{EventSink, NativeWatchHandle, NotifyBackend, WatchBackend, event_channel};
use crate::runloop::{LoopDriver, RunLoopBridge};
use crate::signal::{Action, ActionSignal};

/// A stream of batched change events over a mutable set of watched
/// paths.
///
/// The controller is cheap to clone and clones share one underlying
/// stream: one thread blocks inside [`Stream::run_loop`] while any
/// other thread schedules, unschedules, or stops it.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    /// Consumer callback, locked around each invocation.
    handler: Mutex<Box<dyn BatchHandler>>,

    /// Watched paths. Mutated by control threads; takes effect at the
    /// next reschedule drain on the loop thread.
    paths: Mutex<HashSet<PathBuf>>,

    /// Immutable stream configuration.
    config: StreamConfig,

    /// Cross-thread action mailbox.
    signal: ActionSignal,

    /// Set for exactly the duration of `run_loop`.
    looping: AtomicBool,

    /// Native watch factory.
    backend: Box<dyn WatchBackend>,
}

impl Stream {
    /// Create a stream over the notify-backed production backend.
    pub fn new(config: StreamConfig, handler: impl BatchHandler + 'static) -> Self {
        Self::with_backend(config, handler, Box::new(NotifyBackend::new()))
    }

    /// Create a stream over a caller-supplied backend.
    pub fn with_backend(
        config: StreamConfig,
        handler: impl BatchHandler + 'static,
        backend: Box<dyn WatchBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                handler: Mutex::new(Box::new(handler)),
                paths: Mutex::new(HashSet::new()),
                config,
                signal: ActionSignal::new(),
                looping: AtomicBool::new(false),
                backend,
            }),
        }
    }

    /// The stream's configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Sorted snapshot of the watched paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock_paths().iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Whether a loop is currently running.
    pub fn is_looping(&self) -> bool {
        self.inner.looping.load(Ordering::SeqCst)
    }

    /// Arm the signal so path changes made before the loop starts are
    /// applied at loop entry. Idempotent; `run_loop` performs this on
    /// its own.
    pub fn initialize(&self) {
        let has_paths = !self.lock_paths().is_empty();
        if has_paths {
            self.inner.signal.raise(Action::Reschedule);
        }
    }

    /// Add a path to the watch set. Returns whether the set changed; a
    /// change raises a reschedule toward any running loop.
    pub fn schedule(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let added = self.lock_paths().insert(path.clone());
        if added {
            debug!(path = %path.display(), "Scheduled path");
            self.inner.signal.raise(Action::Reschedule);
        }
        added
    }

    /// Remove a path from the watch set. Returns whether the set
    /// changed; a change raises a reschedule toward any running loop.
    pub fn unschedule(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let removed = self.lock_paths().remove(path);
        if removed {
            debug!(path = %path.display(), "Unscheduled path");
            self.inner.signal.raise(Action::Reschedule);
        }
        removed
    }

    /// Request shutdown of the running loop. Safe from any thread, any
    /// number of times; without an active loop the call is a no-op. A
    /// stop that lands between loop entry and the first rebuild is
    /// still honored: entry consumes the pending shutdown and returns
    /// before the native watch is opened.
    pub fn stop(&self) {
        if !self.is_looping() {
            debug!("Stop ignored; no loop is active");
            return;
        }
        debug!("Stop requested");
        self.inner.signal.raise(Action::Shutdown);
    }

    /// Host the dispatch loop on the calling thread.
    ///
    /// Blocks until [`Stream::stop`] is called or the handler fails.
    /// The native watch is built here from the current path set,
    /// replaced wholesale on every reschedule, and destroyed on every
    /// exit path. Returns `AlreadyLooping` when a loop is already
    /// running on another thread.
    pub fn run_loop(&self) -> Result<()> {
        let inner = &*self.inner;
        if inner
            .looping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StreamError::AlreadyLooping);
        }
        let _looping = LoopFlagGuard(&inner.looping);

        // Leftover reschedules and wake tokens are subsumed by the
        // initial rebuild below; a pending shutdown exits before the
        // native watch is touched.
        if inner.signal.reset() == Action::Shutdown {
            debug!("Shutdown was pending at loop entry");
            return Ok(());
        }

        let (sink, events) = event_channel();
        let mut session = LoopSession {
            stream: inner,
            sink,
            watch: NativeWatchHandle::empty(),
        };
        session.rebuild();

        debug!(
            latency_ms = inner.config.latency.as_millis() as u64,
            file_events = inner.config.file_events,
            "Entering run loop"
        );
        let result =
            RunLoopBridge::new(&inner.signal, &events, inner.config.latency).run(&mut session);
        session.watch.destroy();

        match &result {
            Ok(()) => debug!("Run loop exited"),
            Err(err) => warn!("Run loop exited with error: {err}"),
        }
        result
    }

    fn lock_paths(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.inner
            .paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the looping flag on every exit path, including panics that
/// unwind out of the consumer callback.
struct LoopFlagGuard<'a>(&'a AtomicBool);

impl Drop for LoopFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Loop-local session state. The native handle never leaves this
/// struct, so only the loop thread ever touches it; on unwind its drop
/// still tears the watch down.
struct LoopSession<'a> {
    stream: &'a StreamInner,
    sink: EventSink,
    watch: NativeWatchHandle,
}

impl LoopSession<'_> {
    fn lock_handler(&self) -> MutexGuard<'_, Box<dyn BatchHandler>> {
        self.stream
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl LoopDriver for LoopSession<'_> {
    fn dispatch(&mut self, events: Vec<RawEvent>) -> Result<()> {
        let batch = EventBatch::coalesce(events, self.stream.config.file_events);
        debug!(paths = batch.len(), "Dispatching batch");
        self.lock_handler()
            .on_batch(&batch)
            .map_err(StreamError::Handler)
    }

    fn rebuild(&mut self) {
        self.watch.destroy();

        let snapshot = {
            let paths = self
                .stream
                .paths
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut snapshot: Vec<PathBuf> = paths.iter().cloned().collect();
            snapshot.sort();
            snapshot
        };
        if snapshot.is_empty() {
            debug!("Path set empty; native watch stays down");
            return;
        }

        match self
            .stream
            .backend
            .open(&snapshot, &self.stream.config, self.sink.clone())
        {
            Ok(watch) => {
                debug!(paths = snapshot.len(), "Native watch rebuilt");
                self.watch = watch;
            }
            Err(err) => {
                warn!("Failed to rebuild native watch: {err}");
                self.lock_handler().on_watch_error(&err);
            }
        }
    }
}
