//! Background observer: hosts a stream's run loop on a named thread.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::batch::BatchHandler;
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::native::WatchBackend;
use crate::stream::Stream;

/// Owns a [`Stream`] together with the thread running its loop.
///
/// Dropping the observer stops the loop and joins the thread; call
/// [`Observer::join`] instead to observe how the loop ended.
pub struct Observer {
    stream: Stream,
    thread: Option<JoinHandle<Result<()>>>,
}

impl Observer {
    /// Spawn an observer over the notify-backed production backend.
    ///
    /// Returns once the loop is running, so a stop issued right after
    /// is always observed.
    pub fn spawn(config: StreamConfig, handler: impl BatchHandler + 'static) -> Result<Self> {
        Self::start(Stream::new(config, handler))
    }

    /// Spawn an observer over a caller-supplied backend. Same startup
    /// guarantee as [`Observer::spawn`].
    pub fn spawn_with_backend(
        config: StreamConfig,
        handler: impl BatchHandler + 'static,
        backend: Box<dyn WatchBackend>,
    ) -> Result<Self> {
        Self::start(Stream::with_backend(config, handler, backend))
    }

    fn start(stream: Stream) -> Result<Self> {
        let loop_stream = stream.clone();
        let thread = std::thread::Builder::new()
            .name("watchstream-loop".to_string())
            .spawn(move || loop_stream.run_loop())?;
        // A stop issued after spawn returns must observe the loop as
        // active.
        while !stream.is_looping() && !thread.is_finished() {
            std::thread::sleep(Duration::from_millis(1));
        }
        debug!("Observer thread spawned");
        Ok(Self {
            stream,
            thread: Some(thread),
        })
    }

    /// The underlying stream, for control calls beyond the delegations
    /// below.
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Add a path to the watch set. See [`Stream::schedule`].
    pub fn schedule(&self, path: impl Into<PathBuf>) -> bool {
        self.stream.schedule(path)
    }

    /// Remove a path from the watch set. See [`Stream::unschedule`].
    pub fn unschedule(&self, path: impl AsRef<Path>) -> bool {
        self.stream.unschedule(path)
    }

    /// Request shutdown of the loop without joining it.
    pub fn stop(&self) {
        self.stream.stop();
    }

    /// Wait for the loop thread to finish and return the loop's result.
    ///
    /// Does not stop the loop on its own: either call
    /// [`Observer::stop`] first or let a handler error end the loop.
    pub fn join(mut self) -> Result<()> {
        Self::join_thread(&mut self.thread)
    }

    fn join_thread(thread: &mut Option<JoinHandle<Result<()>>>) -> Result<()> {
        match thread.take() {
            Some(handle) => handle.join().map_err(|_| StreamError::LoopPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        self.stream.stop();
        if let Err(err) = Self::join_thread(&mut self.thread) {
            warn!("Observer loop ended with error: {err}");
        }
    }
}
