//! Batch codec: raw (path, flags) pairs in, coalesced batches out.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::warn;

use crate::error::StreamError;
use crate::flags::EventFlags;

/// A single translated change notice from a watch backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// The affected path as reported by the backend.
    pub path: PathBuf,

    /// Flag word for this notice.
    pub flags: EventFlags,
}

impl RawEvent {
    /// Create a new raw event.
    pub fn new(path: impl Into<PathBuf>, flags: EventFlags) -> Self {
        Self {
            path: path.into(),
            flags,
        }
    }
}

/// One delivery to the consumer: parallel path and flag sequences of
/// equal length, index-aligned, in native delivery order.
///
/// Raw events for the same path are OR-merged into a single entry. In
/// directory-granularity mode (the default) paths are reduced to their
/// containing directory and item-level bits are cleared, so consumers
/// see which directories need rescanning rather than individual files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    paths: Vec<PathBuf>,
    flags: Vec<EventFlags>,
}

impl EventBatch {
    /// Fold raw events into a batch.
    pub fn coalesce<I>(events: I, file_events: bool) -> Self
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let mut merged: IndexMap<PathBuf, EventFlags> = IndexMap::new();
        for event in events {
            let (path, flags) = if file_events {
                (event.path, event.flags)
            } else {
                (containing_dir(event.path), event.flags.strip_item_bits())
            };
            *merged.entry(path).or_insert(EventFlags::empty()) |= flags;
        }

        let mut paths = Vec::with_capacity(merged.len());
        let mut flags = Vec::with_capacity(merged.len());
        for (path, word) in merged {
            paths.push(path);
            flags.push(word);
        }
        Self { paths, flags }
    }

    /// Paths in this batch, in delivery order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Flag words, index-aligned with [`EventBatch::paths`].
    pub fn flags(&self) -> &[EventFlags] {
        &self.flags
    }

    /// Iterate over (path, flags) entries in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, EventFlags)> {
        self.paths
            .iter()
            .map(PathBuf::as_path)
            .zip(self.flags.iter().copied())
    }

    /// Look up the flag word for a path, if present.
    pub fn flags_for(&self, path: impl AsRef<Path>) -> Option<EventFlags> {
        let path = path.as_ref();
        self.iter().find(|(p, _)| *p == path).map(|(_, f)| f)
    }

    /// Number of entries in the batch.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if the batch has no entries.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Reduce a path to its containing directory. Paths without a usable
/// parent (filesystem roots, bare relative names) are kept as-is.
fn containing_dir(path: PathBuf) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => path,
    }
}

/// Consumer callback invoked on the loop thread for each batch.
pub trait BatchHandler: Send {
    /// Handle one batch. An error terminates the current run loop and is
    /// returned from `run_loop`.
    fn on_batch(&mut self, batch: &EventBatch) -> anyhow::Result<()>;

    /// Called when rebuilding the native watch fails. The loop stays
    /// alive with no active watch until the next reschedule.
    fn on_watch_error(&mut self, error: &StreamError) {
        warn!("Watch rebuild failed: {error}");
    }
}

impl<F> BatchHandler for F
where
    F: FnMut(&EventBatch) -> anyhow::Result<()> + Send,
{
    fn on_batch(&mut self, batch: &EventBatch) -> anyhow::Result<()> {
        self(batch)
    }
}
