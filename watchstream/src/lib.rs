//! # Watchstream
//!
//! This crate bridges OS directory-change notifications into batched
//! consumer callbacks. A stream owns a mutable set of watched paths and
//! a run loop; other threads reschedule or stop the loop through a
//! coalescing signal, so path changes and shutdown are race free.
//!
//! ## Features
//!
//! - **Batched Delivery**: Events within a latency window coalesce into one batch
//! - **Live Rescheduling**: Watched paths change without restarting the loop
//! - **Race-free Shutdown**: Stop overrides pending reschedules, even mid-dispatch
//! - **Pluggable Backends**: Production notify backend or a manual test source
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Watchstream                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  StreamConfig ──► Stream ──► EventBatch                        │
//! │       │             │             │                             │
//! │       ▼             ▼             ▼                             │
//! │  WatchBackend   ActionSignal   BatchHandler                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod flags;
pub mod native;
pub mod observer;
mod runloop;
pub mod signal;
pub mod stream;

pub use batch::{BatchHandler, EventBatch, RawEvent};
pub use config::{DEFAULT_LATENCY, StreamConfig};
pub use error::{Result, StreamError};
pub use flags::EventFlags;
pub use native::{
    ActiveWatch, EventSink, ManualOpen, ManualSource, NativeWatchHandle, NotifyBackend,
    WatchBackend, event_channel,
};
pub use observer::Observer;
pub use signal::{Action, ActionSignal};
pub use stream::Stream;
