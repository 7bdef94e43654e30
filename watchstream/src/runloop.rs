//! The blocking dispatch loop: selects over the action signal and the
//! raw event channel, applies the latency window, dispatches batches.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, after, select};
use tracing::debug_span;

use crate::batch::RawEvent;
use crate::error::{Result, StreamError};
use crate::signal::{Action, ActionSignal};

/// Loop-thread callbacks the bridge drives.
pub(crate) trait LoopDriver {
    /// Deliver one coalesced window of raw events to the consumer.
    fn dispatch(&mut self, events: Vec<RawEvent>) -> Result<()>;

    /// Rebuild the native watch from the current path set.
    fn rebuild(&mut self);
}

enum Flow {
    Continue,
    Stop,
}

/// Hosts the blocking dispatch loop on the calling thread.
///
/// The bridge holds no locks while blocked; driver callbacks take
/// whatever locks they need for exactly one dispatch or rebuild step.
pub(crate) struct RunLoopBridge<'a> {
    signal: &'a ActionSignal,
    events: &'a Receiver<RawEvent>,
    latency: Duration,
}

impl<'a> RunLoopBridge<'a> {
    pub(crate) fn new(
        signal: &'a ActionSignal,
        events: &'a Receiver<RawEvent>,
        latency: Duration,
    ) -> Self {
        Self {
            signal,
            events,
            latency,
        }
    }

    /// Block until shutdown, a handler failure, or a disconnect. The
    /// caller owns the native handle and tears it down after `run`
    /// returns, whatever the exit path.
    pub(crate) fn run(&self, driver: &mut dyn LoopDriver) -> Result<()> {
        loop {
            select! {
                recv(self.signal.wake_receiver()) -> _ => {
                    if matches!(self.handle_wake(driver)?, Flow::Stop) {
                        return Ok(());
                    }
                }
                recv(self.events) -> msg => {
                    let Ok(first) = msg else {
                        return Err(StreamError::Disconnected);
                    };
                    let (pending, woke) = self.collect_window(first)?;
                    self.dispatch(driver, pending)?;
                    if woke && matches!(self.handle_wake(driver)?, Flow::Stop) {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Collect raw events until the latency deadline passes or an
    /// action wake closes the window early. Returns the pending events
    /// and whether a wake token was consumed; a consumed wake is
    /// handled by the caller only after the pending batch went out.
    fn collect_window(&self, first: RawEvent) -> Result<(Vec<RawEvent>, bool)> {
        let mut pending = vec![first];
        // Absorb whatever is already queued before starting the clock.
        while let Ok(event) = self.events.try_recv() {
            pending.push(event);
        }

        let deadline = Instant::now() + self.latency;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok((pending, false));
            }
            select! {
                recv(self.events) -> msg => {
                    let Ok(event) = msg else {
                        return Err(StreamError::Disconnected);
                    };
                    pending.push(event);
                }
                recv(self.signal.wake_receiver()) -> _ => {
                    return Ok((pending, true));
                }
                recv(after(remaining)) -> _ => {
                    return Ok((pending, false));
                }
            }
        }
    }

    fn dispatch(&self, driver: &mut dyn LoopDriver, pending: Vec<RawEvent>) -> Result<()> {
        let _span = debug_span!("dispatch", events = pending.len()).entered();
        driver.dispatch(pending)
    }

    /// Drain and act on the pending action. Shutdown first flushes raw
    /// events that already arrived, so a stop never swallows a batch
    /// the backend delivered before it.
    fn handle_wake(&self, driver: &mut dyn LoopDriver) -> Result<Flow> {
        let action = self.signal.drain();
        let _span = debug_span!("action", ?action).entered();
        match action {
            Action::None => Ok(Flow::Continue),
            Action::Reschedule => {
                driver.rebuild();
                Ok(Flow::Continue)
            }
            Action::Shutdown => {
                let mut pending = Vec::new();
                while let Ok(event) = self.events.try_recv() {
                    pending.push(event);
                }
                if !pending.is_empty() {
                    self.dispatch(driver, pending)?;
                }
                Ok(Flow::Stop)
            }
        }
    }
}
