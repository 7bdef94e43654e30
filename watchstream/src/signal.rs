//! Single-slot, priority-ordered cross-thread mailbox for the run loop.

use std::sync::Mutex;
use std::sync::PoisonError;

use crossbeam_channel::{Receiver, Sender, bounded};

/// Pending request for the thread hosting the run loop.
///
/// At most one action is remembered at a time. Variant order doubles as
/// priority: a raise never replaces a higher-priority pending action, so
/// `Shutdown` can coalesce over `Reschedule` but not the reverse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    /// Nothing requested.
    #[default]
    None,

    /// Rebuild the native watch from the current path set.
    Reschedule,

    /// Exit the run loop.
    Shutdown,
}

/// The wakeup primitive shared by control threads and the loop thread.
///
/// Control threads `raise` an action; the loop thread blocks on
/// [`ActionSignal::wake_receiver`] and `drain`s the slot when woken. The
/// wake channel has capacity one, so any number of raises between drains
/// collapse into a single wakeup carrying the highest-priority action.
#[derive(Debug)]
pub struct ActionSignal {
    slot: Mutex<Action>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl ActionSignal {
    /// Create a signal with an empty slot.
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            slot: Mutex::new(Action::None),
            wake_tx,
            wake_rx,
        }
    }

    /// Record `action` unless the slot already holds one of equal or
    /// higher priority, then nudge the loop thread. Returns whether the
    /// slot was updated.
    pub fn raise(&self, action: Action) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if action <= *slot {
            return false;
        }
        *slot = action;
        drop(slot);
        // A full buffer means a wakeup is already queued.
        let _ = self.wake_tx.try_send(());
        true
    }

    /// Take the pending action, leaving `None`. A drain racing a raise
    /// either observes the raised action here or is woken once more by
    /// the raise's queued token; spurious wakeups drain `None`.
    pub fn drain(&self) -> Action {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *slot)
    }

    /// Discard queued wake tokens and take whatever action is pending.
    ///
    /// Called once when a loop session starts so leftovers from a
    /// previous session cannot fire inside the new one. Tokens go first:
    /// a raise landing mid-reset then leaves at worst a spurious token,
    /// never a stored action without one.
    pub fn reset(&self) -> Action {
        while self.wake_rx.try_recv().is_ok() {}
        self.drain()
    }

    /// Channel the loop thread blocks on between batches.
    pub(crate) fn wake_receiver(&self) -> &Receiver<()> {
        &self.wake_rx
    }
}

impl Default for ActionSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_raise_stores_action_and_wakes() {
        let signal = ActionSignal::new();

        assert!(signal.raise(Action::Reschedule));
        assert!(signal.wake_receiver().try_recv().is_ok());
        assert_eq!(signal.drain(), Action::Reschedule);
        assert_eq!(signal.drain(), Action::None);
    }

    #[test]
    fn test_shutdown_overrides_pending_reschedule() {
        let signal = ActionSignal::new();

        assert!(signal.raise(Action::Reschedule));
        assert!(signal.raise(Action::Shutdown));
        assert_eq!(signal.drain(), Action::Shutdown);
    }

    #[test]
    fn test_reschedule_cannot_downgrade_shutdown() {
        let signal = ActionSignal::new();

        assert!(signal.raise(Action::Shutdown));
        assert!(!signal.raise(Action::Reschedule));
        assert_eq!(signal.drain(), Action::Shutdown);
    }

    #[test]
    fn test_duplicate_raise_is_absorbed() {
        let signal = ActionSignal::new();

        assert!(signal.raise(Action::Reschedule));
        assert!(!signal.raise(Action::Reschedule));
        assert_eq!(signal.drain(), Action::Reschedule);
    }

    #[test]
    fn test_raises_collapse_into_one_wakeup() {
        let signal = ActionSignal::new();

        signal.raise(Action::Reschedule);
        signal.raise(Action::Shutdown);

        assert!(signal.wake_receiver().try_recv().is_ok());
        assert!(signal.wake_receiver().try_recv().is_err());
        assert_eq!(signal.drain(), Action::Shutdown);
    }

    #[test]
    fn test_reset_discards_tokens_and_returns_pending_action() {
        let signal = ActionSignal::new();

        signal.raise(Action::Reschedule);
        assert_eq!(signal.reset(), Action::Reschedule);
        assert!(signal.wake_receiver().try_recv().is_err());
        assert_eq!(signal.drain(), Action::None);
    }

    #[test]
    fn test_reset_reports_pending_shutdown() {
        let signal = ActionSignal::new();

        signal.raise(Action::Shutdown);
        assert_eq!(signal.reset(), Action::Shutdown);
    }
}
