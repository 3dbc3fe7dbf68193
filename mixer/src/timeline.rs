//! Pending fade completions, delivered on the control timeline.
//!
//! Ramps run on the rendering side; what happens when one finishes is queued
//! here and only executed by [`Channels::update`](crate::Channels::update).

use std::time::Duration;

use parking_lot::Mutex;

/// Completion callback for a fade.
pub type FadeCallback = Box<dyn FnOnce() + Send>;

/// Handle of a scheduled completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerId(u64);

struct Pending {
    id: TimerId,
    due: Duration,
    callback: FadeCallback,
}

#[derive(Default)]
struct TimelineState {
    next_id: u64,
    pending: Vec<Pending>,
}

#[derive(Default)]
pub(crate) struct Timeline {
    state: Mutex<TimelineState>,
}

impl Timeline {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserves an id before the callback is built, so the callback can
    /// refer to its own timer.
    pub(crate) fn reserve(&self) -> TimerId {
        let mut state = self.state.lock();
        let id = TimerId(state.next_id);
        state.next_id += 1;
        id
    }

    pub(crate) fn schedule(&self, id: TimerId, due: Duration, callback: FadeCallback) {
        self.state.lock().pending.push(Pending { id, due, callback });
    }

    /// Drops a pending completion without running it.
    pub(crate) fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        match state.pending.iter().position(|p| p.id == id) {
            Some(pos) => {
                state.pending.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the earliest completion due at `now`.
    ///
    /// Earlier due times first; ties in scheduling order.
    pub(crate) fn pop_due(&self, now: Duration) -> Option<FadeCallback> {
        let mut state = self.state.lock();
        let pos = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= now)
            .min_by_key(|(_, p)| (p.due, p.id.0))
            .map(|(i, _)| i)?;
        Some(state.pending.remove(pos).callback)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().pending.len()
    }
}
