//! # Timer table.
//!
//! Registry of one-shot and recurring timers keyed by compact id. Ids come
//! from a strictly monotonic counter so an id is never recycled within a
//! process lifetime, even after one-shot timers expire. The table is not
//! synchronized; the dispatcher wraps it in a short-held lock.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::TimerError;
use crate::events::{Args, Topic};

/// Compact timer identifier. Creators only ever return non-negative ids.
pub type TimerId = i16;

struct Timer {
    period: Duration,
    last_fired: Instant,
    recurring: bool,
    topic: Topic,
    args: Args,
}

/// A timer whose deadline has passed, ready to synthesize an event.
pub(crate) struct DueTimer {
    pub(crate) id: TimerId,
    pub(crate) topic: Topic,
    pub(crate) args: Args,
}

/// Registry of pending timers.
pub(crate) struct TimerTable {
    timers: BTreeMap<TimerId, Timer>,
    next_id: TimerId,
}

impl TimerTable {
    pub(crate) fn new() -> Self {
        Self {
            timers: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Registers a timer and returns its freshly assigned id.
    ///
    /// The argument bundle is stored as handed in; firing deep-copies it
    /// per synthesized event.
    pub(crate) fn insert(
        &mut self,
        period: Duration,
        topic: Topic,
        args: Args,
        recurring: bool,
    ) -> TimerId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.timers.insert(
            id,
            Timer {
                period,
                last_fired: Instant::now(),
                recurring,
                topic,
                args,
            },
        );
        id
    }

    /// Removes and destroys the timer with the given id.
    pub(crate) fn remove(&mut self, id: TimerId) -> Result<(), TimerError> {
        match self.timers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(TimerError::NoSuchTimer { id }),
        }
    }

    /// Returns a snapshot of the currently registered ids, ascending.
    pub(crate) fn ids(&self) -> Vec<TimerId> {
        self.timers.keys().copied().collect()
    }

    /// Removes every timer, returning how many were erased.
    pub(crate) fn clear(&mut self) -> usize {
        let n = self.timers.len();
        self.timers.clear();
        n
    }

    /// Collects every timer due at `now`, in id order.
    ///
    /// Recurring timers advance `last_fired` to `now` (drift is tolerated);
    /// one-shot timers are removed. Each due entry carries a deep copy of
    /// the stored argument bundle.
    pub(crate) fn collect_due(&mut self, now: Instant) -> Vec<DueTimer> {
        let mut due = Vec::new();
        let mut expired = Vec::new();

        for (id, timer) in self.timers.iter_mut() {
            if timer.last_fired + timer.period <= now {
                due.push(DueTimer {
                    id: *id,
                    topic: timer.topic,
                    args: timer.args.clone(),
                });
                if timer.recurring {
                    timer.last_fired = now;
                } else {
                    expired.push(*id);
                }
            }
        }
        for id in expired {
            self.timers.remove(&id);
        }
        due
    }
}
