//! Lock-protected priority collection of wait entries.
//!
//! Entries are keyed by `(deadline, sequence)`, so iteration order is ascending by
//! deadline and ties resolve in insertion order. Membership in the map is the
//! authoritative "still pending" flag: whichever of `remove` and `pop_due` takes an
//! entry out first wins, and the other observes it as gone.
//!
//! Releasing happens outside the lock, so `remove` and `reset` also supersede the
//! entry's outstanding tickets and wait for in-flight deliveries to settle before they
//! return (see [`Entry`]).
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use super::{next_period_deadline, Delivery, Entry, Liveness, Ticket};
use crate::time::{Duration, Instant};

type Key = (Instant, u64);

/// Outcome of arming an entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Armed {
    /// Queued; the backend may need to learn about an earlier deadline.
    Queued,
    /// The deadline had already been reached at this instant; the caller releases the
    /// entry itself with the ticket.
    Due(Instant, Ticket),
}

/// One matured entry handed out by [`Registry::pop_due`].
#[derive(Debug)]
pub(crate) struct Firing {
    pub(crate) deadline: Instant,
    pub(crate) entry: Arc<Entry>,
    pub(crate) ticket: Ticket,
}

#[derive(Debug, Default)]
struct Queue {
    entries: BTreeMap<Key, Arc<Entry>>,
    keys: HashMap<u64, Key>,
    next_seq: u64,
}

impl Queue {
    fn link(&mut self, entry: &Arc<Entry>, deadline: Instant) {
        let key = (deadline, self.next_seq);
        self.next_seq += 1;
        self.entries.insert(key, Arc::clone(entry));
        self.keys.insert(entry.id, key);
        entry.set_liveness(Liveness::Pending);
    }

    fn unlink(&mut self, id: u64) -> bool {
        match self.keys.remove(&id) {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    /// Queues `entry` at `deadline`, or reports it due if `now` has already reached it.
    /// A periodic entry that is due is re-queued on its grid past `now`.
    fn arm(&mut self, entry: &Arc<Entry>, deadline: Instant, now: Instant) -> Armed {
        if deadline > now {
            self.link(entry, deadline);
            return Armed::Queued;
        }
        match entry.period() {
            Some(period) => {
                let next = next_period_deadline(deadline, period, now);
                if next > now {
                    self.link(entry, next);
                } else {
                    entry.set_liveness(Liveness::Fired);
                }
            }
            None => entry.set_liveness(Liveness::Fired),
        }
        Armed::Due(now, entry.ticket())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    queue: Mutex<Queue>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocates an unarmed entry owned by this registry.
    pub(crate) fn entry(&self, delivery: Delivery, period: Option<Duration>) -> Arc<Entry> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(Entry::new(id, delivery, period))
    }

    /// Arms `entry` at `deadline`. `now` is read while the lock is held, so an
    /// insertion can never slip in behind a firing pass that has already moved on.
    pub(crate) fn insert(
        &self,
        entry: &Arc<Entry>,
        deadline: Instant,
        now: impl FnOnce() -> Instant,
    ) -> Armed {
        let mut queue = self.queue.lock();
        let now = now();
        queue.arm(entry, deadline, now)
    }

    /// Removes `entry` if it is still queued. Returns whether it was.
    ///
    /// On `true`, nothing from this entry is delivered afterwards. On `false`, a
    /// firing already claimed by another pass has been delivered by the time this
    /// returns.
    pub(crate) fn remove(&self, entry: &Entry) -> bool {
        let removed = {
            let mut queue = self.queue.lock();
            let removed = queue.unlink(entry.id);
            if removed {
                entry.set_liveness(Liveness::Stopped);
                entry.supersede();
            }
            removed
        };
        entry.settle();
        removed
    }

    /// Removes and re-arms `entry` at `deadline` under a single lock acquisition.
    /// Returns whether the previous incarnation was still pending.
    ///
    /// Firings of the previous incarnation that were claimed but not yet delivered are
    /// discarded; values already sitting in the channel stay there.
    pub(crate) fn reset(
        &self,
        entry: &Arc<Entry>,
        deadline: Instant,
        period: Option<Duration>,
        now: impl FnOnce() -> Instant,
    ) -> (bool, Armed) {
        let (was_pending, armed) = {
            let mut queue = self.queue.lock();
            let was_pending = queue.unlink(entry.id);
            entry.supersede();
            entry.set_period(period);
            let now = now();
            (was_pending, queue.arm(entry, deadline, now))
        };
        entry.settle();
        (was_pending, armed)
    }

    /// Removes every entry with a deadline at or before `target`, in ascending
    /// `(deadline, sequence)` order. Periodic entries are re-queued at their next grid
    /// point after `target` before the lock is released.
    pub(crate) fn pop_due(&self, target: Instant) -> Vec<Firing> {
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        while let Some(first) = queue.entries.first_entry() {
            if first.key().0 > target {
                break;
            }
            let ((deadline, _), entry) = first.remove_entry();
            queue.keys.remove(&entry.id);
            match entry.period() {
                Some(period) => {
                    let next = next_period_deadline(deadline, period, target);
                    if next > target {
                        queue.link(&entry, next);
                    } else {
                        entry.set_liveness(Liveness::Fired);
                    }
                }
                None => entry.set_liveness(Liveness::Fired),
            }
            let ticket = entry.claim();
            due.push(Firing {
                deadline,
                entry,
                ticket,
            });
        }
        due
    }

    /// Earliest queued deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.queue
            .lock()
            .entries
            .first_key_value()
            .map(|(key, _)| key.0)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().entries.len()
    }
}
