//! The firing pass shared by both clock backends.
use std::{sync::Arc, thread};

use tracing::{error, trace};

use super::{registry::Registry, Callback, Delivery, Entry, Ticket};
use crate::time::Instant;

pub(crate) const CALLBACK_THREAD: &str = "sandglass-callback";

/// Matures every entry due at `target`, in deadline order, and returns how many were
/// released. The registry lock is only held while popping, never while releasing.
/// Firings superseded by a concurrent `stop` or `reset` are skipped.
pub(crate) fn advance(registry: &Registry, target: Instant) -> usize {
    let mut released = 0;
    loop {
        let due = registry.pop_due(target);
        if due.is_empty() {
            return released;
        }
        for firing in due {
            let entry = &firing.entry;
            trace!(entry = entry.id, deadline = ?firing.deadline, ?target, "releasing wait entry");
            if release(entry, target, firing.ticket) {
                released += 1;
            } else {
                trace!(entry = entry.id, "firing superseded before release");
            }
        }
    }
}

/// Delivers `at` to the entry's target if `ticket` is still current. Channel offers
/// never block; callbacks get a thread of their own.
pub(crate) fn release(entry: &Entry, at: Instant, ticket: Ticket) -> bool {
    entry.redeem(ticket, || match &entry.delivery {
        Delivery::Channel(slot) => {
            if !slot.offer(at) {
                trace!(entry = entry.id, "receiver behind, dropping fire instant");
            }
        }
        Delivery::Callback(callback) => spawn_callback(entry.id, Arc::clone(callback)),
    })
}

fn spawn_callback(id: u64, callback: Callback) {
    let spawned = thread::Builder::new()
        .name(CALLBACK_THREAD.to_string())
        .spawn(move || callback());
    if let Err(err) = spawned {
        error!(entry = id, "failed to spawn timer callback thread: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{comms::slot::Slot, time::Duration};
    use std::sync::mpsc;

    fn at(nanos: i64) -> Instant {
        Instant::from_unix_nanos(nanos)
    }

    #[test]
    fn channel_receives_target_not_deadline() {
        let registry = Registry::new();
        let slot = Arc::new(Slot::new());
        let entry = registry.entry(Delivery::Channel(Arc::clone(&slot)), None);
        registry.insert(&entry, at(10), || at(0));
        assert_eq!(advance(&registry, at(25)), 1);
        assert_eq!(slot.take(), Some(at(25)));
    }

    #[test]
    fn full_slot_drops_ticks() {
        let registry = Registry::new();
        let slot = Arc::new(Slot::new());
        let ticker = registry.entry(
            Delivery::Channel(Arc::clone(&slot)),
            Some(Duration::from_nanos(10)),
        );
        registry.insert(&ticker, at(10), || at(0));
        advance(&registry, at(10));
        advance(&registry, at(20));
        advance(&registry, at(30));
        assert_eq!(slot.take(), Some(at(10)));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn callbacks_run_off_the_advancing_thread() {
        let registry = Registry::new();
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        let callback: Callback = Arc::new(move || {
            let name = thread::current().name().map(str::to_string);
            let _ = tx.lock().send(name);
        });
        let entry = registry.entry(Delivery::Callback(callback), None);
        registry.insert(&entry, at(1), || at(0));
        assert_eq!(advance(&registry, at(1)), 1);
        let name = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(CALLBACK_THREAD));
    }

    #[test]
    fn removal_racing_a_pass_delivers_at_most_once() {
        for _ in 0..200 {
            let registry = Arc::new(Registry::new());
            let slot = Arc::new(Slot::new());
            let entry = registry.entry(Delivery::Channel(Arc::clone(&slot)), None);
            registry.insert(&entry, at(10), || at(0));

            let pass = {
                let registry = Arc::clone(&registry);
                thread::spawn(move || advance(&registry, at(10)))
            };
            let removed = registry.remove(&entry);
            // a firing claimed before the removal has landed by now
            let delivered = slot.is_full();
            let released = pass.join().unwrap();

            assert_ne!(removed, delivered);
            assert_eq!(released, usize::from(delivered));
            assert_eq!(slot.is_full(), delivered);
        }
    }
}
