//! Wait entries, the registry that orders them, and the engine that matures them.
//!
//! Both clock backends share this machinery. The sandbox clock runs the engine from
//! `advance`; the system clock runs it from a driver thread against the real clock.
use std::{
    fmt,
    sync::{
        atomic::{AtomicI64, AtomicU8, Ordering},
        Arc,
    },
};

use parking_lot::{Condvar, Mutex};

use crate::{comms::slot::Slot, time::Duration, time::Instant};

pub(crate) mod engine;
pub(crate) mod registry;

/// Liveness of a timer's wait entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// Queued in the registry, waiting for its deadline.
    Pending,
    /// Released by a firing pass (or immediately, for a deadline already reached).
    Fired,
    /// Removed by `stop`; it will never fire.
    Stopped,
}

impl Liveness {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Liveness::Pending,
            1 => Liveness::Fired,
            _ => Liveness::Stopped,
        }
    }
}

/// Callback run on its own thread when a callback timer matures.
pub(crate) type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

/// How a matured entry is released.
pub(crate) enum Delivery {
    /// Offer the fire instant to a single-slot channel.
    Channel(Arc<Slot<Instant>>),
    /// Spawn the callback.
    Callback(Callback),
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Channel(_) => write!(f, "Channel"),
            Delivery::Callback(_) => write!(f, "Callback"),
        }
    }
}

/// Permission to deliver one firing of an entry, valid while the entry's generation
/// is unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Ticket {
    generation: u64,
    claimed: bool,
}

#[derive(Debug, Default)]
struct Gate {
    generation: u64,
    in_flight: usize,
}

/// One pending wake-up.
///
/// The deadline and sequence number live in the registry's key; `period` and
/// `liveness` are only written while the registry lock is held, and read lock-free.
///
/// The gate serializes delivery against cancellation: a firing pass claims a ticket
/// under the registry lock and delivers under the gate, while `stop`/`reset` bump the
/// generation and wait for claimed tickets to settle. Once they return, no delivery
/// from a cancelled incarnation can land.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) id: u64,
    pub(crate) delivery: Delivery,
    period: AtomicI64,
    liveness: AtomicU8,
    gate: Mutex<Gate>,
    settled: Condvar,
}

impl Entry {
    pub(crate) fn new(id: u64, delivery: Delivery, period: Option<Duration>) -> Self {
        Self {
            id,
            delivery,
            period: AtomicI64::new(period.map_or(0, Duration::as_nanos)),
            liveness: AtomicU8::new(Liveness::Pending as u8),
            gate: Mutex::new(Gate::default()),
            settled: Condvar::new(),
        }
    }

    /// Interval of a periodic entry, `None` for one-shots.
    pub(crate) fn period(&self) -> Option<Duration> {
        match self.period.load(Ordering::Acquire) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    pub(crate) fn set_period(&self, period: Option<Duration>) {
        self.period
            .store(period.map_or(0, Duration::as_nanos), Ordering::Release);
    }

    pub(crate) fn liveness(&self) -> Liveness {
        Liveness::from_u8(self.liveness.load(Ordering::Acquire))
    }

    pub(crate) fn set_liveness(&self, liveness: Liveness) {
        self.liveness.store(liveness as u8, Ordering::Release);
    }

    /// Ticket for a firing handed to another thread; cancellation waits for it.
    pub(crate) fn claim(&self) -> Ticket {
        let mut gate = self.gate.lock();
        gate.in_flight += 1;
        Ticket {
            generation: gate.generation,
            claimed: true,
        }
    }

    /// Ticket for a firing delivered by the thread that armed the entry.
    pub(crate) fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.gate.lock().generation,
            claimed: false,
        }
    }

    /// Invalidates every ticket issued so far.
    pub(crate) fn supersede(&self) {
        self.gate.lock().generation += 1;
    }

    /// Blocks until no claimed ticket is outstanding.
    pub(crate) fn settle(&self) {
        let mut gate = self.gate.lock();
        while gate.in_flight > 0 {
            self.settled.wait(&mut gate);
        }
    }

    /// Runs `deliver` if `ticket` is still current. Returns whether it ran.
    pub(crate) fn redeem(&self, ticket: Ticket, deliver: impl FnOnce()) -> bool {
        let mut gate = self.gate.lock();
        let current = gate.generation == ticket.generation;
        if current {
            deliver();
        }
        if ticket.claimed {
            gate.in_flight -= 1;
            if gate.in_flight == 0 {
                self.settled.notify_all();
            }
        }
        current
    }
}

/// Next deadline of a periodic entry that matured at `deadline`: the first point of
/// the grid `deadline + k * period` strictly after `target`. Catch-up ticks collapse
/// into this single step. Saturates at `Instant::MAX`.
pub(crate) fn next_period_deadline(
    deadline: Instant,
    period: Duration,
    target: Instant,
) -> Instant {
    debug_assert!(period.is_positive());
    let behind = i128::from(target.as_unix_nanos()) - i128::from(deadline.as_unix_nanos());
    let period = i128::from(period.as_nanos());
    let steps = behind.max(0) / period + 1;
    let next = i128::from(deadline.as_unix_nanos()) + steps * period;
    Instant::from_unix_nanos(i64::try_from(next).unwrap_or(i64::MAX))
}
