//! The clock provider and its two backends.
//!
//! A [`Clock`] is a cheap, cloneable handle that call sites take by value instead of
//! reaching for global time. [`Clock::system`] delegates to the real clock;
//! [`Clock::sandbox`] only moves when [`Clock::advance`] is called. Everything else,
//! sleeps, one-shot timers, callback timers and tickers, behaves identically on both.
use std::{fmt, sync::Arc};

use crate::{
    comms::slot::{Receiver, Slot},
    scheduling::{
        engine,
        registry::{Armed, Registry},
        Delivery, Entry,
    },
    time::{Duration, Instant},
    SandError,
};

mod sandbox;
mod system;
mod timer;

pub use system::real_sleep;
pub use timer::{Ticker, Timer};

use sandbox::SandboxBackend;
use system::SystemBackend;

/// Which backend a clock delegates to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Real time: the OS clock and real blocking sleeps.
    System,
    /// Virtual time, moved only by `advance`.
    Sandbox,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::System => write!(f, "system"),
            Mode::Sandbox => write!(f, "sandbox"),
        }
    }
}

/// The contract both backends share.
pub(crate) trait Backend: Send + Sync + 'static {
    fn mode(&self) -> Mode;

    fn now(&self) -> Instant;

    fn registry(&self) -> &Registry;

    /// Told after an entry is queued, in case its deadline is the new earliest.
    fn notify(&self) {}

    fn advance(&self, delta: Duration) -> Result<(), SandError> {
        let _ = delta;
        Err(SandError::NotSandbox)
    }

    fn sleep(&self, d: Duration) {
        let slot = Arc::new(Slot::new());
        let entry = self
            .registry()
            .entry(Delivery::Channel(Arc::clone(&slot)), None);
        self.arm(&entry, self.now().saturating_add(d));
        slot.wait();
    }

    /// Queues `entry` at `deadline`, releasing it on the spot if the deadline has
    /// already been reached.
    fn arm(&self, entry: &Arc<Entry>, deadline: Instant) {
        match self.registry().insert(entry, deadline, || self.now()) {
            Armed::Queued => self.notify(),
            Armed::Due(now, ticket) => {
                engine::release(entry, now, ticket);
            }
        }
    }
}

/// Injectable source of time and timers.
#[derive(Clone)]
pub struct Clock {
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("mode", &self.mode())
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Clock {
    /// A clock backed by the real system clock. Starts the timer driver thread.
    pub fn system() -> Result<Self, SandError> {
        Ok(Self {
            backend: Arc::new(SystemBackend::new()?),
        })
    }

    /// A virtual clock starting at the current real time.
    pub fn sandbox() -> Self {
        Self::sandbox_at(Instant::real_now())
    }

    /// A virtual clock starting at `start`.
    pub fn sandbox_at(start: Instant) -> Self {
        Self {
            backend: Arc::new(SandboxBackend::new(start)),
        }
    }

    pub fn mode(&self) -> Mode {
        self.backend.mode()
    }

    /// Current instant: real in system mode, virtual in sandbox mode. Never blocks.
    pub fn now(&self) -> Instant {
        self.backend.now()
    }

    /// Moves virtual time forward by `delta` and fires everything that matured, in
    /// deadline order.
    ///
    /// Fails with [`SandError::NotSandbox`] on a system clock and with
    /// [`SandError::NegativeAdvance`] for negative deltas. Concurrent calls from
    /// several controller threads are not ordered against each other; serialize them.
    pub fn advance(&self, delta: Duration) -> Result<(), SandError> {
        self.backend.advance(delta)
    }

    /// Advances exactly to the earliest pending deadline, if there is one.
    pub fn advance_to_next(&self) -> Result<Option<Instant>, SandError> {
        if self.mode() != Mode::Sandbox {
            return Err(SandError::NotSandbox);
        }
        let Some(next) = self.next_deadline() else {
            return Ok(None);
        };
        self.advance(next.since(self.now()).max(Duration::ZERO))?;
        Ok(Some(next))
    }

    /// Blocks the calling thread until `d` has elapsed on this clock.
    pub fn sleep(&self, d: Duration) {
        self.backend.sleep(d)
    }

    /// Returns a receiver that gets the fire instant once `d` has elapsed. A
    /// non-positive `d` delivers immediately.
    pub fn after(&self, d: Duration) -> Receiver<Instant> {
        self.new_timer(d).receiver().clone()
    }

    /// Runs `f` on its own thread once `d` has elapsed. The returned timer can stop or
    /// re-arm the callback; its receiver never gets a value.
    pub fn after_func<F>(&self, d: Duration, f: F) -> Timer
    where
        F: Fn() + Send + Sync + 'static,
    {
        let entry = self
            .backend
            .registry()
            .entry(Delivery::Callback(Arc::new(f)), None);
        let receiver = Receiver::new(Arc::new(Slot::new()));
        self.backend.arm(&entry, self.now().saturating_add(d));
        Timer::new(entry, Arc::clone(&self.backend), receiver)
    }

    /// A stoppable, resettable one-shot timer.
    pub fn new_timer(&self, d: Duration) -> Timer {
        let slot = Arc::new(Slot::new());
        let entry = self
            .backend
            .registry()
            .entry(Delivery::Channel(Arc::clone(&slot)), None);
        self.backend.arm(&entry, self.now().saturating_add(d));
        Timer::new(entry, Arc::clone(&self.backend), Receiver::new(slot))
    }

    /// A ticker delivering the current instant every `period`. Ticks are dropped, not
    /// queued, while the receiver is behind.
    pub fn new_ticker(&self, period: Duration) -> Result<Ticker, SandError> {
        if !period.is_positive() {
            return Err(SandError::NonPositiveInterval(period));
        }
        let slot = Arc::new(Slot::new());
        let entry = self
            .backend
            .registry()
            .entry(Delivery::Channel(Arc::clone(&slot)), Some(period));
        self.backend.arm(&entry, self.now().saturating_add(period));
        Ok(Ticker::new(entry, Arc::clone(&self.backend), Receiver::new(slot)))
    }

    /// Number of queued timers and tickers.
    pub fn pending(&self) -> usize {
        self.backend.registry().len()
    }

    /// Earliest queued deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.backend.registry().next_deadline()
    }
}
