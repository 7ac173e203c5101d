use std::{fmt, sync::Arc};

use super::Backend;
use crate::{
    comms::slot::Receiver,
    scheduling::{engine, registry::Armed, Entry, Liveness},
    time::{Duration, Instant},
    SandError,
};

/// Handle to a one-shot timer, from [`Clock::new_timer`](super::Clock::new_timer) or
/// [`Clock::after_func`](super::Clock::after_func).
///
/// Dropping the handle does not stop the timer.
pub struct Timer {
    entry: Arc<Entry>,
    backend: Arc<dyn Backend>,
    receiver: Receiver<Instant>,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.entry.id)
            .field("status", &self.status())
            .finish()
    }
}

impl Timer {
    pub(crate) fn new(
        entry: Arc<Entry>,
        backend: Arc<dyn Backend>,
        receiver: Receiver<Instant>,
    ) -> Self {
        Self {
            entry,
            backend,
            receiver,
        }
    }

    /// Channel that receives the fire instant. Callback timers never send on it.
    pub fn receiver(&self) -> &Receiver<Instant> {
        &self.receiver
    }

    /// Cancels the timer. Returns `true` if it was still pending, `false` if it had
    /// already fired or been stopped. After a `true` return the timer never fires; after
    /// `false`, a firing that was under way has been delivered.
    pub fn stop(&self) -> bool {
        self.backend.registry().remove(&self.entry)
    }

    /// Re-arms the timer to fire `d` from now, returning whether the previous deadline
    /// was still pending.
    ///
    /// A firing of the previous deadline that has not landed yet is discarded. A value
    /// delivered before the reset and not yet received stays in the channel; drain the
    /// receiver after the reset if a stale wake-up would be a problem.
    pub fn reset(&self, d: Duration) -> bool {
        let deadline = self.backend.now().saturating_add(d);
        let (was_pending, armed) =
            self.backend
                .registry()
                .reset(&self.entry, deadline, None, || self.backend.now());
        match armed {
            Armed::Queued => self.backend.notify(),
            Armed::Due(now, ticket) => {
                engine::release(&self.entry, now, ticket);
            }
        }
        was_pending
    }

    pub fn status(&self) -> Liveness {
        self.entry.liveness()
    }
}

/// Handle to a periodic ticker from [`Clock::new_ticker`](super::Clock::new_ticker).
///
/// Dropping the handle stops the ticker.
pub struct Ticker {
    entry: Arc<Entry>,
    backend: Arc<dyn Backend>,
    receiver: Receiver<Instant>,
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker")
            .field("id", &self.entry.id)
            .field("period", &self.entry.period())
            .field("status", &self.entry.liveness())
            .finish()
    }
}

impl Ticker {
    pub(crate) fn new(
        entry: Arc<Entry>,
        backend: Arc<dyn Backend>,
        receiver: Receiver<Instant>,
    ) -> Self {
        Self {
            entry,
            backend,
            receiver,
        }
    }

    pub fn receiver(&self) -> &Receiver<Instant> {
        &self.receiver
    }

    /// Stops further ticks. A tick already sitting in the channel can still be received,
    /// but none is delivered after this returns.
    pub fn stop(&self) {
        self.backend.registry().remove(&self.entry);
    }

    /// Changes the period; the next tick is due `period` from now.
    pub fn reset(&self, period: Duration) -> Result<(), SandError> {
        if !period.is_positive() {
            return Err(SandError::NonPositiveInterval(period));
        }
        let deadline = self.backend.now().saturating_add(period);
        let (_, armed) = self.backend.registry().reset(
            &self.entry,
            deadline,
            Some(period),
            || self.backend.now(),
        );
        match armed {
            Armed::Queued => self.backend.notify(),
            Armed::Due(now, ticket) => {
                engine::release(&self.entry, now, ticket);
            }
        }
        Ok(())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use crate::{Clock, Duration, Instant, SandError};
    use std::thread;

    const DELTA: Duration = Duration::from_millis(100);

    fn sandbox() -> Clock {
        Clock::sandbox_at(Instant::from_unix_nanos(0))
    }

    #[test]
    fn ticks_once_per_period() {
        let clock = sandbox();
        let ticker = clock.new_ticker(DELTA).unwrap();
        let t0 = clock.now();
        for i in 1..=10 {
            clock.advance(DELTA).unwrap();
            assert_eq!(ticker.receiver().try_recv().unwrap(), t0 + DELTA * i);
            assert!(ticker.receiver().try_recv().is_err());
        }
        assert_eq!(clock.now() - t0, DELTA * 10);

        ticker.stop();
        clock.advance(DELTA * 2).unwrap();
        assert!(ticker.receiver().try_recv().is_err());
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn ticker_fed_by_controller_thread() {
        let clock = sandbox();
        let ticker = clock.new_ticker(DELTA).unwrap();
        let t0 = clock.now();
        let controller = clock.clone();
        let rx = ticker.receiver().clone();
        let driver = thread::spawn(move || {
            for _ in 0..10 {
                // let the receiver drain before the next tick is offered
                while rx.is_ready() {
                    thread::yield_now();
                }
                controller.advance(DELTA).unwrap();
            }
        });
        for _ in 0..10 {
            ticker.receiver().recv();
        }
        driver.join().unwrap();
        ticker.stop();
        assert_eq!(clock.now() - t0, DELTA * 10);
    }

    #[test]
    fn catch_up_ticks_collapse() {
        let clock = sandbox();
        let ticker = clock.new_ticker(DELTA).unwrap();
        clock.advance(DELTA * 5 + DELTA / 2).unwrap();
        assert!(ticker.receiver().try_recv().is_ok());
        assert!(ticker.receiver().try_recv().is_err());
        assert_eq!(clock.next_deadline(), Some(clock.now() + DELTA / 2));
    }

    #[test]
    fn undelivered_tick_is_not_queued() {
        let clock = sandbox();
        let ticker = clock.new_ticker(DELTA).unwrap();
        let t0 = clock.now();
        clock.advance(DELTA).unwrap();
        clock.advance(DELTA).unwrap();
        clock.advance(DELTA).unwrap();
        assert_eq!(ticker.receiver().try_recv().unwrap(), t0 + DELTA);
        assert!(ticker.receiver().try_recv().is_err());
    }

    #[test]
    fn tick_before_stop_stays_readable() {
        let clock = sandbox();
        let ticker = clock.new_ticker(DELTA).unwrap();
        clock.advance(DELTA).unwrap();
        ticker.stop();
        clock.advance(DELTA).unwrap();
        assert!(ticker.receiver().try_recv().is_ok());
        assert!(ticker.receiver().try_recv().is_err());
    }

    #[test]
    fn non_positive_period_is_rejected() {
        let clock = sandbox();
        assert_eq!(
            clock.new_ticker(Duration::ZERO).unwrap_err(),
            SandError::NonPositiveInterval(Duration::ZERO)
        );
        let ticker = clock.new_ticker(DELTA).unwrap();
        assert!(ticker.reset(Duration::from_secs(-1)).is_err());
    }

    #[test]
    fn reset_changes_period() {
        let clock = sandbox();
        let ticker = clock.new_ticker(DELTA).unwrap();
        clock.advance(DELTA / 2).unwrap();
        ticker.reset(DELTA * 2).unwrap();
        clock.advance(DELTA).unwrap();
        assert!(ticker.receiver().try_recv().is_err());
        clock.advance(DELTA).unwrap();
        assert!(ticker.receiver().try_recv().is_ok());
        assert_eq!(clock.next_deadline(), Some(clock.now() + DELTA * 2));
    }

    #[test]
    fn dropping_ticker_unregisters() {
        let clock = sandbox();
        let rx = {
            let ticker = clock.new_ticker(DELTA).unwrap();
            assert_eq!(clock.pending(), 1);
            ticker.receiver().clone()
        };
        assert_eq!(clock.pending(), 0);
        clock.advance(DELTA).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn teardown_repeats_cleanly() {
        let clock = sandbox();
        for _ in 0..3 {
            let ticker = clock.new_ticker(DELTA).unwrap();
            let controller = clock.clone();
            let driver = thread::spawn(move || controller.advance(DELTA));
            ticker.receiver().recv();
            ticker.stop();
            driver.join().unwrap().unwrap();
        }
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn system_ticker_ticks() {
        let clock = Clock::system().unwrap();
        let delta = Duration::from_millis(10);
        let ticker = clock.new_ticker(delta).unwrap();
        let t0 = clock.now();
        for _ in 0..5 {
            ticker.receiver().recv();
        }
        ticker.stop();
        assert!(clock.now() - t0 >= delta * 5 - delta / 5);
        // a tick delivered before stop returned may still be buffered
        let _ = ticker.receiver().try_recv();
        clock.sleep(delta * 3);
        assert!(ticker.receiver().try_recv().is_err());
    }

}
