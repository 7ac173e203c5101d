//! Real-time backend.
//!
//! Reads come straight from the real clock and `sleep` is a real blocking sleep.
//! Timers and tickers share the sandbox machinery: a driver thread parks until the
//! earliest deadline and then runs the same firing pass with the real time as target.
use std::{sync::Arc, thread};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::{Backend, Mode};
use crate::{
    scheduling::{engine, registry::Registry},
    time::{Duration, Instant},
    SandError,
};

const DRIVER_THREAD: &str = "sandglass-timer";

/// Pauses the calling thread for `d` of real time, whatever the clock mode.
///
/// Meant for harness threads that need to let workers reach their wait before
/// calling `advance`; it never reads or moves virtual time.
pub fn real_sleep(d: Duration) {
    if d.is_positive() {
        thread::sleep(d.to_std());
    }
}

#[derive(Debug, Default)]
struct DriverState {
    dirty: bool,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Signal {
    state: Mutex<DriverState>,
    wakeup: Condvar,
}

#[derive(Debug)]
pub(crate) struct SystemBackend {
    registry: Arc<Registry>,
    signal: Arc<Signal>,
}

impl SystemBackend {
    pub(crate) fn new() -> Result<Self, SandError> {
        let registry = Arc::new(Registry::new());
        let signal = Arc::new(Signal::default());
        let (driver_registry, driver_signal) = (Arc::clone(&registry), Arc::clone(&signal));
        thread::Builder::new()
            .name(DRIVER_THREAD.to_string())
            .spawn(move || drive(&driver_registry, &driver_signal))?;
        Ok(Self { registry, signal })
    }
}

/// Driver loop: fire what is due, then park until the next deadline or until a new
/// entry is queued. Lock order is signal, then registry.
fn drive(registry: &Registry, signal: &Signal) {
    debug!("system timer driver started");
    loop {
        engine::advance(registry, Instant::real_now());
        let mut state = signal.state.lock();
        if state.shutdown {
            break;
        }
        if !state.dirty {
            match registry.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.since(Instant::real_now()).to_std();
                    if !wait.is_zero() {
                        signal.wakeup.wait_for(&mut state, wait);
                    }
                }
                None => signal.wakeup.wait(&mut state),
            }
        }
        state.dirty = false;
        if state.shutdown {
            break;
        }
    }
    debug!(abandoned = registry.len(), "system timer driver stopped");
}

impl Drop for SystemBackend {
    fn drop(&mut self) {
        self.signal.state.lock().shutdown = true;
        self.signal.wakeup.notify_one();
    }
}

impl Backend for SystemBackend {
    fn mode(&self) -> Mode {
        Mode::System
    }

    fn now(&self) -> Instant {
        Instant::real_now()
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn notify(&self) {
        self.signal.state.lock().dirty = true;
        self.signal.wakeup.notify_one();
    }

    fn sleep(&self, d: Duration) {
        real_sleep(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_sleep_ignores_non_positive() {
        let start = std::time::Instant::now();
        real_sleep(Duration::MIN);
        real_sleep(Duration::ZERO);
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn real_sleep_waits() {
        let start = Instant::real_now();
        real_sleep(Duration::from_millis(15));
        assert!(Instant::real_now() - start >= Duration::from_millis(15));
    }

    #[test]
    fn sleep_blocks_in_real_time() {
        let backend = SystemBackend::new().unwrap();
        let start = backend.now();
        backend.sleep(Duration::from_millis(10));
        assert!(backend.now() - start >= Duration::from_millis(10));
    }
}
