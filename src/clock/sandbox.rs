use std::sync::atomic::{AtomicI64, Ordering};

use tracing::debug;

use super::{Backend, Mode};
use crate::{
    scheduling::{engine, registry::Registry},
    time::{Duration, Instant},
    SandError,
};

/// Virtual time. The current instant is an atomic cell that only `advance` writes.
#[derive(Debug)]
pub(crate) struct SandboxBackend {
    current: AtomicI64,
    registry: Registry,
}

impl SandboxBackend {
    pub(crate) fn new(start: Instant) -> Self {
        Self {
            current: AtomicI64::new(start.as_unix_nanos()),
            registry: Registry::new(),
        }
    }
}

impl Backend for SandboxBackend {
    fn mode(&self) -> Mode {
        Mode::Sandbox
    }

    fn now(&self) -> Instant {
        Instant::from_unix_nanos(self.current.load(Ordering::Acquire))
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn advance(&self, delta: Duration) -> Result<(), SandError> {
        if delta.is_negative() {
            return Err(SandError::NegativeAdvance(delta));
        }
        // the clock moves before the firing pass, so a waiter arming concurrently either
        // lands in this pass or sees the new time and fires on the spot
        let previous = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |nanos| {
                Some(nanos.saturating_add(delta.as_nanos()))
            })
            .unwrap_or_else(|nanos| nanos);
        let target = Instant::from_unix_nanos(previous).saturating_add(delta);
        let released = engine::advance(&self.registry, target);
        debug!(%delta, ?target, released, "advanced sandbox clock");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_saturates_at_max() {
        let backend = SandboxBackend::new(Instant::MAX - Duration::from_secs(1));
        backend.advance(Duration::MAX).unwrap();
        assert_eq!(backend.now(), Instant::MAX);
        backend.advance(Duration::from_secs(1)).unwrap();
        assert_eq!(backend.now(), Instant::MAX);
    }

    #[test]
    fn negative_advance_leaves_clock_alone() {
        let start = Instant::from_unix_nanos(42);
        let backend = SandboxBackend::new(start);
        assert!(backend.advance(Duration::from_secs(-1)).is_err());
        assert_eq!(backend.now(), start);
    }
}
