//! Single-slot delivery channel.
//!
//! Every timer and ticker owns one `Slot`. Offers never block: if the slot already
//! holds an undelivered value the new one is dropped, so a slow receiver sees at most
//! one pending fire instant and never a backlog.
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::SandError;

/// A capacity-one queue with drop-if-full insertion.
#[derive(Debug)]
pub struct Slot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::new()
    }
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Stores `value` if the slot is empty. Returns `false` (and drops `value`) if an
    /// earlier value is still waiting to be received.
    pub fn offer(&self, value: T) -> bool {
        let mut slot = self.value.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        drop(slot);
        self.ready.notify_all();
        true
    }

    /// Takes the pending value without blocking.
    pub fn take(&self) -> Option<T> {
        self.value.lock().take()
    }

    /// Blocks until a value is available and takes it.
    pub fn wait(&self) -> T {
        let mut slot = self.value.lock();
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            self.ready.wait(&mut slot);
        }
    }

    /// Blocks for at most `timeout` of real time.
    pub fn wait_for(&self, timeout: std::time::Duration) -> Option<T> {
        let deadline = std::time::Instant::now().checked_add(timeout);
        let mut slot = self.value.lock();
        loop {
            if let Some(value) = slot.take() {
                return Some(value);
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut slot, deadline).timed_out() {
                        return slot.take();
                    }
                }
                None => self.ready.wait(&mut slot),
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.value.lock().is_some()
    }
}

/// Receiving end of a timer's delivery slot. Cloning shares the same slot.
#[derive(Debug)]
pub struct Receiver<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Receiver<T> {
    pub(crate) fn new(slot: Arc<Slot<T>>) -> Self {
        Self { slot }
    }

    /// Blocks until the value is delivered.
    pub fn recv(&self) -> T {
        self.slot.wait()
    }

    /// Reads the pending value, if any.
    pub fn try_recv(&self) -> Result<T, SandError> {
        self.slot.take().ok_or(SandError::NoPendingUpdates)
    }

    /// Blocks for at most `timeout` of real time, regardless of the clock mode.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Result<T, SandError> {
        self.slot
            .wait_for(timeout)
            .ok_or(SandError::NoPendingUpdates)
    }

    /// Whether a value is waiting to be received.
    pub fn is_ready(&self) -> bool {
        self.slot.is_full()
    }
}
