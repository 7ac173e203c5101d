//! Deterministic virtual-time scheduling.
//!
//! `sandglass` provides a [`Clock`] with two interchangeable backends: the real system
//! clock, and a sandbox clock whose time only moves when the harness calls
//! [`Clock::advance`]. Both expose the same sleep, one-shot timer, callback timer and
//! ticker surface, so code under test can take a `Clock` and run unchanged in production.
//!
//! The [`global`] module keeps a process-wide mode switch for call sites that cannot
//! have a clock injected.
use thiserror::Error;

pub mod clock;
pub mod comms;
pub mod global;
pub mod scheduling;
pub mod time;

pub use clock::{real_sleep, Clock, Mode, Ticker, Timer};
pub use comms::slot::Receiver;
pub use scheduling::Liveness;
pub use time::{Duration, Instant};

/// A failed timer or callback thread spawn.
///
/// Two errors are equal when their [`std::io::ErrorKind`] matches, which keeps
/// [`SandError`] comparable in assertions.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct IoError(#[from] std::io::Error);

impl IoError {
    pub fn kind(&self) -> std::io::ErrorKind {
        self.0.kind()
    }
}

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for IoError {}

/// Error type for all clock operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SandError {
    #[error("Clock is not in sandbox mode, real time cannot be advanced")]
    NotSandbox,
    #[error("Cannot advance by a negative duration ({0}), time travel!")]
    NegativeAdvance(Duration),
    #[error("Periodic interval must be positive, got {0}")]
    NonPositiveInterval(Duration),
    #[error("Nothing to read, no pending updates")]
    NoPendingUpdates,
    #[error("Failed to start a clock thread: {err}")]
    Io {
        #[from]
        err: IoError,
    },
}

impl From<std::io::Error> for SandError {
    fn from(err: std::io::Error) -> Self {
        SandError::Io {
            err: IoError::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as StdIoError, ErrorKind};

    #[test]
    fn io_errors_compare_by_kind() {
        let spawn = SandError::from(StdIoError::new(ErrorKind::WouldBlock, "no threads"));
        let other = SandError::from(StdIoError::new(ErrorKind::WouldBlock, "limit hit"));
        assert_eq!(spawn, other);
        assert_ne!(spawn, SandError::from(StdIoError::from(ErrorKind::OutOfMemory)));
        assert_ne!(spawn, SandError::NotSandbox);
        assert_eq!(spawn.to_string(), "Failed to start a clock thread: no threads");
    }
}
