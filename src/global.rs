//! Process-wide mode switch and free-function time surface.
//!
//! Prefer passing a [`Clock`] to the code that needs time. This module exists for the
//! outermost layer of an application, where threading a clock through is impractical:
//! every function here forwards to the system clock or to one shared sandbox clock,
//! depending on the current [`Mode`].
//!
//! The mode defaults to [`Mode::System`]. Switch it only from test harnesses, and only
//! while no timers from the other mode are outstanding.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    OnceLock,
};

use tracing::debug;

use crate::{
    clock::{Clock, Mode, Ticker, Timer},
    comms::slot::Receiver,
    time::{Duration, Instant},
    SandError,
};

pub use crate::clock::real_sleep;

static SANDBOX: AtomicBool = AtomicBool::new(false);
static SYSTEM_CLOCK: OnceLock<Clock> = OnceLock::new();
static SANDBOX_CLOCK: OnceLock<Clock> = OnceLock::new();

pub fn set_mode(mode: Mode) {
    debug!(%mode, "switching global clock mode");
    SANDBOX.store(mode == Mode::Sandbox, Ordering::SeqCst);
}

/// `true` selects sandbox time, `false` the real clock.
pub fn set_sandbox(sandbox: bool) {
    set_mode(if sandbox { Mode::Sandbox } else { Mode::System });
}

pub fn mode() -> Mode {
    if SANDBOX.load(Ordering::SeqCst) {
        Mode::Sandbox
    } else {
        Mode::System
    }
}

/// The clock for the current mode.
///
/// The system clock is started on first use; that fails with [`SandError::Io`] if its
/// timer driver thread cannot be spawned, and the next call tries again.
pub fn clock() -> Result<&'static Clock, SandError> {
    match mode() {
        Mode::System => system_clock(),
        Mode::Sandbox => Ok(SANDBOX_CLOCK.get_or_init(Clock::sandbox)),
    }
}

fn system_clock() -> Result<&'static Clock, SandError> {
    if let Some(clock) = SYSTEM_CLOCK.get() {
        return Ok(clock);
    }
    let started = Clock::system()?;
    // a racing first caller may have won; its clock is kept and ours shuts down
    Ok(SYSTEM_CLOCK.get_or_init(|| started))
}

/// Current instant. In system mode this reads the real clock without starting the
/// timer driver.
pub fn now() -> Instant {
    match mode() {
        Mode::System => Instant::real_now(),
        Mode::Sandbox => SANDBOX_CLOCK.get_or_init(Clock::sandbox).now(),
    }
}

/// Advances the shared sandbox clock. Fails outside sandbox mode.
pub fn advance(delta: Duration) -> Result<(), SandError> {
    match mode() {
        Mode::System => Err(SandError::NotSandbox),
        Mode::Sandbox => SANDBOX_CLOCK.get_or_init(Clock::sandbox).advance(delta),
    }
}

/// Blocks for `d` of the current mode's time. System-mode sleeps do not need the
/// timer driver.
pub fn sleep(d: Duration) {
    match mode() {
        Mode::System => real_sleep(d),
        Mode::Sandbox => SANDBOX_CLOCK.get_or_init(Clock::sandbox).sleep(d),
    }
}

pub fn after(d: Duration) -> Result<Receiver<Instant>, SandError> {
    Ok(clock()?.after(d))
}

pub fn after_func<F>(d: Duration, f: F) -> Result<Timer, SandError>
where
    F: Fn() + Send + Sync + 'static,
{
    Ok(clock()?.after_func(d, f))
}

pub fn new_timer(d: Duration) -> Result<Timer, SandError> {
    Ok(clock()?.new_timer(d))
}

pub fn new_ticker(period: Duration) -> Result<Ticker, SandError> {
    clock()?.new_ticker(period)
}
