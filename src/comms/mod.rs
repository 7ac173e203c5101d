//! Delivery channels between the scheduler and waiting threads.
//!
//! Timers never queue wake-ups: the `slot` submodule provides a capacity-one channel
//! whose sends are non-blocking and dropped when the receiver is behind.
pub mod slot;
