//! Signed instants and durations with saturating arithmetic.
//!
//! Both types are plain nanosecond counts in an `i64`, which covers roughly ±292 years.
//! Arithmetic never wraps: deadlines computed from enormous (or enormously negative)
//! delays clamp to [`Instant::MAX`] / [`Instant::MIN`], so a timer armed with
//! [`Duration::MAX`] simply never matures within any feasible run.
use std::{
    fmt,
    ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign},
    sync::OnceLock,
    time::{SystemTime, UNIX_EPOCH},
};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A signed length of time, in nanoseconds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);
    pub const MAX: Duration = Duration(i64::MAX);
    pub const MIN: Duration = Duration(i64::MIN);

    pub const fn from_nanos(nanos: i64) -> Self {
        Duration(nanos)
    }

    pub const fn from_micros(micros: i64) -> Self {
        Duration(micros.saturating_mul(NANOS_PER_MICRO))
    }

    pub const fn from_millis(millis: i64) -> Self {
        Duration(millis.saturating_mul(NANOS_PER_MILLI))
    }

    pub const fn from_secs(secs: i64) -> Self {
        Duration(secs.saturating_mul(NANOS_PER_SEC))
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn saturating_add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }

    pub const fn saturating_sub(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }

    pub const fn saturating_mul(self, rhs: i64) -> Duration {
        Duration(self.0.saturating_mul(rhs))
    }

    /// Converts to an unsigned `std::time::Duration`; negative lengths become zero.
    pub fn to_std(self) -> std::time::Duration {
        if self.0 <= 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_nanos(self.0.unsigned_abs())
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Duration(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

impl Mul<i64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: i64) -> Duration {
        self.saturating_mul(rhs)
    }
}

/// Saturating division. Dividing by zero clamps to [`Duration::MAX`] or
/// [`Duration::MIN`] by the sign of the dividend, and `ZERO / 0` is `ZERO`.
impl Div<i64> for Duration {
    type Output = Duration;

    fn div(self, rhs: i64) -> Duration {
        if rhs == 0 {
            return match self.0.signum() {
                1 => Duration::MAX,
                -1 => Duration::MIN,
                _ => Duration::ZERO,
            };
        }
        Duration(self.0.saturating_div(rhs))
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        Duration(self.0.saturating_neg())
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = std::time::Duration::from_nanos(self.0.unsigned_abs());
        if self.0 < 0 {
            write!(f, "-{magnitude:?}")
        } else {
            write!(f, "{magnitude:?}")
        }
    }
}

/// An absolute point in time: nanoseconds since the Unix epoch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(i64);

impl Instant {
    pub const UNIX_EPOCH: Instant = Instant(0);
    pub const MAX: Instant = Instant(i64::MAX);
    pub const MIN: Instant = Instant(i64::MIN);

    pub const fn from_unix_nanos(nanos: i64) -> Self {
        Instant(nanos)
    }

    pub const fn as_unix_nanos(self) -> i64 {
        self.0
    }

    /// Reads the real clock.
    ///
    /// The wall-clock reading is taken once and then extended with the monotonic clock,
    /// so successive readings never go backwards even if the system time is stepped.
    pub fn real_now() -> Instant {
        static ANCHOR: OnceLock<(std::time::Instant, Instant)> = OnceLock::new();
        let (mono, wall) = ANCHOR.get_or_init(|| {
            let wall = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(Duration::from)
                .unwrap_or(Duration::ZERO);
            (std::time::Instant::now(), Instant::UNIX_EPOCH + wall)
        });
        *wall + Duration::from(mono.elapsed())
    }

    pub const fn saturating_add(self, d: Duration) -> Instant {
        Instant(self.0.saturating_add(d.0))
    }

    pub const fn saturating_sub(self, d: Duration) -> Instant {
        Instant(self.0.saturating_sub(d.0))
    }

    /// Length of time elapsed from `earlier` to `self` (negative if `earlier` is later).
    pub const fn since(self, earlier: Instant) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        self.saturating_add(rhs)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        self.saturating_sub(rhs)
    }
}

impl Sub for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.since(rhs)
    }
}
